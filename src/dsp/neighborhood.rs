//! Separable sliding-window min/max filters used by peak picking (§4.1).
//!
//! A square structuring element's min/max filter is separable: the max (or
//! min) over a `k x k` window equals the max (or min) of the per-axis
//! max/min passes. This keeps the 2-D morphological max filter and the
//! boolean erosion at O(rows*cols) instead of O(rows*cols*k^2).

use std::collections::VecDeque;

/// Sliding window max (or min, if `want_max` is false) of width `k`,
/// centered on each index, with `border_value` used for positions that
/// fall outside `data` (mirrors `scipy.ndimage`'s `border_value`).
fn sliding_extreme_1d(data: &[f32], k: usize, border_value: f32, want_max: bool) -> Vec<f32> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let k_low = (k - 1) / 2;
    let k_high = k / 2;

    let mut padded = Vec::with_capacity(n + k_low + k_high);
    padded.extend(std::iter::repeat(border_value).take(k_low));
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(border_value).take(k_high));

    let dominates = |a: f32, b: f32| if want_max { a >= b } else { a <= b };

    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut out = vec![0.0f32; n];

    for i in 0..padded.len() {
        while let Some(&front) = deque.front() {
            if front + k <= i {
                deque.pop_front();
            } else {
                break;
            }
        }
        while let Some(&back) = deque.back() {
            if dominates(padded[i], padded[back]) {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);

        if i + 1 >= k {
            let out_idx = i + 1 - k;
            if out_idx < n {
                out[out_idx] = padded[*deque.front().unwrap()];
            }
        }
    }

    out
}

/// 2-D separable min/max filter over a row-major `n_rows x n_cols` grid.
pub fn filter2d(
    data: &[f32],
    n_rows: usize,
    n_cols: usize,
    k: usize,
    border_value: f32,
    want_max: bool,
) -> Vec<f32> {
    if n_rows == 0 || n_cols == 0 {
        return Vec::new();
    }

    let mut by_row = vec![0.0f32; n_rows * n_cols];
    for r in 0..n_rows {
        let row = &data[r * n_cols..(r + 1) * n_cols];
        let filtered = sliding_extreme_1d(row, k, border_value, want_max);
        by_row[r * n_cols..(r + 1) * n_cols].copy_from_slice(&filtered);
    }

    let mut out = vec![0.0f32; n_rows * n_cols];
    let mut column = vec![0.0f32; n_rows];
    for c in 0..n_cols {
        for r in 0..n_rows {
            column[r] = by_row[r * n_cols + c];
        }
        let filtered = sliding_extreme_1d(&column, k, border_value, want_max);
        for r in 0..n_rows {
            out[r * n_cols + c] = filtered[r];
        }
    }

    out
}
