//! 2-D peak picking over a spectrogram (§4.1).
//!
//! Ported from the classic "local max XOR eroded background" constellation
//! extraction: a cell is a peak iff it equals the neighborhood maximum AND
//! it does not sit inside a neighborhood that is entirely background
//! (silence). Both masks are boolean-valued, so they are combined with XOR,
//! never arithmetic subtraction (a test that substitutes subtraction for
//! XOR must fail — see the boundary-behavior test below).

use super::neighborhood::filter2d;
use super::spectrogram::SpectrogramGrid;

/// Side length (in bins, both axes) of the morphological-max footprint.
pub const PEAK_NEIGHBORHOOD: usize = 20;
/// Amplitude floor in dB; a peak must exceed this to be kept.
pub const AMP_MIN: f32 = 10.0;

/// One peak in the time-frequency constellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstellationPeak {
    pub freq_bin: u32,
    pub time_frame: u32,
}

/// Finds local maxima of `grid` using a `PEAK_NEIGHBORHOOD`-square
/// neighborhood, returning them sorted by `time_frame` (the hash generator,
/// §4.2, requires peaks sorted by time to pair anchors with later targets).
pub fn pick_peaks(grid: &SpectrogramGrid) -> Vec<ConstellationPeak> {
    if grid.n_time == 0 {
        return Vec::new();
    }

    let rows = grid.n_freq;
    let cols = grid.n_time;
    let data = grid.freq_major();

    let neighborhood_max = filter2d(&data, rows, cols, PEAK_NEIGHBORHOOD, f32::MIN, true);

    let background: Vec<f32> = data
        .iter()
        .map(|&v| if v == 0.0 { 1.0 } else { 0.0 })
        .collect();
    // Erosion: border treated as background (border_value = 1.0), matching
    // the "background_value=1" convention of the python original.
    let eroded_background = filter2d(&background, rows, cols, PEAK_NEIGHBORHOOD, 1.0, false);

    let mut peaks = Vec::new();
    for f in 0..rows {
        for t in 0..cols {
            let idx = f * cols + t;
            let is_local_max = data[idx] == neighborhood_max[idx];
            let is_eroded_background = eroded_background[idx] != 0.0;
            let detected = is_local_max ^ is_eroded_background;

            if detected && data[idx] > AMP_MIN {
                peaks.push(ConstellationPeak {
                    freq_bin: f as u32,
                    time_frame: t as u32,
                });
            }
        }
    }

    peaks.sort_by_key(|p| p.time_frame);
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::spectrogram::{compute_spectrogram, FS, N_FFT};
    use std::f32::consts::PI;

    fn sine_wave(freq: f32, duration_secs: f32) -> Vec<f32> {
        let n = (FS as f32 * duration_secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / FS as f32).sin())
            .collect()
    }

    #[test]
    fn silence_yields_no_peaks() {
        let grid = compute_spectrogram(&vec![0.0f32; N_FFT * 3]);
        assert!(pick_peaks(&grid).is_empty());
    }

    #[test]
    fn pure_tone_yields_at_least_one_peak_near_its_bin() {
        let samples = sine_wave(1000.0, 1.0);
        let grid = compute_spectrogram(&samples);
        let peaks = pick_peaks(&grid);
        assert!(!peaks.is_empty());

        let bin_hz = FS as f32 / N_FFT as f32;
        let expected_bin = (1000.0 / bin_hz).round() as u32;
        assert!(peaks
            .iter()
            .any(|p| (p.freq_bin as i64 - expected_bin as i64).abs() <= 2));
    }

    #[test]
    fn peaks_are_sorted_by_time_frame() {
        let samples = sine_wave(440.0, 2.0);
        let grid = compute_spectrogram(&samples);
        let peaks = pick_peaks(&grid);
        let mut last = 0u32;
        for p in &peaks {
            assert!(p.time_frame >= last);
            last = p.time_frame;
        }
    }

    #[test]
    fn xor_composition_is_not_equivalent_to_subtraction() {
        // local_max=false, eroded_background=true is the case that tells
        // the two approaches apart: XOR says "detected" (true), while a
        // saturating unsigned subtraction (the "arithmetic" mistake the
        // spec calls out) clamps the negative result to zero and says
        // "not detected".
        let local_max = [false, true, true, true];
        let eroded_bg = [true, false, false, true];

        let xor_result: Vec<bool> = local_max
            .iter()
            .zip(eroded_bg.iter())
            .map(|(&a, &b)| a ^ b)
            .collect();
        assert_eq!(xor_result, vec![true, true, true, false]);

        let sub_result: Vec<bool> = local_max
            .iter()
            .zip(eroded_bg.iter())
            .map(|(&a, &b)| (a as u8).saturating_sub(b as u8) != 0)
            .collect();
        assert_eq!(sub_result, vec![false, true, true, false]);

        assert_ne!(sub_result, xor_result);
    }
}
