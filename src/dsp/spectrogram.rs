//! Short-time Fourier transform front-end: waveform -> log-magnitude
//! spectrogram (§4.1).

use rustfft::{num_complex::Complex32, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Internal sample rate the whole DSP pipeline assumes.
pub const FS: u32 = 44_100;
/// STFT window size in samples.
pub const N_FFT: usize = 4096;
/// Fractional overlap between consecutive windows.
pub const OVERLAP: f32 = 0.5;
/// Hop size in samples, derived from `N_FFT` and `OVERLAP`.
pub const HOP: usize = ((N_FFT as f32) * (1.0 - OVERLAP)) as usize;

/// A dense `[freq_bin][time_frame]` grid of log-magnitude (dB) values.
/// Row-major over frequency bins, one column per STFT frame.
#[derive(Debug, Clone)]
pub struct SpectrogramGrid {
    data: Vec<f32>,
    pub n_freq: usize,
    pub n_time: usize,
}

impl SpectrogramGrid {
    pub fn get(&self, freq_bin: usize, time_frame: usize) -> f32 {
        self.data[time_frame * self.n_freq + freq_bin]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Row-major reinterpretation with frequency as the row axis (used by
    /// the separable neighborhood filters, which operate on
    /// `n_rows x n_cols` grids with rows = frequency, cols = time).
    pub fn freq_major(&self) -> Vec<f32> {
        let mut out = vec![0.0f32; self.data.len()];
        for t in 0..self.n_time {
            for f in 0..self.n_freq {
                out[f * self.n_time + t] = self.get(f, t);
            }
        }
        out
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n as f32 - 1.0)).cos()))
        .collect()
}

/// Computes the magnitude STFT of `samples` (mono float PCM at [`FS`]) and
/// converts it to log-magnitude decibels, silencing the
/// division-by-zero-in-the-log case by remapping it to `0` (§4.1).
pub fn compute_spectrogram(samples: &[f32]) -> SpectrogramGrid {
    let n_freq = N_FFT / 2 + 1;
    if samples.len() < N_FFT {
        return SpectrogramGrid {
            data: Vec::new(),
            n_freq,
            n_time: 0,
        };
    }

    let window = hann_window(N_FFT);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N_FFT);

    let n_time = (samples.len() - N_FFT) / HOP + 1;
    let mut data = vec![0.0f32; n_freq * n_time];

    let mut scratch: Vec<Complex32> = vec![Complex32::new(0.0, 0.0); N_FFT];
    for (t, frame_start) in (0..samples.len() - N_FFT + 1).step_by(HOP).enumerate() {
        if t >= n_time {
            break;
        }
        let frame = &samples[frame_start..frame_start + N_FFT];
        for (i, (&s, &w)) in frame.iter().zip(window.iter()).enumerate() {
            scratch[i] = Complex32::new(s * w, 0.0);
        }
        run_fft(&fft, &mut scratch);

        for f in 0..n_freq {
            let magnitude = scratch[f].norm();
            let db = magnitude_to_db(magnitude);
            data[t * n_freq + f] = db;
        }
    }

    SpectrogramGrid {
        data,
        n_freq,
        n_time,
    }
}

fn run_fft(fft: &Arc<dyn rustfft::Fft<f32>>, buffer: &mut [Complex32]) {
    fft.process(buffer);
}

/// `10*log10(magnitude)`, with the `magnitude == 0` division-by-zero case
/// silenced to `0` dB rather than propagated as `-inf`/NaN (§4.1).
fn magnitude_to_db(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        0.0
    } else {
        10.0 * magnitude.log10()
    }
}
