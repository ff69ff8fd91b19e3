//! DSP front-end (C1): PCM -> spectrogram -> constellation peaks (§4.1).

mod neighborhood;
pub mod peaks;
pub mod spectrogram;

pub use peaks::{pick_peaks, ConstellationPeak, AMP_MIN, PEAK_NEIGHBORHOOD};
pub use spectrogram::{compute_spectrogram, SpectrogramGrid, FS, HOP, N_FFT, OVERLAP};
