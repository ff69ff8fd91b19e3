//! Microphone capture, adapted from the teacher's `record_audio`/
//! `play_recording`. This is a CLI convenience, not part of the core (§1's
//! "audio capture from OS devices" is explicitly a collaborator concern) —
//! it exists so the `listen` subcommand has something to feed the
//! recognizer's ring buffer.

use crate::error::{Result, SabiError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc::Sender;

/// Opens the default input device and streams mono f32 chunks to `tx` until
/// the returned `cpal::Stream` is dropped.
pub fn start_capture(tx: Sender<Vec<f32>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SabiError::invalid_input("audio capture", "no input device available"))?;
    let config = device
        .default_input_config()
        .map_err(|e| SabiError::invalid_input("audio capture", e.to_string()))?;
    let channels = config.channels() as usize;

    let err_fn = |err| tracing::warn!(%err, "capture stream error");

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config.clone().into(),
                move |data: &[f32], _: &_| {
                    let mono = downmix(data, channels);
                    let _ = tx.send(mono);
                },
                err_fn,
                None,
            )
            .map_err(|e| SabiError::invalid_input("audio capture", e.to_string()))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config.clone().into(),
                move |data: &[i16], _: &_| {
                    let floats: Vec<f32> = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    let mono = downmix(&floats, channels);
                    let _ = tx.send(mono);
                },
                err_fn,
                None,
            )
            .map_err(|e| SabiError::invalid_input("audio capture", e.to_string()))?,
        other => {
            return Err(SabiError::invalid_input(
                "audio capture",
                format!("unsupported sample format: {other:?}"),
            ))
        }
    };

    stream
        .play()
        .map_err(|e| SabiError::invalid_input("audio capture", e.to_string()))?;
    Ok(stream)
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_is_identity_for_mono() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(&samples, 1), samples);
    }

    #[test]
    fn downmix_averages_stereo_frames() {
        let interleaved = vec![1.0, -1.0, 0.5, 0.5];
        let mono = downmix(&interleaved, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }
}
