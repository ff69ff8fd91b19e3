//! Audio decode front-end, adapted from the teacher's `audio_processor.rs`.
//! Every panic/unwrap in the original is replaced with a propagated
//! [`SabiError::Decode`] or [`SabiError::Io`]; the resampler and content
//! digest are otherwise a direct generalization of the teacher's approach.

use crate::dsp::FS;
use crate::error::{Result, SabiError};
use crate::model::ContentDigest;
use std::fs;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded mono PCM at [`FS`], plus the SHA-1 digest of the source file's
/// raw bytes (§3 invariant 5, §4.6's registration path).
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub content_digest: ContentDigest,
}

/// Decodes an audio file at `path` to mono float PCM resampled to [`FS`].
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let bytes = fs::read(path).map_err(|e| SabiError::io(path.display().to_string(), e))?;
    let content_digest = ContentDigest::of_bytes(&bytes);
    let (samples, source_rate) = decode_bytes_to_mono(bytes, path)?;
    let samples = resample_linear(&samples, source_rate, FS);
    Ok(DecodedAudio {
        samples,
        content_digest,
    })
}

fn decode_bytes_to_mono(bytes: Vec<u8>, path: &Path) -> Result<(Vec<f32>, u32)> {
    let context = || path.display().to_string();
    let cursor = std::io::Cursor::new(bytes);
    let stream = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SabiError::decode(context(), format!("probe failed: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .get(0)
        .ok_or_else(|| SabiError::decode(context(), "no audio track found"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SabiError::decode(context(), "track has no sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SabiError::decode(context(), format!("no decoder for codec: {e}")))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(SabiError::decode(context(), format!("packet read failed: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| SabiError::decode(context(), format!("decode failed: {e}")))?;
        let channels = decoded.spec().channels.count().max(1);

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(channels) {
            mono.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }

    if mono.is_empty() {
        return Err(SabiError::decode(context(), "no samples decoded"));
    }

    Ok((mono, sample_rate))
}

/// Linear-interpolation resampler (§4.1's front end requires a fixed `FS`).
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut resampled = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = src_pos.fract() as f32;

        if idx + 1 < samples.len() {
            let p1 = samples[idx];
            let p2 = samples[idx + 1];
            resampled.push(p1 + frac * (p2 - p1));
        } else if idx < samples.len() {
            resampled.push(samples[idx]);
        } else {
            break;
        }
    }
    resampled
}
