//! Hash generator (C2): peak pairs -> `(hash, time_offset)` postings (§4.2).

use crate::dsp::ConstellationPeak;
use crate::model::Hash80;
use sha1::{Digest, Sha1};

/// Number of subsequent peaks paired with each anchor.
pub const FAN_VALUE: usize = 15;
/// Minimum allowed frame gap between anchor and target.
pub const MIN_HASH_TIME_DELTA: u32 = 0;
/// Maximum allowed frame gap between anchor and target.
pub const MAX_HASH_TIME_DELTA: u32 = 200;
/// Number of hex characters kept from the SHA-1 digest.
pub const FINGERPRINT_REDUCTION: usize = 20;

/// One `(hash, time_offset)` pair produced by the generator, where
/// `time_offset` is the anchor peak's frame index.
#[derive(Debug, Clone)]
pub struct HashPosting {
    pub hash: Hash80,
    pub time_offset: u32,
}

/// Generates the unordered multiset of `(hash, time_offset)` pairs for a
/// constellation. `peaks` must already be sorted by `time_frame` (the DSP
/// front-end guarantees this; see [`crate::dsp::pick_peaks`]).
pub fn generate_hashes(peaks: &[ConstellationPeak]) -> Vec<HashPosting> {
    let mut out = Vec::new();

    for (i, anchor) in peaks.iter().enumerate() {
        let mut paired = 0usize;
        for target in peaks[i + 1..].iter() {
            if paired >= FAN_VALUE {
                break;
            }
            // peaks are sorted by time_frame but ties are possible; only
            // non-negative deltas are meaningful pairs.
            if target.time_frame < anchor.time_frame {
                continue;
            }
            let delta = target.time_frame - anchor.time_frame;
            if delta < MIN_HASH_TIME_DELTA || delta > MAX_HASH_TIME_DELTA {
                if delta > MAX_HASH_TIME_DELTA {
                    // peaks are time-sorted, so once we exceed the window
                    // every subsequent target will too.
                    break;
                }
                continue;
            }

            let hash = hash_peak_pair(anchor.freq_bin, target.freq_bin, delta);
            out.push(HashPosting {
                hash,
                time_offset: anchor.time_frame,
            });
            paired += 1;
        }
    }

    out
}

/// `Hash80` of `SHA1("{f_a}|{f_b}|{delta}")`, keeping the first
/// [`FINGERPRINT_REDUCTION`] hex characters (§4.2).
pub fn hash_peak_pair(freq_anchor: u32, freq_target: u32, delta: u32) -> Hash80 {
    let message = format!("{}|{}|{}", freq_anchor, freq_target, delta);
    let mut hasher = Sha1::new();
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();
    let hex = hex::encode(digest);
    Hash80(hex[..FINGERPRINT_REDUCTION].to_string())
}
