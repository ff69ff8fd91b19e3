//! Offset-alignment voting matcher (C5, §4.5).
//!
//! Grounded in the teacher's `fingerprint.rs::vote_best_matches`: tally an
//! offset histogram per reference and report the bin with the most votes.
//! The teacher votes across a fixed top-K; this matcher only needs the
//! single best reference, since that is all the recognizer (C7) consumes.

use crate::dsp::{FS, HOP};
use crate::model::ReferenceId;
use std::collections::HashMap;

/// The outcome of matching a query's hashes against the store (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub reference_id: ReferenceId,
    pub best_offset_difference: i64,
    pub score: usize,
}

impl MatchResult {
    /// `offset_difference · H / FS`, the aligned start-of-query offset into
    /// the reference recording, in seconds.
    pub fn offset_seconds(&self) -> f64 {
        (self.best_offset_difference as f64) * (HOP as f64) / (FS as f64)
    }
}

/// Votes a winning reference from `(reference_id, offset_difference)` pairs
/// as returned by [`crate::store::FingerprintStore::return_matches`].
///
/// For each reference, tallies a histogram keyed by `offset_difference`; the
/// reference's score is its largest bin. Returns the reference with the
/// highest score across all references, or `None` if no postings hit.
pub fn vote_best_match(hits: &[(ReferenceId, i64)]) -> Option<MatchResult> {
    if hits.is_empty() {
        return None;
    }

    let mut histograms: HashMap<ReferenceId, HashMap<i64, usize>> = HashMap::new();
    for &(reference_id, offset_difference) in hits {
        *histograms
            .entry(reference_id)
            .or_default()
            .entry(offset_difference)
            .or_default() += 1;
    }

    histograms
        .into_iter()
        .filter_map(|(reference_id, hist)| {
            hist.into_iter()
                .max_by_key(|&(offset, score)| (score, std::cmp::Reverse(offset)))
                .map(|(best_offset_difference, score)| MatchResult {
                    reference_id,
                    best_offset_difference,
                    score,
                })
        })
        .max_by_key(|m| m.score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_hits_yields_none() {
        assert_eq!(vote_best_match(&[]), None);
    }

    #[test]
    fn aligned_hits_outvote_scattered_noise() {
        let a = ReferenceId(1);
        let noise = ReferenceId(2);
        let mut hits = vec![(a, 10), (a, 10), (a, 10), (a, 10)];
        hits.extend([(noise, 1), (noise, 2), (noise, 3)]);

        let result = vote_best_match(&hits).unwrap();
        assert_eq!(result.reference_id, a);
        assert_eq!(result.best_offset_difference, 10);
        assert_eq!(result.score, 4);
    }

    #[test]
    fn best_reference_wins_across_references() {
        let weak = ReferenceId(1);
        let strong = ReferenceId(2);
        let hits = vec![(weak, 0), (weak, 0), (strong, 5), (strong, 5), (strong, 5)];

        let result = vote_best_match(&hits).unwrap();
        assert_eq!(result.reference_id, strong);
        assert_eq!(result.score, 3);
    }

    #[test]
    fn offset_seconds_converts_frames_through_hop_and_sample_rate() {
        let result = MatchResult {
            reference_id: ReferenceId(1),
            best_offset_difference: 10,
            score: 5,
        };
        let expected = 10.0 * HOP as f64 / FS as f64;
        assert!((result.offset_seconds() - expected).abs() < 1e-9);
    }

    #[test]
    fn negative_offset_difference_is_preserved() {
        let a = ReferenceId(1);
        let hits = vec![(a, -3), (a, -3)];
        let result = vote_best_match(&hits).unwrap();
        assert_eq!(result.best_offset_difference, -3);
    }
}
