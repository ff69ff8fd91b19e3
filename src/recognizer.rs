//! Stream recognizer (C7, §4.7). Drives C1->C2->C5 over a sliding window of
//! a continuous audio stream, with an energy gate and per-reference
//! debounce on emitted events.

use crate::config::RecognitionConfig;
use crate::dsp::{pick_peaks, spectrogram::compute_spectrogram};
use crate::hashing::generate_hashes;
use crate::matcher::vote_best_match;
use crate::model::Hash80;
use crate::sink::{DetectionRecord, EventSink};
use crate::store::{FingerprintStore, MetadataStore};
use chrono::Local;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::info;

/// Cumulative counters maintained across the recognizer's lifetime (§4.7).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecognizerStats {
    pub chunks_received: u64,
    pub windows_processed: u64,
    pub windows_skipped_silent: u64,
    pub detections_produced: u64,
    pub emissions_suppressed_by_debounce: u64,
}

struct DebounceState {
    last_emitted_name: Option<String>,
    last_emitted_at: std::collections::HashMap<String, Instant>,
}

impl DebounceState {
    fn new() -> Self {
        Self {
            last_emitted_name: None,
            last_emitted_at: std::collections::HashMap::new(),
        }
    }
}

/// Drives recognition over a sliding audio window. Generic over the store
/// backing so the whole pipeline is testable against `InMemoryStore`.
pub struct Recognizer<S> {
    config: RecognitionConfig,
    ring: VecDeque<f32>,
    capacity: usize,
    window_len: usize,
    debounce: DebounceState,
    stats: RecognizerStats,
    store: S,
}

impl<S: FingerprintStore + MetadataStore> Recognizer<S> {
    pub fn new(store: S, config: RecognitionConfig) -> Self {
        let capacity =
            ((config.window_duration + config.hop_duration) * config.sample_rate as f64) as usize;
        let window_len = (config.window_duration * config.sample_rate as f64) as usize;
        Self {
            config,
            ring: VecDeque::with_capacity(capacity),
            capacity,
            window_len,
            debounce: DebounceState::new(),
            stats: RecognizerStats::default(),
            store,
        }
    }

    pub fn stats(&self) -> RecognizerStats {
        self.stats
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Appends a new chunk of PCM samples, evicting the oldest samples once
    /// the ring buffer exceeds its capacity.
    pub fn push_chunk(&mut self, chunk: &[f32]) {
        self.stats.chunks_received += 1;
        for &sample in chunk {
            if self.ring.len() == self.capacity {
                self.ring.pop_front();
            }
            self.ring.push_back(sample);
        }
    }

    /// Runs one recognition pass over the most recent window, emitting to
    /// `sink` if a non-debounced detection clears the confidence threshold.
    /// Returns the detection, if any (debounced or not).
    pub fn recognize_once(&mut self, sink: &dyn EventSink) -> crate::error::Result<Option<DetectionRecord>> {
        if self.ring.len() < self.window_len {
            return Ok(None);
        }

        let window = self.extract_window();
        let rms = (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt();
        let energy_db = 20.0 * rms.max(1e-10).log10();
        if energy_db < self.config.energy_threshold_db as f32 {
            self.stats.windows_skipped_silent += 1;
            return Ok(None);
        }

        self.stats.windows_processed += 1;

        let spectrogram = compute_spectrogram(&window);
        let peaks = pick_peaks(&spectrogram);
        let postings = generate_hashes(&peaks);
        let query_hashes: Vec<(Hash80, u32)> = postings
            .into_iter()
            .map(|p| (p.hash, p.time_offset))
            .collect();

        let hits = self.store.return_matches(&query_hashes)?;
        let Some(best) = vote_best_match(&hits) else {
            return Ok(None);
        };

        let confidence = (best.score as f64 / 50.0).min(1.0);
        if confidence < self.config.confidence_threshold {
            return Ok(None);
        }

        let references = self.store.list_references()?;
        let Some(reference) = references.into_iter().find(|r| r.reference_id == best.reference_id) else {
            return Ok(None);
        };

        self.stats.detections_produced += 1;
        info!(
            name = %reference.name,
            confidence,
            score = best.score,
            "recognized"
        );

        let metadata = self.store.get_metadata(&reference.name)?;
        let debounce_seconds = metadata
            .as_ref()
            .and_then(|m| m.debounce_seconds)
            .unwrap_or(self.config.debounce_duration);

        let should_emit = match &self.debounce.last_emitted_name {
            Some(last) if last == &reference.name => {
                let elapsed = self
                    .debounce
                    .last_emitted_at
                    .get(&reference.name)
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or(f64::MAX);
                elapsed >= debounce_seconds
            }
            _ => true,
        };

        let record = DetectionRecord {
            song_name: reference.name.clone(),
            confidence,
            timestamp: Local::now(),
            metadata: metadata.map(|m| m.doc).unwrap_or(serde_json::Value::Null),
            offset: best.offset_seconds(),
            hashes_matched: best.score,
        };

        if should_emit {
            self.debounce.last_emitted_name = Some(reference.name.clone());
            self.debounce
                .last_emitted_at
                .insert(reference.name.clone(), Instant::now());
            sink.emit(record.clone());
        } else {
            self.stats.emissions_suppressed_by_debounce += 1;
        }

        Ok(Some(record))
    }

    /// Extracts the most recent `window_duration * FS` samples, normalizing
    /// to `[-1, 1]` only if they exceed that range (avoids re-normalizing an
    /// already-normalized capture).
    fn extract_window(&self) -> Vec<f32> {
        let start = self.ring.len() - self.window_len;
        let window: Vec<f32> = self.ring.iter().skip(start).copied().collect();

        let peak = window.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 1.0 {
            window.into_iter().map(|s| s / peak).collect()
        } else {
            window
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use crate::store::memory::InMemoryStore;
    use std::sync::mpsc;

    fn tiny_config() -> RecognitionConfig {
        RecognitionConfig {
            sample_rate: 100,
            chunk_seconds: 0.1,
            window_duration: 0.1,
            hop_duration: 0.05,
            overlap: 0.5,
            confidence_threshold: 0.5,
            energy_threshold_db: -40.0,
            debounce_duration: 1.0,
        }
    }

    #[test]
    fn ring_buffer_caps_at_capacity() {
        let mut recognizer = Recognizer::new(InMemoryStore::new(), tiny_config());
        let capacity = recognizer.capacity;
        recognizer.push_chunk(&vec![1.0; capacity * 3]);
        assert_eq!(recognizer.ring.len(), capacity);
    }

    #[test]
    fn silent_window_is_skipped_and_counted() {
        let mut recognizer = Recognizer::new(InMemoryStore::new(), tiny_config());
        recognizer.push_chunk(&vec![0.0; recognizer.window_len]);
        let (tx, _rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);

        let result = recognizer.recognize_once(&sink).unwrap();
        assert!(result.is_none());
        assert_eq!(recognizer.stats().windows_skipped_silent, 1);
    }

    #[test]
    fn not_enough_samples_yet_yields_none_without_counting() {
        let mut recognizer = Recognizer::new(InMemoryStore::new(), tiny_config());
        recognizer.push_chunk(&[0.5; 2]);
        let (tx, _rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);

        let result = recognizer.recognize_once(&sink).unwrap();
        assert!(result.is_none());
        assert_eq!(recognizer.stats().windows_processed, 0);
        assert_eq!(recognizer.stats().windows_skipped_silent, 0);
    }

    #[test]
    fn window_is_normalized_only_when_it_exceeds_unit_range() {
        let mut recognizer = Recognizer::new(InMemoryStore::new(), tiny_config());
        recognizer.push_chunk(&vec![2.0; recognizer.window_len]);
        let window = recognizer.extract_window();
        assert!(window.iter().all(|&s| s.abs() <= 1.0 + 1e-6));

        let mut recognizer2 = Recognizer::new(InMemoryStore::new(), tiny_config());
        recognizer2.push_chunk(&vec![0.3; recognizer2.window_len]);
        let window2 = recognizer2.extract_window();
        assert!(window2.iter().all(|&s| (s - 0.3).abs() < 1e-6));
    }
}
