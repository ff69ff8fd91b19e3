//! Event sink adapter (C8, §4.8). Delivery to a collaborator (message bus,
//! callback, log) is out of scope; this module ships the trait plus two
//! concrete implementations so it is exercised, not a stub.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

/// One emitted detection (§4.8's field list is contractual).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub song_name: String,
    pub confidence: f64,
    pub timestamp: DateTime<Local>,
    pub metadata: serde_json::Value,
    pub offset: f64,
    pub hashes_matched: usize,
}

/// Delivers a [`DetectionRecord`] somewhere. The recognizer (C7) calls this
/// only for non-debounced detections; console logging happens independently
/// of whichever sink is installed.
pub trait EventSink {
    fn emit(&self, record: DetectionRecord);
}

/// Pushes records onto an [`mpsc::Sender`], used by tests and the `listen`
/// CLI subcommand to observe detections from outside the recognizer loop.
pub struct ChannelSink {
    tx: Sender<DetectionRecord>,
}

impl ChannelSink {
    pub fn new(tx: Sender<DetectionRecord>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, record: DetectionRecord) {
        // A dropped receiver just means nobody is listening anymore; that
        // is not the recognizer's problem to report.
        let _ = self.tx.send(record);
    }
}

/// Emits a `tracing::info!` event per record — the ambient logging story's
/// concrete terminus when no external bus is configured.
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn emit(&self, record: DetectionRecord) {
        tracing::info!(
            song_name = %record.song_name,
            confidence = record.confidence,
            offset = record.offset,
            hashes_matched = record.hashes_matched,
            "detection emitted"
        );
    }
}
