//! On-disk fingerprint file (§6): a self-contained JSON snapshot of one
//! reference's hashes, portable across stores without re-decoding audio.

use crate::error::{Result, SabiError};
use crate::hashing::HashPosting;
use crate::model::ContentDigest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashEntry {
    pub hash: String,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintFile {
    pub song_name: String,
    pub source_file: String,
    pub metadata: serde_json::Value,
    pub debounce_seconds: Option<f64>,
    pub file_sha1: String,
    pub date_created: DateTime<Utc>,
    pub total_hashes: usize,
    pub fingerprints: Vec<HashEntry>,
}

impl FingerprintFile {
    pub fn new(
        song_name: impl Into<String>,
        source_file: impl Into<String>,
        metadata: serde_json::Value,
        debounce_seconds: Option<f64>,
        content_digest: ContentDigest,
        postings: &[HashPosting],
    ) -> Self {
        let fingerprints: Vec<HashEntry> = postings
            .iter()
            .map(|p| HashEntry {
                hash: p.hash.0.clone(),
                offset: p.time_offset,
            })
            .collect();
        Self {
            song_name: song_name.into(),
            source_file: source_file.into(),
            metadata,
            debounce_seconds,
            file_sha1: content_digest.to_hex(),
            date_created: Utc::now(),
            total_hashes: fingerprints.len(),
            fingerprints,
        }
    }

    pub fn content_digest(&self) -> Result<ContentDigest> {
        ContentDigest::from_hex(&self.file_sha1).ok_or_else(|| {
            SabiError::invalid_input(
                self.song_name.clone(),
                format!("file_sha1 is not a valid 40-char hex digest: {}", self.file_sha1),
            )
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| SabiError::Json {
            context: path.display().to_string(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| SabiError::io(path.display().to_string(), e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read_to_string(path)
            .map_err(|e| SabiError::io(path.display().to_string(), e))?;
        let file: FingerprintFile =
            serde_json::from_str(&bytes).map_err(|e| SabiError::Json {
                context: path.display().to_string(),
                source: e,
            })?;
        if file.total_hashes != file.fingerprints.len() {
            return Err(SabiError::invalid_input(
                path.display().to_string(),
                format!(
                    "total_hashes ({}) does not match fingerprints list length ({})",
                    file.total_hashes,
                    file.fingerprints.len()
                ),
            ));
        }
        Ok(file)
    }
}
