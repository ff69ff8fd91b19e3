//! Reference registrar (C6, §4.6). Ingests audio or a pre-computed
//! fingerprint file into a store; `run_batch` folds a directory of YAML
//! descriptors into the §7 batch-summary contract.

use crate::audio_decode::decode_file;
use crate::dsp::pick_peaks;
use crate::dsp::spectrogram::compute_spectrogram;
use crate::error::{Result, SabiError};
use crate::fingerprint_file::FingerprintFile;
use crate::hashing::generate_hashes;
use crate::model::{ContentDigest, Hash80, MetadataRecord, ReferenceId};
use crate::store::{FingerprintStore, MetadataStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// A reference metadata YAML descriptor (§6), input to [`run_batch`].
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceDescriptor {
    pub source: String,
    pub metadata: serde_json::Value,
    pub debounce_seconds: Option<f64>,
}

impl ReferenceDescriptor {
    pub fn from_yaml_str(s: &str, context: &str) -> Result<Self> {
        let descriptor: ReferenceDescriptor =
            serde_yaml::from_str(s).map_err(|e| SabiError::Yaml {
                context: context.to_string(),
                source: e,
            })?;
        if descriptor.source.trim().is_empty() {
            return Err(SabiError::invalid_input(context, "missing required field `source`"));
        }
        if descriptor.metadata.is_null() {
            return Err(SabiError::invalid_input(context, "missing required field `metadata`"));
        }
        Ok(descriptor)
    }
}

/// Outcome of one registration attempt, folded into a [`BatchSummary`].
#[derive(Debug)]
pub enum RegistrationOutcome {
    Registered(ReferenceId),
    Skipped { name: String, reason: String },
}

/// §7's "batch operations print a final summary" contract.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>,
}

fn name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("reference")
        .to_string()
}

/// Registers a reference from an audio file, running the full C1+C2
/// pipeline (§4.6 path 1). `name` is typically derived from metadata by the
/// caller (e.g. `game_slug_song_slug`).
pub fn register_from_audio<S: FingerprintStore + MetadataStore>(
    store: &mut S,
    name: &str,
    audio_path: &Path,
    metadata: serde_json::Value,
    debounce_seconds: Option<f64>,
) -> Result<ReferenceId> {
    let decoded = decode_file(audio_path)?;
    let spectrogram = compute_spectrogram(&decoded.samples);
    let peaks = pick_peaks(&spectrogram);
    let postings = generate_hashes(&peaks);

    let reference_id = store.insert_reference(name, decoded.content_digest)?;
    let batch: Vec<(Hash80, u32)> = postings
        .iter()
        .map(|p| (p.hash.clone(), p.time_offset))
        .collect();
    store.insert_postings_batch(reference_id, &batch)?;
    store.set_fingerprinted(reference_id)?;
    store.upsert_metadata(MetadataRecord {
        name: name.to_string(),
        doc: metadata,
        source_file: Some(audio_path.display().to_string()),
        date_added: Some(chrono::Utc::now()),
        debounce_seconds,
    })?;
    Ok(reference_id)
}

/// Registers a reference from a pre-computed fingerprint file (§4.6 path
/// 2). Skips (returns `Ok(None)`) if `name` already exists, unless `force`.
pub fn register_from_fingerprint_file<S: FingerprintStore + MetadataStore>(
    store: &mut S,
    path: &Path,
    force: bool,
) -> Result<Option<ReferenceId>> {
    let file = FingerprintFile::read(path)?;
    let content_digest = file.content_digest()?;

    let already_exists = store
        .list_references()?
        .iter()
        .any(|r| r.name == file.song_name);
    if already_exists && !force {
        return Ok(None);
    }
    if already_exists && force {
        if let Some(existing) = store
            .list_references()?
            .into_iter()
            .find(|r| r.name == file.song_name)
        {
            store.delete_reference(existing.reference_id)?;
        }
    }

    let reference_id = store.insert_reference(&file.song_name, content_digest)?;
    let batch: Vec<(Hash80, u32)> = file
        .fingerprints
        .iter()
        .map(|e| (Hash80(e.hash.clone()), e.offset))
        .collect();
    store.insert_postings_batch(reference_id, &batch)?;
    store.set_fingerprinted(reference_id)?;
    store.upsert_metadata(MetadataRecord {
        name: file.song_name.clone(),
        doc: file.metadata.clone(),
        source_file: Some(file.source_file.clone()),
        date_added: Some(file.date_created),
        debounce_seconds: file.debounce_seconds,
    })?;
    Ok(Some(reference_id))
}

/// Regeneration policy for `export_fingerprint` (§4.6): skip writing if an
/// existing file's digest already matches the current audio.
pub fn should_regenerate(existing_path: &Path, current_digest: ContentDigest) -> bool {
    match FingerprintFile::read(existing_path) {
        Ok(existing) => existing
            .content_digest()
            .map(|d| d != current_digest)
            .unwrap_or(true),
        Err(_) => true,
    }
}

/// Computes a reference's fingerprint and writes it to `output_path`,
/// honoring [`should_regenerate`].
pub fn export_fingerprint(
    name: &str,
    audio_path: &Path,
    output_path: &Path,
    metadata: serde_json::Value,
    debounce_seconds: Option<f64>,
) -> Result<bool> {
    let decoded = decode_file(audio_path)?;
    if output_path.exists() && !should_regenerate(output_path, decoded.content_digest) {
        return Ok(false);
    }

    let spectrogram = compute_spectrogram(&decoded.samples);
    let peaks = pick_peaks(&spectrogram);
    let postings = generate_hashes(&peaks);

    let file = FingerprintFile::new(
        name,
        audio_path.display().to_string(),
        metadata,
        debounce_seconds,
        decoded.content_digest,
        &postings,
    );
    file.write(output_path)?;
    Ok(true)
}

/// Runs a directory of reference metadata YAML descriptors (§6) through
/// [`register_from_audio`], using a bounded worker pool for the CPU-bound
/// C1+C2 pass (§5's "embarrassingly parallel across files" note) with a
/// single serialized writer against the shared store.
pub fn run_batch<S: FingerprintStore + MetadataStore + Send>(
    store: &mut S,
    descriptor_dir: &Path,
    audio_base_dir: &Path,
    worker_count: usize,
) -> Result<BatchSummary> {
    let mut descriptor_paths = Vec::new();
    for entry in std::fs::read_dir(descriptor_dir)
        .map_err(|e| SabiError::io(descriptor_dir.display().to_string(), e))?
    {
        let entry = entry.map_err(|e| SabiError::io(descriptor_dir.display().to_string(), e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml")
            || path.extension().and_then(|e| e.to_str()) == Some("yml")
        {
            descriptor_paths.push(path);
        }
    }
    descriptor_paths.sort();

    let mut summary = BatchSummary {
        total: descriptor_paths.len(),
        ..Default::default()
    };
    if descriptor_paths.is_empty() {
        return Ok(summary);
    }

    // Each worker independently decodes audio and runs C1+C2 (the CPU-bound,
    // embarrassingly parallel part of §5); only the store write is shared,
    // serialized behind one mutex.
    let worker_count = worker_count.max(1).min(descriptor_paths.len());
    let chunk_size = (descriptor_paths.len() + worker_count - 1) / worker_count;
    let chunks: Vec<&[PathBuf]> = descriptor_paths.chunks(chunk_size).collect();

    let store = Mutex::new(store);
    let summary_mutex = Mutex::new(&mut summary);

    std::thread::scope(|scope| {
        for chunk in chunks {
            let store = &store;
            let summary_mutex = &summary_mutex;
            scope.spawn(move || {
                for path in chunk {
                    let outcome = process_one_descriptor(store, path, audio_base_dir);
                    let mut summary = summary_mutex.lock().unwrap();
                    match outcome {
                        Ok(name) => {
                            summary.succeeded += 1;
                            info!(%name, "registered reference");
                        }
                        Err(RegistrationError::Skipped { name }) => {
                            summary.skipped += 1;
                            info!(%name, "skipped duplicate reference");
                        }
                        Err(RegistrationError::Failed { context, reason }) => {
                            summary.failed += 1;
                            warn!(%context, %reason, "batch item failed");
                            summary.failures.push((context, reason));
                        }
                    }
                }
            });
        }
    });

    drop(summary_mutex);
    Ok(summary)
}

enum RegistrationError {
    Skipped { name: String },
    Failed { context: String, reason: String },
}

fn process_one_descriptor<S: FingerprintStore + MetadataStore + Send>(
    store: &Mutex<&mut S>,
    descriptor_path: &Path,
    audio_base_dir: &Path,
) -> std::result::Result<String, RegistrationError> {
    let context = descriptor_path.display().to_string();
    let text = std::fs::read_to_string(descriptor_path).map_err(|e| RegistrationError::Failed {
        context: context.clone(),
        reason: e.to_string(),
    })?;
    let descriptor = ReferenceDescriptor::from_yaml_str(&text, &context)
        .map_err(|e| RegistrationError::Failed {
            context: context.clone(),
            reason: e.to_string(),
        })?;

    let audio_path = audio_base_dir.join(&descriptor.source);
    let name = name_from_path(&audio_path);

    // Decode + C1 + C2 happen before the store lock is taken, so the
    // expensive DSP pass for this file never blocks other workers.
    let decoded = decode_file(&audio_path).map_err(|e| RegistrationError::Failed {
        context: name.clone(),
        reason: e.to_string(),
    })?;
    let spectrogram = compute_spectrogram(&decoded.samples);
    let peaks = pick_peaks(&spectrogram);
    let postings = generate_hashes(&peaks);
    let batch: Vec<(Hash80, u32)> = postings
        .iter()
        .map(|p| (p.hash.clone(), p.time_offset))
        .collect();

    let mut store = store.lock().unwrap();
    let reference_id = match store.insert_reference(&name, decoded.content_digest) {
        Ok(id) => id,
        Err(SabiError::DuplicateReference { name }) => {
            return Err(RegistrationError::Skipped { name });
        }
        Err(e) => {
            return Err(RegistrationError::Failed {
                context: name,
                reason: e.to_string(),
            });
        }
    };
    store
        .insert_postings_batch(reference_id, &batch)
        .and_then(|_| store.set_fingerprinted(reference_id))
        .and_then(|_| {
            store.upsert_metadata(MetadataRecord {
                name: name.clone(),
                doc: descriptor.metadata.clone(),
                source_file: Some(audio_path.display().to_string()),
                date_added: Some(chrono::Utc::now()),
                debounce_seconds: descriptor.debounce_seconds,
            })
        })
        .map_err(|e| RegistrationError::Failed {
            context: name.clone(),
            reason: e.to_string(),
        })?;

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn descriptor_requires_source_field() {
        let yaml = "metadata:\n  song: Foo\n";
        let err = ReferenceDescriptor::from_yaml_str(yaml, "test.yaml").unwrap_err();
        assert!(matches!(err, SabiError::InvalidInput { .. }));
    }

    #[test]
    fn descriptor_parses_minimal_yaml() {
        let yaml = "source: track.wav\nmetadata:\n  song: Foo\n  game: Bar\n";
        let descriptor = ReferenceDescriptor::from_yaml_str(yaml, "test.yaml").unwrap();
        assert_eq!(descriptor.source, "track.wav");
        assert_eq!(descriptor.metadata["song"], "Foo");
        assert!(descriptor.debounce_seconds.is_none());
    }

    #[test]
    fn register_from_fingerprint_file_skips_duplicate_without_force() {
        let mut store = InMemoryStore::new();
        let digest = ContentDigest::of_bytes(b"audio bytes");
        let file = FingerprintFile::new(
            "song_a",
            "song_a.wav",
            serde_json::json!({}),
            None,
            digest,
            &[],
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song_a.json");
        file.write(&path).unwrap();

        let first = register_from_fingerprint_file(&mut store, &path, false).unwrap();
        assert!(first.is_some());
        let second = register_from_fingerprint_file(&mut store, &path, false).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn should_regenerate_true_when_file_missing() {
        let digest = ContentDigest::of_bytes(b"x");
        assert!(should_regenerate(Path::new("/nonexistent.json"), digest));
    }
}
