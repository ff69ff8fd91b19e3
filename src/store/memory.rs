//! Non-durable in-process store (§4.3, §4.4). The memory backing is
//! permitted to use any associative structure that supports duplicate
//! keys; this one keys postings by the 32-bit hash projection
//! ([`Hash80::project32`]) since it never needs to round-trip a column
//! back out to a wire format.

use super::{FingerprintStore, MetadataStore};
use crate::error::{Result, SabiError};
use crate::model::{ContentDigest, Hash80, MetadataRecord, ReferenceId, ReferenceRow};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct ReferenceEntry {
    name: String,
    content_digest: ContentDigest,
    fingerprinted: bool,
}

#[derive(Default)]
pub struct InMemoryStore {
    references: HashMap<i32, ReferenceEntry>,
    names: HashSet<String>,
    next_id: i32,
    // hash32 -> (reference_id, time_offset)
    postings_by_hash: HashMap<u32, Vec<(i32, u32)>>,
    // dedup set: (reference_id, time_offset, hash32)
    posting_keys: HashSet<(i32, u32, u32)>,
    posting_count: u64,
    metadata: HashMap<String, MetadataRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for InMemoryStore {
    fn empty(&mut self) -> Result<()> {
        self.references.clear();
        self.names.clear();
        self.next_id = 0;
        self.postings_by_hash.clear();
        self.posting_keys.clear();
        self.posting_count = 0;
        Ok(())
    }

    fn insert_reference(
        &mut self,
        name: &str,
        content_digest: ContentDigest,
    ) -> Result<ReferenceId> {
        if self.names.contains(name) {
            return Err(SabiError::DuplicateReference {
                name: name.to_string(),
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.names.insert(name.to_string());
        self.references.insert(
            id,
            ReferenceEntry {
                name: name.to_string(),
                content_digest,
                fingerprinted: false,
            },
        );
        Ok(ReferenceId(id))
    }

    fn set_fingerprinted(&mut self, reference_id: ReferenceId) -> Result<()> {
        let entry = self
            .references
            .get_mut(&reference_id.0)
            .ok_or_else(|| SabiError::NotFound {
                name: reference_id.to_string(),
            })?;
        entry.fingerprinted = true;
        Ok(())
    }

    fn insert_posting(
        &mut self,
        hash: &Hash80,
        reference_id: ReferenceId,
        time_offset: u32,
    ) -> Result<()> {
        self.insert_postings_batch(reference_id, &[(hash.clone(), time_offset)])?;
        Ok(())
    }

    fn insert_postings_batch(
        &mut self,
        reference_id: ReferenceId,
        postings: &[(Hash80, u32)],
    ) -> Result<usize> {
        let mut inserted = 0;
        for (hash, offset) in postings {
            let h32 = hash.project32();
            let key = (reference_id.0, *offset, h32);
            if self.posting_keys.insert(key) {
                self.postings_by_hash
                    .entry(h32)
                    .or_default()
                    .push((reference_id.0, *offset));
                self.posting_count += 1;
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn delete_reference(&mut self, reference_id: ReferenceId) -> Result<()> {
        if let Some(entry) = self.references.remove(&reference_id.0) {
            self.names.remove(&entry.name);
        }
        let before = self.posting_keys.len();
        self.posting_keys.retain(|(rid, _, _)| *rid != reference_id.0);
        let removed = before - self.posting_keys.len();
        self.posting_count -= removed as u64;

        for bucket in self.postings_by_hash.values_mut() {
            bucket.retain(|(rid, _)| *rid != reference_id.0);
        }
        self.postings_by_hash.retain(|_, bucket| !bucket.is_empty());
        Ok(())
    }

    fn list_references(&mut self) -> Result<Vec<ReferenceRow>> {
        Ok(self
            .references
            .iter()
            .filter(|(_, e)| e.fingerprinted)
            .map(|(&id, e)| ReferenceRow {
                reference_id: ReferenceId(id),
                name: e.name.clone(),
                content_digest: e.content_digest,
            })
            .collect())
    }

    fn count_references(&mut self) -> Result<u64> {
        Ok(self.references.len() as u64)
    }

    fn count_postings(&mut self) -> Result<u64> {
        Ok(self.posting_count)
    }

    fn return_matches(
        &mut self,
        query_hashes: &[(Hash80, u32)],
    ) -> Result<Vec<(ReferenceId, i64)>> {
        let mut out = Vec::new();
        for (hash, query_offset) in query_hashes {
            let h32 = hash.project32();
            if let Some(bucket) = self.postings_by_hash.get(&h32) {
                for &(reference_id, reference_offset) in bucket {
                    let offset_difference = reference_offset as i64 - *query_offset as i64;
                    out.push((ReferenceId(reference_id), offset_difference));
                }
            }
        }
        Ok(out)
    }

    fn cleanup_unfingerprinted(&mut self) -> Result<u64> {
        let orphans: Vec<i32> = self
            .references
            .iter()
            .filter(|(_, e)| !e.fingerprinted)
            .map(|(&id, _)| id)
            .collect();
        let count = orphans.len() as u64;
        for id in orphans {
            self.delete_reference(ReferenceId(id))?;
        }
        Ok(count)
    }
}

impl MetadataStore for InMemoryStore {
    fn upsert_metadata(&mut self, record: MetadataRecord) -> Result<()> {
        self.metadata.insert(record.name.clone(), record);
        Ok(())
    }

    fn get_metadata(&mut self, name: &str) -> Result<Option<MetadataRecord>> {
        Ok(self.metadata.get(name).cloned())
    }

    fn delete_metadata(&mut self, name: &str) -> Result<()> {
        self.metadata.remove(name);
        Ok(())
    }

    fn list_metadata(&mut self) -> Result<Vec<MetadataRecord>> {
        Ok(self.metadata.values().cloned().collect())
    }

    fn clear_metadata(&mut self) -> Result<()> {
        self.metadata.clear();
        Ok(())
    }

    fn count_metadata(&mut self) -> Result<u64> {
        Ok(self.metadata.len() as u64)
    }

    fn query_by_field(
        &mut self,
        path: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<MetadataRecord>> {
        Ok(self
            .metadata
            .values()
            .filter(|m| m.value_at_path(path) == Some(value))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(seed: u8) -> ContentDigest {
        ContentDigest([seed; 20])
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut store = InMemoryStore::new();
        store.insert_reference("a", digest(1)).unwrap();
        let err = store.insert_reference("a", digest(2)).unwrap_err();
        assert!(matches!(err, SabiError::DuplicateReference { .. }));
    }

    #[test]
    fn postings_are_deduplicated_on_unique_triple() {
        let mut store = InMemoryStore::new();
        let id = store.insert_reference("a", digest(1)).unwrap();
        let hash = Hash80("abc".to_string());
        let inserted = store
            .insert_postings_batch(id, &[(hash.clone(), 5), (hash.clone(), 5)])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.count_postings().unwrap(), 1);
    }

    #[test]
    fn delete_reference_cascades_and_restores_posting_count() {
        let mut store = InMemoryStore::new();
        let id = store.insert_reference("a", digest(1)).unwrap();
        let before = store.count_postings().unwrap();
        store
            .insert_postings_batch(
                id,
                &[
                    (Hash80("h1".into()), 0),
                    (Hash80("h2".into()), 1),
                ],
            )
            .unwrap();
        store.set_fingerprinted(id).unwrap();
        assert_eq!(store.count_postings().unwrap(), before + 2);

        store.delete_reference(id).unwrap();
        assert_eq!(store.count_postings().unwrap(), before);
        assert_eq!(store.count_references().unwrap(), 0);
    }

    #[test]
    fn empty_resets_everything() {
        let mut store = InMemoryStore::new();
        let id = store.insert_reference("a", digest(1)).unwrap();
        store
            .insert_postings_batch(id, &[(Hash80("h1".into()), 0)])
            .unwrap();
        store.upsert_metadata(MetadataRecord::new("a", serde_json::json!({}))).unwrap();

        store.empty().unwrap();
        store.clear_metadata().unwrap();

        assert_eq!(store.count_references().unwrap(), 0);
        assert_eq!(store.count_postings().unwrap(), 0);
        assert_eq!(store.count_metadata().unwrap(), 0);
    }

    #[test]
    fn return_matches_never_dangles() {
        let mut store = InMemoryStore::new();
        let id = store.insert_reference("a", digest(1)).unwrap();
        store
            .insert_postings_batch(id, &[(Hash80("h1".into()), 3)])
            .unwrap();
        store.set_fingerprinted(id).unwrap();

        let matches = store
            .return_matches(&[(Hash80("h1".into()), 1)])
            .unwrap();
        assert_eq!(matches.len(), 1);
        let (found_id, offset_diff) = matches[0];
        assert_eq!(found_id, id);
        assert_eq!(offset_diff, 2);

        let refs: Vec<_> = store.list_references().unwrap();
        assert!(refs.iter().any(|r| r.reference_id == found_id));
    }

    #[test]
    fn cleanup_unfingerprinted_prunes_orphans() {
        let mut store = InMemoryStore::new();
        let orphan = store.insert_reference("orphan", digest(1)).unwrap();
        store
            .insert_postings_batch(orphan, &[(Hash80("h1".into()), 0)])
            .unwrap();
        // never called set_fingerprinted -> orphaned registration

        let done = store.insert_reference("done", digest(2)).unwrap();
        store.set_fingerprinted(done).unwrap();

        let pruned = store.cleanup_unfingerprinted().unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.count_references().unwrap(), 1);
    }
}
