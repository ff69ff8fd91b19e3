//! Fingerprint store (C3) and metadata store (C4) contracts (§4.3, §4.4).
//!
//! A single trait pair is implemented by three backings — [`memory`]
//! (non-durable, default, used by the whole test suite), [`postgres`] and
//! [`mysql`] (both transactional relational variants) — selected by a
//! config-typed tag, never by runtime type-introspection (§9).

pub mod memory;
pub mod mysql;
pub mod postgres;
pub mod schema;

use crate::error::Result;
use crate::model::{ContentDigest, Hash80, MetadataRecord, ReferenceId, ReferenceRow};

/// Polymorphic fingerprint index + reference catalog (§4.3).
pub trait FingerprintStore {
    /// Drops all references and postings.
    fn empty(&mut self) -> Result<()>;

    /// Reserves a reference row with `fingerprinted = false`.
    fn insert_reference(&mut self, name: &str, content_digest: ContentDigest)
        -> Result<ReferenceId>;

    /// Marks a reference's hash insertion complete.
    fn set_fingerprinted(&mut self, reference_id: ReferenceId) -> Result<()>;

    /// Idempotent insert of a single posting.
    fn insert_posting(&mut self, hash: &Hash80, reference_id: ReferenceId, time_offset: u32)
        -> Result<()>;

    /// Preferred high-throughput batch insert path. Returns the number of
    /// new (non-duplicate) rows actually written.
    fn insert_postings_batch(
        &mut self,
        reference_id: ReferenceId,
        postings: &[(Hash80, u32)],
    ) -> Result<usize>;

    /// Deletes a reference, cascading to its postings.
    fn delete_reference(&mut self, reference_id: ReferenceId) -> Result<()>;

    /// Lists all `fingerprinted = true` references.
    fn list_references(&mut self) -> Result<Vec<ReferenceRow>>;

    fn count_references(&mut self) -> Result<u64>;
    fn count_postings(&mut self) -> Result<u64>;

    /// Hot query path (§4.5): for every `(hash, query_offset)` that hits a
    /// stored posting, yields `(reference_id, offset_difference)` where
    /// `offset_difference = reference_offset - query_offset`.
    fn return_matches(&mut self, query_hashes: &[(Hash80, u32)]) -> Result<Vec<(ReferenceId, i64)>>;

    /// Prunes references left over from an aborted registration
    /// (`fingerprinted = false` rows with no chance of completing).
    fn cleanup_unfingerprinted(&mut self) -> Result<u64>;
}

/// Polymorphic per-reference user metadata store (§4.4). Independent
/// lifecycle from [`FingerprintStore`], but `clear_all` is called in
/// tandem with `empty()`.
pub trait MetadataStore {
    fn upsert_metadata(&mut self, record: MetadataRecord) -> Result<()>;
    fn get_metadata(&mut self, name: &str) -> Result<Option<MetadataRecord>>;
    fn delete_metadata(&mut self, name: &str) -> Result<()>;
    fn list_metadata(&mut self) -> Result<Vec<MetadataRecord>>;
    fn clear_metadata(&mut self) -> Result<()>;
    fn count_metadata(&mut self) -> Result<u64>;

    /// Returns every record whose JSON document yields `value` at the
    /// dot-separated `path`.
    fn query_by_field(&mut self, path: &str, value: &serde_json::Value)
        -> Result<Vec<MetadataRecord>>;
}
