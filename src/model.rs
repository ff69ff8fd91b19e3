//! Core data types shared by the store, matcher, registrar and recognizer
//! (§3). Kept free of any persistence-backend concern so §4.3/§4.4's
//! contracts can be exercised against any backing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer identity of a registered reference recording (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceId(pub i32);

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 20-byte SHA-1 digest of a reference's source audio bytes (§3 invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest(pub [u8; 20]);

impl ContentDigest {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let out = hasher.finalize();
        let mut buf = [0u8; 20];
        buf.copy_from_slice(&out);
        ContentDigest(buf)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 20 {
            return None;
        }
        let mut buf = [0u8; 20];
        buf.copy_from_slice(&bytes);
        Some(ContentDigest(buf))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The 80-bit (20 hex char) hash identifier produced by §4.2. Transported
/// and persisted as a hex string; stores that need a fixed-width key derive
/// a [`Hash32`] projection with [`Hash80::project32`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash80(pub String);

impl Hash80 {
    /// Unique 32-bit projection used by backings that want a fixed-width
    /// in-memory key (§3's "Internal representation notes"). Both
    /// registration and query call this same function, so the two sides
    /// always agree.
    pub fn project32(&self) -> u32 {
        use std::hash::Hasher;
        use twox_hash::XxHash32;
        let mut hasher = XxHash32::with_seed(0);
        hasher.write(self.0.as_bytes());
        hasher.finish() as u32
    }

    /// Packs the hash into a signed 64-bit column for relational backings
    /// (§4.3: "hash stored as BIGINT ... internally self-consistent").
    pub fn to_i64(&self) -> i64 {
        let bytes = hex::decode(&self.0).unwrap_or_default();
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        i64::from_be_bytes(buf)
    }
}

impl fmt::Display for Hash80 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `(hash, reference_id, time_offset)` tuple in the index (§3).
#[derive(Debug, Clone)]
pub struct Posting {
    pub hash: Hash80,
    pub reference_id: ReferenceId,
    pub time_offset: u32,
}

/// A row in the reference catalog, as returned by `list_references` (§4.3).
#[derive(Debug, Clone)]
pub struct ReferenceRow {
    pub reference_id: ReferenceId,
    pub name: String,
    pub content_digest: ContentDigest,
}

/// Full reference record including lifecycle state (§3).
#[derive(Debug, Clone)]
pub struct Reference {
    pub id: ReferenceId,
    pub name: String,
    pub content_digest: ContentDigest,
    pub fingerprinted: bool,
}

/// User metadata document keyed by reference name (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub name: String,
    /// Schemaless JSON body (conventional fields: `game`, `song`, plus
    /// arbitrary user keys).
    pub doc: serde_json::Value,
    pub source_file: Option<String>,
    pub date_added: Option<DateTime<Utc>>,
    /// Per-reference debounce override (§4.7).
    pub debounce_seconds: Option<f64>,
}

impl MetadataRecord {
    pub fn new(name: impl Into<String>, doc: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            doc,
            source_file: None,
            date_added: Some(Utc::now()),
            debounce_seconds: None,
        }
    }

    /// Walks a dot-separated path (e.g. `artist.name`) through `doc` and
    /// returns the value found there, if any (§4.4 `query-by-field`).
    pub fn value_at_path(&self, path: &str) -> Option<&serde_json::Value> {
        let mut current = &self.doc;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_digest_roundtrips_through_hex() {
        let digest = ContentDigest::of_bytes(b"some audio bytes");
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 40);
        assert_eq!(ContentDigest::from_hex(&hex), Some(digest));
    }

    #[test]
    fn hash80_projection_is_deterministic() {
        let h = Hash80("deadbeefcafef00d1234".to_string());
        assert_eq!(h.project32(), h.project32());
    }

    #[test]
    fn value_at_path_walks_nested_objects() {
        let doc = serde_json::json!({"artist": {"name": "Test"}, "game": "Foo"});
        let record = MetadataRecord::new("ref", doc);
        assert_eq!(
            record.value_at_path("artist.name"),
            Some(&serde_json::Value::String("Test".to_string()))
        );
        assert_eq!(
            record.value_at_path("game"),
            Some(&serde_json::Value::String("Foo".to_string()))
        );
        assert_eq!(record.value_at_path("missing.path"), None);
    }
}
