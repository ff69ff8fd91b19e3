//! Error taxonomy shared by every fallible operation in the crate (§7).

use thiserror::Error;

/// The library-wide error type. Every variant carries the offending
/// artifact (a file path or a reference name) and a one-line reason,
/// as required by §7's "user-visible behavior" clause.
#[derive(Debug, Error)]
pub enum SabiError {
    #[error("invalid input ({context}): {reason}")]
    InvalidInput { context: String, reason: String },

    #[error("reference already registered: {name}")]
    DuplicateReference { name: String },

    #[error("store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("store conflict on {context}: {reason}")]
    StoreConflict { context: String, reason: String },

    #[error("{op} timed out after {seconds:.1}s")]
    Timeout { op: String, seconds: f64 },

    #[error("reference not found: {name}")]
    NotFound { name: String },

    #[error("I/O error on {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed YAML in {context}: {source}")]
    Yaml {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("audio decode failed for {context}: {reason}")]
    Decode { context: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SabiError>;

impl SabiError {
    pub fn invalid_input(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn decode(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
            reason: reason.into(),
        }
    }
}
