//! Error types for kindred.

use thiserror::Error;

/// Errors that can occur while building, querying or persisting an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The backend does not implement this lifecycle operation.
    #[error("operation not supported by {backend} index: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Backend identifier did not match any registered backend.
    #[error("unknown index backend: {0}")]
    UnknownBackend(String),

    /// Query issued before `fit` or `load`.
    #[error("{0} index has not been fit or loaded")]
    NotFitted(&'static str),

    /// Fuzzy-hash digest does not have the `block_size:sig1:sig2` shape.
    #[error("malformed digest {digest:?}: {reason}")]
    MalformedDigest { digest: String, reason: String },

    /// Sample lacks a feature the backend needs.
    #[error("sample {identity} has no usable {feature:?} feature")]
    MissingFeature { identity: String, feature: String },

    /// Content hash is not a hex string.
    #[error("invalid sample identity: {0:?}")]
    InvalidIdentity(String),

    /// Vector dimensionality differs from the index's.
    #[error("dimension mismatch: index has {expected} dimensions, input has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Backing SQLite store failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// File system failure under the index directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a persisted blob failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexError {
    pub(crate) fn malformed(digest: &str, reason: impl Into<String>) -> Self {
        Self::MalformedDigest {
            digest: digest.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<postcard::Error> for IndexError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(format!("postcard error: {e}"))
    }
}

impl From<toml::de::Error> for IndexError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
