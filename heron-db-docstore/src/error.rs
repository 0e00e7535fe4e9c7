//! Document-store error types
//!
//! These errors have specific semantics important to the write pipeline:
//! - `DuplicateKey` is the lock-contention signal (retry is appropriate)
//! - `VersionMismatch` is an optimistic-concurrency conflict
//! - Others are generally fatal for the enclosing transaction

use thiserror::Error;

/// Result type for document-store operations
pub type Result<T> = std::result::Result<T, DocStoreError>;

/// Document-store error type
#[derive(Error, Debug)]
pub enum DocStoreError {
    /// Unique-key insert found an existing document
    ///
    /// Expected under lock contention; callers back off and retry rather
    /// than treating this as fatal.
    #[error("Duplicate key in {collection}: {id}")]
    DuplicateKey { collection: String, id: String },

    /// Conditional replace found a different stored version
    #[error("Version mismatch in {collection}/{id}: expected {expected:?}, found {found:?}")]
    VersionMismatch {
        collection: String,
        id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// Document not found
    #[error("Not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Driver/network command failure
    #[error("Store command failed: {0}")]
    Command(String),

    /// Document (de)serialization failure
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DocStoreError {
    pub fn duplicate_key(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// True when this error is the expected contention signal
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// True for an optimistic-concurrency conflict
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }
}
