//! Dispatch error types

use thiserror::Error;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Core error (aliasing, serialization)
    #[error("Core error: {0}")]
    Core(#[from] heron_db_core::Error),

    /// Document-store error
    #[error("Store error: {0}")]
    Store(#[from] heron_db_docstore::DocStoreError),

    /// Queue enqueue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Composite collaborator failure
    #[error("Composite error: {0}")]
    Composite(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    /// Create a queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        DispatchError::Queue(msg.into())
    }

    /// Create a composite error
    pub fn composite(msg: impl Into<String>) -> Self {
        DispatchError::Composite(msg.into())
    }
}
