//! Transaction error types
//!
//! The taxonomy mirrors the failure classes callers can observe:
//!
//! - `LockContention` — retryable by design, surfaced only after the retry
//!   budget is exhausted; nothing was mutated
//! - `CardinalityViolation` — rejected before any lock was taken
//! - `ConsistencyViolation` — caller's "before" snapshot is stale; detected
//!   under lock and rolled back
//! - `VersionConflict` — optimistic-concurrency anomaly under lock; fatal
//! - `Store` — driver/command failure; fatal, rolled back when under lock
//! - `RollbackFailed` — rollback itself failed; potential data corruption
//!   requiring manual intervention
//!
//! Callers receive exactly one of these or a success receipt; never a
//! partial success.

use heron_db_docstore::DocStoreError;
use thiserror::Error;

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, TransactError>;

/// Transaction errors
#[derive(Error, Debug)]
pub enum TransactError {
    /// Core error (aliasing, key rendering, serialization)
    #[error("Core error: {0}")]
    Core(#[from] heron_db_core::Error),

    /// Document-store command failure
    #[error("Store error: {0}")]
    Store(#[from] DocStoreError),

    /// Lock retry budget exhausted; no state was mutated
    #[error("Lock contention on {resource} after {attempts} attempts")]
    LockContention { resource: String, attempts: u32 },

    /// "after" graph violates a one-value-per-predicate constraint
    #[error("Cardinality violation: {subject} has {count} values for single-valued {predicate}")]
    CardinalityViolation {
        subject: String,
        predicate: String,
        count: usize,
    },

    /// A removal triple is not present in the locked document
    #[error("Consistency violation: {subject} does not hold ({predicate}, {object})")]
    ConsistencyViolation {
        subject: String,
        predicate: String,
        object: String,
    },

    /// Stored version diverged from the locked snapshot mid-transaction
    #[error("Version conflict on {resource}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        resource: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// Illegal transaction-log status transition
    #[error("Invalid transition for transaction {transaction_id}: {from} -> {to}")]
    InvalidTransition {
        transaction_id: String,
        from: String,
        to: String,
    },

    /// Transaction record not found in the log
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Rollback failed after a transaction error; documents may be left in
    /// their mid-transaction state
    #[error("Rollback of transaction {transaction_id} failed: {message}")]
    RollbackFailed {
        transaction_id: String,
        message: String,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransactError {
    /// True for the expected-under-concurrency contention failure
    pub fn is_retryable_contention(&self) -> bool {
        matches!(self, TransactError::LockContention { .. })
    }
}
