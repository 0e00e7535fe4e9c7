//! Document-store seam for heron-db
//!
//! The write engine assumes a single authoritative document store providing
//! per-document atomicity. This crate defines that seam as the [`DocStore`]
//! trait — the small set of atomic primitives the consistency protocol
//! needs — plus [`MemoryDocStore`], an in-memory implementation for tests
//! and embedding.
//!
//! ## Primitives
//!
//! - `insert_unique`: insert-if-absent; duplicate-key failure is the
//!   mutual-exclusion signal the Lock Manager is built on
//! - `replace_versioned`: compare-and-set on the stored `_version` field;
//!   the optimistic-concurrency primitive
//! - `replace` / `delete`: unconditional upsert and idempotent delete
//! - `get` / `scan`: point read and full-collection read
//!
//! Documents are `serde_json::Value`; typed layers (CBDs, transaction
//! records) serialize through serde at the call site.

pub mod error;
pub mod memory;

pub use error::{DocStoreError, Result};
pub use memory::MemoryDocStore;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

/// Name of the version field consulted by `replace_versioned`
pub const VERSION_FIELD: &str = "_version";

/// Per-document atomic operations against one authoritative store
///
/// Every method is atomic at document granularity: readers never observe a
/// half-written document.
#[async_trait]
pub trait DocStore: Debug + Send + Sync {
    /// Read a document by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Insert a document only if the id is absent
    ///
    /// Returns `DocStoreError::DuplicateKey` when a document already exists.
    /// This is the engine's sole mutual-exclusion primitive.
    async fn insert_unique(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Replace a document, conditional on its stored `_version` field
    ///
    /// `expected_version == None` matches a document with no version field
    /// (an uncommitted placeholder). Returns `DocStoreError::VersionMismatch`
    /// when the stored version differs and `DocStoreError::NotFound` when the
    /// document is absent.
    async fn replace_versioned(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
        doc: Value,
    ) -> Result<()>;

    /// Upsert a document unconditionally
    async fn replace(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Delete a document by id
    ///
    /// Idempotent: returns `Ok(false)` when the document did not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Read every `(id, document)` pair in a collection
    ///
    /// # Warning
    ///
    /// Full-collection read. Use only for bounded collections: transaction
    /// log queries and derived-artifact impact scans.
    async fn scan(&self, collection: &str) -> Result<Vec<(String, Value)>>;
}

/// Extract the `_version` field from a stored document
///
/// Absent or non-integer fields read as `None` (placeholder semantics).
pub fn doc_version(doc: &Value) -> Option<u64> {
    doc.get(VERSION_FIELD).and_then(Value::as_u64)
}
