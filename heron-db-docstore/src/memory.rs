//! In-memory document store
//!
//! Stores collections in a `HashMap` behind `Arc<RwLock>` for interior
//! mutability, making it thread-safe and suitable for multi-threaded async
//! runtimes. Each operation takes the write lock once, so every primitive
//! is atomic with respect to concurrent callers — the same guarantee the
//! engine expects from a real document database.

use crate::error::{DocStoreError, Result};
use crate::{doc_version, DocStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

type Collections = HashMap<String, HashMap<String, Value>>;

/// In-memory document store for tests and embedding
#[derive(Clone, Default)]
pub struct MemoryDocStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryDocStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

impl Debug for MemoryDocStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self.collections.read();
        f.debug_struct("MemoryDocStore")
            .field("collection_count", &collections.len())
            .field(
                "doc_count",
                &collections.values().map(|c| c.len()).sum::<usize>(),
            )
            .finish()
    }
}

#[async_trait]
impl DocStore for MemoryDocStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn insert_unique(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.contains_key(id) {
            return Err(DocStoreError::duplicate_key(collection, id));
        }
        coll.insert(id.to_string(), doc);
        Ok(())
    }

    async fn replace_versioned(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
        doc: Value,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| DocStoreError::not_found(collection, id))?;
        let existing = coll
            .get(id)
            .ok_or_else(|| DocStoreError::not_found(collection, id))?;
        let found = doc_version(existing);
        if found != expected_version {
            return Err(DocStoreError::VersionMismatch {
                collection: collection.to_string(),
                id: id.to_string(),
                expected: expected_version,
                found,
            });
        }
        coll.insert(id.to_string(), doc);
        Ok(())
    }

    async fn replace(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn scan(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
