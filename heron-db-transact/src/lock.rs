//! Advisory per-resource locking
//!
//! All mutual exclusion is externalized into the store: a unique-key insert
//! into the lock collection either succeeds (lock held) or fails with a
//! duplicate key (another transaction holds the resource). A transaction
//! must lock *every* subject of change in one pass; partial success is
//! always unwound before backing off, so better to fail a whole write than
//! apply a partial multi-subject change.
//!
//! While the locks are held, each locked resource is guaranteed a stored
//! CBD: resources with no existing document get an uncommitted placeholder
//! (insert-if-absent) so "new resource" and "existing resource" follow one
//! code path.

use crate::error::{Result, TransactError};
use chrono::{DateTime, Utc};
use heron_db_core::{Cbd, ResourceKey, StoreConfig};
use heron_db_docstore::DocStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Stored advisory lock document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Lock key: the locked document's `resource|context` id
    #[serde(rename = "_id")]
    pub id: String,
    /// Transaction holding the lock
    #[serde(rename = "lockedForTransaction")]
    pub locked_for_transaction: String,
    /// Acquisition time
    #[serde(rename = "lockedAt")]
    pub locked_at: DateTime<Utc>,
}

/// Acquires and releases per-(resource, context) advisory locks
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<dyn DocStore>,
    config: Arc<StoreConfig>,
}

impl LockManager {
    pub fn new(store: Arc<dyn DocStore>, config: Arc<StoreConfig>) -> Self {
        Self { store, config }
    }

    /// Lock every key in one pass, retrying with jittered backoff
    ///
    /// On success returns the locked "before" CBDs in key order, creating
    /// placeholder documents for resources with no stored CBD. On exhausting
    /// the retry budget returns `LockContention` with nothing held and
    /// nothing mutated.
    pub async fn lock_all(&self, keys: &[ResourceKey], transaction_id: &str) -> Result<Vec<Cbd>> {
        let max_retries = self.config.lock.max_retries;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_lock_pass(keys, transaction_id).await? {
                Some(contested) => {
                    // Whole pass abandoned; partial locks already released.
                    if attempt > max_retries {
                        warn!(
                            transaction = %transaction_id,
                            resource = %contested,
                            attempts = attempt,
                            "lock retry budget exhausted"
                        );
                        return Err(TransactError::LockContention {
                            resource: contested.to_string(),
                            attempts: attempt,
                        });
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
                None => {
                    debug!(
                        transaction = %transaction_id,
                        locks = keys.len(),
                        attempts = attempt,
                        "all locks acquired"
                    );
                    return self.load_locked_cbds(keys).await;
                }
            }
        }
    }

    /// Attempt one full locking pass
    ///
    /// Returns the contested key when the pass hit contention (after
    /// releasing the pass's partial locks), or `None` when every key is held.
    async fn try_lock_pass(
        &self,
        keys: &[ResourceKey],
        transaction_id: &str,
    ) -> Result<Option<ResourceKey>> {
        let collection = self.config.lock_collection();
        let mut held: Vec<&ResourceKey> = Vec::with_capacity(keys.len());
        for key in keys {
            let record = LockRecord {
                id: key.doc_id(),
                locked_for_transaction: transaction_id.to_string(),
                locked_at: Utc::now(),
            };
            let doc = serde_json::to_value(&record)?;
            match self.store.insert_unique(&collection, &record.id, doc).await {
                Ok(()) => held.push(key),
                Err(e) if e.is_duplicate_key() => {
                    debug!(resource = %key, transaction = %transaction_id, "lock contention");
                    self.release_keys(&collection, held.into_iter()).await;
                    return Ok(Some(key.clone()));
                }
                Err(e) => {
                    // Command failure mid-pass: unwind before propagating.
                    self.release_keys(&collection, held.into_iter()).await;
                    return Err(e.into());
                }
            }
        }
        Ok(None)
    }

    /// Load the locked documents, inserting placeholders where absent
    async fn load_locked_cbds(&self, keys: &[ResourceKey]) -> Result<Vec<Cbd>> {
        let primary = self.config.primary_collection();
        let mut cbds = Vec::with_capacity(keys.len());
        for key in keys {
            let doc_id = key.doc_id();
            let cbd = match self.store.get(&primary, &doc_id).await? {
                Some(doc) => Cbd::from_doc(doc)?,
                None => {
                    let placeholder = Cbd::placeholder(key.clone());
                    match self
                        .store
                        .insert_unique(&primary, &doc_id, placeholder.to_doc()?)
                        .await
                    {
                        Ok(()) => placeholder,
                        // Lost a race with a writer that released between our
                        // get and insert; the stored document wins.
                        Err(e) if e.is_duplicate_key() => {
                            match self.store.get(&primary, &doc_id).await? {
                                Some(doc) => Cbd::from_doc(doc)?,
                                None => placeholder,
                            }
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            };
            cbds.push(cbd);
        }
        Ok(cbds)
    }

    /// Release every lock for a finished transaction
    ///
    /// Unconditional and idempotent: runs on success, failure, and rollback.
    /// Delete failures are logged and skipped so release never masks the
    /// error that ended the transaction.
    pub async fn release_all(&self, keys: &[ResourceKey]) {
        let collection = self.config.lock_collection();
        self.release_keys(&collection, keys.iter()).await;
    }

    async fn release_keys(&self, collection: &str, keys: impl Iterator<Item = &ResourceKey>) {
        for key in keys {
            if let Err(e) = self.store.delete(collection, &key.doc_id()).await {
                warn!(resource = %key, error = %e, "lock release failed");
            }
        }
    }

    /// Delay before the next locking pass: linear in the attempt count with
    /// ±25% jitter, capped at the configured maximum
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.lock.base_delay.as_secs_f64() * attempt as f64;
        let jitter = rand::random::<f64>() * 0.5 - 0.25;
        let delay = Duration::from_secs_f64(base * (1.0 + jitter));
        delay.min(self.config.lock.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_db_core::LockConfig;
    use heron_db_docstore::MemoryDocStore;

    fn manager(store: MemoryDocStore) -> LockManager {
        let config = StoreConfig::new("main", "people").with_lock(LockConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        });
        LockManager::new(Arc::new(store), Arc::new(config))
    }

    fn keys(names: &[&str]) -> Vec<ResourceKey> {
        names
            .iter()
            .map(|n| ResourceKey::new(*n, "default"))
            .collect()
    }

    #[tokio::test]
    async fn test_lock_all_creates_placeholders() {
        let store = MemoryDocStore::new();
        let mgr = manager(store.clone());
        let cbds = mgr.lock_all(&keys(&["ex:a", "ex:b"]), "t1").await.unwrap();
        assert_eq!(cbds.len(), 2);
        assert!(cbds.iter().all(|c| c.is_placeholder()));
        assert_eq!(store.count("main__people_locks"), 2);
        assert_eq!(store.count("main__people"), 2);
    }

    #[tokio::test]
    async fn test_contention_releases_partial_locks() {
        let store = MemoryDocStore::new();
        let mgr = manager(store.clone());

        // Another transaction holds ex:b.
        mgr.lock_all(&keys(&["ex:b"]), "t-other").await.unwrap();

        let err = mgr
            .lock_all(&keys(&["ex:a", "ex:b"]), "t1")
            .await
            .unwrap_err();
        assert!(err.is_retryable_contention());
        // Only the other transaction's lock remains.
        assert_eq!(store.count("main__people_locks"), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_release() {
        let store = MemoryDocStore::new();
        let config = StoreConfig::new("main", "people").with_lock(LockConfig {
            max_retries: 50,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        });
        let mgr = LockManager::new(Arc::new(store.clone()), Arc::new(config));
        let contested = keys(&["ex:a"]);

        mgr.lock_all(&contested, "t-first").await.unwrap();

        let retrier = {
            let mgr = mgr.clone();
            let contested = contested.clone();
            tokio::spawn(async move { mgr.lock_all(&contested, "t-second").await })
        };
        tokio::time::sleep(Duration::from_millis(2)).await;
        mgr.release_all(&contested).await;

        retrier.await.unwrap().unwrap();
        assert_eq!(store.count("main__people_locks"), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = MemoryDocStore::new();
        let mgr = manager(store.clone());
        let ks = keys(&["ex:a"]);
        mgr.lock_all(&ks, "t1").await.unwrap();
        mgr.release_all(&ks).await;
        mgr.release_all(&ks).await;
        assert_eq!(store.count("main__people_locks"), 0);
    }

    #[tokio::test]
    async fn test_backoff_delay_bounds() {
        let mgr = manager(MemoryDocStore::new());
        for attempt in 1..=10 {
            let d = mgr.backoff_delay(attempt);
            assert!(d <= Duration::from_millis(5));
        }
    }
}
