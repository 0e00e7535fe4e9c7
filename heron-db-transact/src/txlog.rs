//! Write-ahead transaction log
//!
//! An append-only, queryable record of every attempted mutation. A
//! transaction is opened after locks are acquired and before any document
//! is touched, so the log always holds a consistent "before" snapshot for
//! rollback even if the process crashes mid-mutation; completion records
//! the after-state of every mutated document, enabling replay of history
//! without re-deriving diffs.
//!
//! ## Status machine
//!
//! `in_progress` → `completed` (terminal, success)
//! `in_progress` → `cancelling` → `failed` (terminal, failure path)
//!
//! Transitions are strictly forward; anything else is an
//! `InvalidTransition` error. Records are never deleted except by explicit
//! purge.

use crate::error::{Result, TransactError};
use chrono::{DateTime, Utc};
use heron_db_core::{Cbd, StoreConfig};
use heron_db_docstore::DocStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnStatus {
    /// Locks held, mutation under way
    InProgress,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed,
    /// Rollback under way
    Cancelling,
}

impl TxnStatus {
    /// Whether the machine may move from `self` to `next`
    pub fn can_transition_to(&self, next: TxnStatus) -> bool {
        matches!(
            (self, next),
            (TxnStatus::InProgress, TxnStatus::Completed)
                | (TxnStatus::InProgress, TxnStatus::Cancelling)
                | (TxnStatus::InProgress, TxnStatus::Failed)
                | (TxnStatus::Cancelling, TxnStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxnStatus::InProgress => "in_progress",
            TxnStatus::Completed => "completed",
            TxnStatus::Failed => "failed",
            TxnStatus::Cancelling => "cancelling",
        }
    }
}

/// One logged transaction attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxnRecord {
    /// Transaction id (unique across the log)
    pub id: String,
    /// Store the transaction wrote to
    pub store_name: String,
    /// Pod the transaction wrote to
    pub pod_name: String,
    /// Lifecycle status
    pub status: TxnStatus,
    /// Serialized change records (what changed, reified)
    pub changes: serde_json::Value,
    /// Pre-transaction snapshot of every locked document
    pub original_cbds: Vec<Cbd>,
    /// After-state of every mutated document; set on completion
    #[serde(default)]
    pub new_cbds: Vec<Cbd>,
    /// Lock-acquisition time
    pub start_time: DateTime<Utc>,
    /// Completion time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Failure time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_time: Option<DateTime<Utc>>,
    /// Error that ended the transaction, when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only log over the store's transaction collection
#[derive(Debug, Clone)]
pub struct TransactionLog {
    store: Arc<dyn DocStore>,
    collection: String,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn DocStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            collection: config.txlog_collection(),
        }
    }

    /// Open a transaction: status `in_progress`, before-snapshots captured
    pub async fn create_new_transaction(
        &self,
        id: &str,
        changes: serde_json::Value,
        original_cbds: Vec<Cbd>,
        store_name: &str,
        pod_name: &str,
    ) -> Result<()> {
        let record = TxnRecord {
            id: id.to_string(),
            store_name: store_name.to_string(),
            pod_name: pod_name.to_string(),
            status: TxnStatus::InProgress,
            changes,
            original_cbds,
            new_cbds: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            failed_time: None,
            error: None,
        };
        let doc = serde_json::to_value(&record)?;
        self.store.insert_unique(&self.collection, id, doc).await?;
        info!(transaction = %id, "transaction opened");
        Ok(())
    }

    /// Mark a transaction completed, recording the after-state documents
    pub async fn complete_transaction(&self, id: &str, new_cbds: Vec<Cbd>) -> Result<()> {
        self.transition(id, TxnStatus::Completed, |record| {
            record.new_cbds = new_cbds;
            record.end_time = Some(Utc::now());
        })
        .await?;
        info!(transaction = %id, "transaction completed");
        Ok(())
    }

    /// Mark a transaction as rolling back
    pub async fn cancel_transaction(&self, id: &str, error: Option<&str>) -> Result<()> {
        self.transition(id, TxnStatus::Cancelling, |record| {
            if let Some(e) = error {
                record.error = Some(e.to_string());
            }
        })
        .await
    }

    /// Mark a transaction failed (terminal)
    pub async fn fail_transaction(&self, id: &str, error: Option<&str>) -> Result<()> {
        self.transition(id, TxnStatus::Failed, |record| {
            record.failed_time = Some(Utc::now());
            if let Some(e) = error {
                record.error = Some(e.to_string());
            }
        })
        .await
    }

    /// Read one transaction record
    pub async fn get_transaction(&self, id: &str) -> Result<Option<TxnRecord>> {
        match self.store.get(&self.collection, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Completed transactions, optionally filtered, ordered by end time
    ///
    /// Gives the replayable happens-before order of committed work for a
    /// store/pod; `from`/`to` bound the completion time (inclusive).
    pub async fn get_completed_transactions(
        &self,
        store_name: Option<&str>,
        pod_name: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TxnRecord>> {
        let mut records: Vec<TxnRecord> = Vec::new();
        for (_, doc) in self.store.scan(&self.collection).await? {
            let record: TxnRecord = serde_json::from_value(doc)?;
            if record.status != TxnStatus::Completed {
                continue;
            }
            if store_name.map(|s| record.store_name != s).unwrap_or(false) {
                continue;
            }
            if pod_name.map(|p| record.pod_name != p).unwrap_or(false) {
                continue;
            }
            let Some(end) = record.end_time else { continue };
            if from.map(|f| end < f).unwrap_or(false) || to.map(|t| end > t).unwrap_or(false) {
                continue;
            }
            records.push(record);
        }
        records.sort_by_key(|r| r.end_time);
        Ok(records)
    }

    /// Delete terminal records that started before the cutoff
    ///
    /// Returns the number of purged records. In-progress and cancelling
    /// transactions are never purged.
    pub async fn purge_transactions(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut purged = 0;
        for (id, doc) in self.store.scan(&self.collection).await? {
            let record: TxnRecord = serde_json::from_value(doc)?;
            let terminal = matches!(record.status, TxnStatus::Completed | TxnStatus::Failed);
            if terminal && record.start_time < before && self.store.delete(&self.collection, &id).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Load, validate, mutate, and write back one record
    async fn transition(
        &self,
        id: &str,
        next: TxnStatus,
        apply: impl FnOnce(&mut TxnRecord),
    ) -> Result<()> {
        let mut record = self
            .get_transaction(id)
            .await?
            .ok_or_else(|| TransactError::TransactionNotFound(id.to_string()))?;
        if !record.status.can_transition_to(next) {
            return Err(TransactError::InvalidTransition {
                transaction_id: id.to_string(),
                from: record.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        record.status = next;
        apply(&mut record);
        let doc = serde_json::to_value(&record)?;
        self.store.replace(&self.collection, id, doc).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_db_docstore::MemoryDocStore;
    use serde_json::json;

    fn log() -> TransactionLog {
        let config = StoreConfig::new("main", "people");
        TransactionLog::new(Arc::new(MemoryDocStore::new()), &config)
    }

    async fn open(log: &TransactionLog, id: &str) {
        log.create_new_transaction(id, json!([]), Vec::new(), "main", "people")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_success_path() {
        let log = log();
        open(&log, "t1").await;
        log.complete_transaction("t1", Vec::new()).await.unwrap();
        let record = log.get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(record.status, TxnStatus::Completed);
        assert!(record.end_time.is_some());
    }

    #[tokio::test]
    async fn test_failure_path_goes_through_cancelling() {
        let log = log();
        open(&log, "t1").await;
        log.cancel_transaction("t1", Some("boom")).await.unwrap();
        let record = log.get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(record.status, TxnStatus::Cancelling);

        log.fail_transaction("t1", Some("boom")).await.unwrap();
        let record = log.get_transaction("t1").await.unwrap().unwrap();
        assert_eq!(record.status, TxnStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.failed_time.is_some());
    }

    #[tokio::test]
    async fn test_terminal_states_reject_transitions() {
        let log = log();
        open(&log, "t1").await;
        log.complete_transaction("t1", Vec::new()).await.unwrap();

        let err = log.cancel_transaction("t1", None).await.unwrap_err();
        assert!(matches!(err, TransactError::InvalidTransition { .. }));
        let err = log.complete_transaction("t1", Vec::new()).await.unwrap_err();
        assert!(matches!(err, TransactError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_transaction_id_rejected() {
        let log = log();
        open(&log, "t1").await;
        let err = log
            .create_new_transaction("t1", json!([]), Vec::new(), "main", "people")
            .await
            .unwrap_err();
        assert!(matches!(err, TransactError::Store(_)));
    }

    #[tokio::test]
    async fn test_completed_query_filters() {
        let log = log();
        open(&log, "t1").await;
        log.complete_transaction("t1", Vec::new()).await.unwrap();
        open(&log, "t2").await;
        log.cancel_transaction("t2", None).await.unwrap();
        log.fail_transaction("t2", None).await.unwrap();
        log.create_new_transaction("t3", json!([]), Vec::new(), "main", "orgs")
            .await
            .unwrap();
        log.complete_transaction("t3", Vec::new()).await.unwrap();

        let all = log
            .get_completed_transactions(None, None, None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let people = log
            .get_completed_transactions(Some("main"), Some("people"), None, None)
            .await
            .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].id, "t1");

        let future = Utc::now() + chrono::Duration::hours(1);
        let none = log
            .get_completed_transactions(None, None, Some(future), None)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_purge_spares_in_progress() {
        let log = log();
        open(&log, "t1").await;
        log.complete_transaction("t1", Vec::new()).await.unwrap();
        open(&log, "t2").await;

        let cutoff = Utc::now() + chrono::Duration::hours(1);
        let purged = log.purge_transactions(cutoff).await.unwrap();
        assert_eq!(purged, 1);
        assert!(log.get_transaction("t1").await.unwrap().is_none());
        assert!(log.get_transaction("t2").await.unwrap().is_some());
    }
}
