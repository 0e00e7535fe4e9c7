//! The save pipeline
//!
//! `WriteEngine::save_changes` is the single entry point for mutating
//! resource state:
//!
//! 1. Compute the ChangeSet (no-op saves return immediately)
//! 2. Cardinality check on the "after" graph — fail fast, pre-lock
//! 3. Lock every subject of change in one pass
//! 4. Open the transaction log entry (locks held, nothing mutated yet)
//! 5. Apply the change set document by document
//! 6. Complete the transaction, release locks
//! 7. Dispatch impact propagation (failures logged, never propagated)
//!
//! Every stage after lock acquisition returns an explicit error value; any
//! such error drives the dedicated rollback function (mark `cancelling`,
//! restore originals, mark `failed`, release locks) before the original
//! error is re-raised. There is no unwinding-as-cleanup.

use crate::apply::{ApplyOutcome, UpdateApplier};
use crate::changeset::{compute_change_set, ChangeMeta, ChangeSet};
use crate::error::{Result, TransactError};
use crate::lock::LockManager;
use crate::txlog::TransactionLog;
use heron_db_core::{AliasResolver, Cbd, GraphIndex, ResourceKey, StoreConfig};
use heron_db_dispatch::Dispatcher;
use heron_db_docstore::DocStore;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Transaction id helper
#[derive(Debug, Clone)]
pub struct TxnId;

impl TxnId {
    /// Generate a fresh transaction id
    pub fn new() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Acknowledgement returned by a successful save
#[derive(Debug, Clone, Default)]
pub struct SaveReceipt {
    /// Transaction id, empty for a no-op save
    pub transaction_id: String,
    /// Triples added
    pub addition_count: usize,
    /// Triples removed
    pub removal_count: usize,
    /// Subject URIs committed for the first time
    pub created_subjects: Vec<String>,
    /// Subject URIs updated in place
    pub updated_subjects: Vec<String>,
    /// Subject URIs tombstoned
    pub deleted_subjects: Vec<String>,
}

impl SaveReceipt {
    /// True when the save found nothing to change
    pub fn is_no_op(&self) -> bool {
        self.addition_count == 0 && self.removal_count == 0
    }
}

/// The transactional update pipeline
///
/// Construct one per (store, pod) at startup and share it; all state lives
/// in the document store.
#[derive(Debug)]
pub struct WriteEngine {
    store: Arc<dyn DocStore>,
    config: Arc<StoreConfig>,
    resolver: Arc<dyn AliasResolver>,
    locks: LockManager,
    txlog: TransactionLog,
    applier: UpdateApplier,
    dispatcher: Option<Dispatcher>,
}

impl WriteEngine {
    pub fn new(
        store: Arc<dyn DocStore>,
        config: Arc<StoreConfig>,
        resolver: Arc<dyn AliasResolver>,
    ) -> Self {
        let locks = LockManager::new(store.clone(), config.clone());
        let txlog = TransactionLog::new(store.clone(), &config);
        let applier = UpdateApplier::new(store.clone(), config.clone(), resolver.clone());
        Self {
            store,
            config,
            resolver,
            locks,
            txlog,
            applier,
            dispatcher: None,
        }
    }

    /// Builder method to attach the impact propagation dispatcher
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Transaction log accessor (replay, audit, purge)
    pub fn transaction_log(&self) -> &TransactionLog {
        &self.txlog
    }

    /// Compute and durably apply the difference between two graph snapshots
    ///
    /// `context` is the alias-form context partitioning each resource's
    /// description. Returns a receipt or exactly one typed error; never a
    /// partial success.
    pub async fn save_changes(
        &self,
        before: &GraphIndex,
        after: &GraphIndex,
        context: &str,
        meta: ChangeMeta,
    ) -> Result<SaveReceipt> {
        let change_set = compute_change_set(before, after, meta);
        if !change_set.has_changes() {
            return Ok(SaveReceipt::default());
        }

        // Fail fast, before any lock is taken.
        self.check_cardinality(&change_set)?;

        let transaction_id = TxnId::new();
        let keys = self.keys_of_change(&change_set, context)?;

        // Lock acquisition mutates nothing on failure.
        let original_cbds = self.locks.lock_all(&keys, &transaction_id).await?;

        // Open the log entry while locks are held and documents untouched;
        // a failure here needs lock release but no rollback.
        if let Err(e) = self
            .txlog
            .create_new_transaction(
                &transaction_id,
                change_set.records_payload()?,
                original_cbds.clone(),
                &self.config.store,
                &self.config.pod,
            )
            .await
        {
            self.locks.release_all(&keys).await;
            return Err(e);
        }

        let outcome = match self
            .applier
            .apply_change_set(&change_set, &original_cbds, context)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return Err(self
                    .rollback(&transaction_id, &keys, &original_cbds, e)
                    .await);
            }
        };

        if let Err(e) = self
            .txlog
            .complete_transaction(&transaction_id, outcome.new_cbds.clone())
            .await
        {
            return Err(self
                .rollback(&transaction_id, &keys, &original_cbds, e)
                .await);
        }

        self.locks.release_all(&keys).await;

        self.propagate(&change_set, &outcome, context).await;

        info!(
            transaction = %transaction_id,
            additions = change_set.addition_count(),
            removals = change_set.removal_count(),
            subjects = change_set.records.len(),
            "changes saved"
        );
        Ok(SaveReceipt {
            transaction_id,
            addition_count: change_set.addition_count(),
            removal_count: change_set.removal_count(),
            created_subjects: outcome.created_subjects,
            updated_subjects: outcome.updated_subjects,
            deleted_subjects: outcome.deleted_subjects,
        })
    }

    /// Expand a resource's stored CBD back into a graph index
    ///
    /// Returns `None` for unknown resources and uncommitted placeholders;
    /// tombstones read as an empty graph.
    pub async fn get_resource(&self, subject: &str, context: &str) -> Result<Option<GraphIndex>> {
        let alias = self.resolver.uri_to_alias(subject)?;
        let key = ResourceKey::new(alias, context);
        let primary = self.config.primary_collection();
        match self.store.get(&primary, &key.doc_id()).await? {
            Some(doc) => {
                let cbd = Cbd::from_doc(doc)?;
                if cbd.is_placeholder() {
                    return Ok(None);
                }
                Ok(Some(cbd.to_graph(self.resolver.as_ref())?))
            }
            None => Ok(None),
        }
    }

    /// Enforce one-value-per-predicate constraints on the "after" graph
    fn check_cardinality(&self, change_set: &ChangeSet) -> Result<()> {
        if self.config.single_valued_predicates.is_empty() {
            return Ok(());
        }
        for (subject, preds) in change_set.after.iter() {
            for (predicate, values) in preds {
                if values.len() > 1 && self.config.single_valued_predicates.contains(predicate) {
                    return Err(TransactError::CardinalityViolation {
                        subject: subject.clone(),
                        predicate: predicate.clone(),
                        count: values.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Alias-form keys of every subject of change, in record order
    fn keys_of_change(&self, change_set: &ChangeSet, context: &str) -> Result<Vec<ResourceKey>> {
        change_set
            .records
            .iter()
            .map(|r| {
                let alias = self.resolver.uri_to_alias(&r.subject)?;
                Ok(ResourceKey::new(alias, context))
            })
            .collect()
    }

    /// Undo a transaction that failed after locks were acquired
    ///
    /// Marks the log entry `cancelling`, restores every original document
    /// unconditionally, marks it `failed`, and releases the locks. Returns
    /// the original error for re-raising, or the higher-severity
    /// `RollbackFailed` when restoration itself fails — that escalation
    /// signals potential data corruption requiring manual intervention.
    async fn rollback(
        &self,
        transaction_id: &str,
        keys: &[ResourceKey],
        original_cbds: &[Cbd],
        cause: TransactError,
    ) -> TransactError {
        warn!(transaction = %transaction_id, cause = %cause, "rolling back transaction");

        if let Err(e) = self
            .txlog
            .cancel_transaction(transaction_id, Some(&cause.to_string()))
            .await
        {
            return self.escalate(transaction_id, keys, e, cause).await;
        }

        let primary = self.config.primary_collection();
        for cbd in original_cbds {
            let doc = match cbd.to_doc() {
                Ok(doc) => doc,
                Err(e) => return self.escalate(transaction_id, keys, e.into(), cause).await,
            };
            if let Err(e) = self.store.replace(&primary, &cbd.key.doc_id(), doc).await {
                return self.escalate(transaction_id, keys, e.into(), cause).await;
            }
        }

        if let Err(e) = self
            .txlog
            .fail_transaction(transaction_id, Some(&cause.to_string()))
            .await
        {
            return self.escalate(transaction_id, keys, e, cause).await;
        }

        self.locks.release_all(keys).await;
        cause
    }

    /// Escalate a rollback failure
    ///
    /// Locks are still released so the resources do not stay wedged, but
    /// the returned error supersedes the original cause.
    async fn escalate(
        &self,
        transaction_id: &str,
        keys: &[ResourceKey],
        rollback_error: TransactError,
        cause: TransactError,
    ) -> TransactError {
        error!(
            transaction = %transaction_id,
            rollback_error = %rollback_error,
            original_cause = %cause,
            "rollback failed; documents may be left mid-transaction"
        );
        self.locks.release_all(keys).await;
        TransactError::RollbackFailed {
            transaction_id: transaction_id.to_string(),
            message: format!("{} (while rolling back: {})", rollback_error, cause),
        }
    }

    /// Hand the committed change to the dispatcher; never fails the save
    async fn propagate(&self, change_set: &ChangeSet, outcome: &ApplyOutcome, context: &str) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };
        let created: FxHashSet<String> = outcome.created_subjects.iter().cloned().collect();
        let deleted: FxHashSet<String> = outcome.deleted_subjects.iter().cloned().collect();
        match dispatcher
            .dispatch(
                &change_set.subjects_and_predicates(),
                &created,
                &deleted,
                context,
            )
            .await
        {
            Ok(report) => {
                info!(
                    sync = report.sync_regenerated,
                    queued = report.async_enqueued,
                    failures = report.failures,
                    "impact propagation dispatched"
                );
            }
            Err(e) => {
                warn!(error = %e, "impact propagation failed; derived artifacts left stale");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_ids_are_unique() {
        assert_ne!(TxnId::new(), TxnId::new());
    }

    #[test]
    fn test_empty_receipt_is_no_op() {
        assert!(SaveReceipt::default().is_no_op());
    }
}
