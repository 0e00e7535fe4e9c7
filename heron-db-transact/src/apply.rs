//! Update application
//!
//! Turns a ChangeSet plus the locked "before" documents into committed
//! "after" documents. Each write is a single atomic per-document
//! conditional update matching on primary key and current version; within
//! one transaction, earlier per-document commits are not individually
//! undone when a later one fails — whole-transaction rollback restores the
//! pre-transaction snapshots captured under lock.

use crate::changeset::{ChangeRecord, ChangeSet};
use crate::error::{Result, TransactError};
use chrono::Utc;
use heron_db_core::{alias_predicates, AliasResolver, Cbd, ResourceKey, StoreConfig};
use heron_db_docstore::{DocStore, DocStoreError};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Result of applying one ChangeSet
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// After-state of every mutated document, in change-record order
    pub new_cbds: Vec<Cbd>,
    /// Subject URIs committed for the first time (placeholder adoption)
    pub created_subjects: Vec<String>,
    /// Subject URIs updated in place
    pub updated_subjects: Vec<String>,
    /// Subject URIs whose documents became tombstones
    pub deleted_subjects: Vec<String>,
}

/// Applies change records to locked documents
#[derive(Debug, Clone)]
pub struct UpdateApplier {
    store: Arc<dyn DocStore>,
    config: Arc<StoreConfig>,
    resolver: Arc<dyn AliasResolver>,
}

impl UpdateApplier {
    pub fn new(
        store: Arc<dyn DocStore>,
        config: Arc<StoreConfig>,
        resolver: Arc<dyn AliasResolver>,
    ) -> Self {
        Self {
            store,
            config,
            resolver,
        }
    }

    /// Apply every change record against its locked before-CBD
    ///
    /// Fails with `ConsistencyViolation` when a removal triple is not
    /// present in the locked document (the caller edited a stale snapshot)
    /// and with `VersionConflict` when the stored version no longer matches
    /// the snapshot taken under lock. Either failure aborts the whole
    /// transaction; the caller drives rollback.
    pub async fn apply_change_set(
        &self,
        change_set: &ChangeSet,
        original_cbds: &[Cbd],
        context: &str,
    ) -> Result<ApplyOutcome> {
        let primary = self.config.primary_collection();
        let by_key: FxHashMap<String, &Cbd> = original_cbds
            .iter()
            .map(|c| (c.key.doc_id(), c))
            .collect();

        let mut outcome = ApplyOutcome::default();
        for record in &change_set.records {
            let key = self.key_for(&record.subject, context)?;
            let before = by_key.get(&key.doc_id()).copied().ok_or_else(|| {
                heron_db_core::Error::other(format!("no locked document for {}", key))
            })?;

            let new_cbd = self.apply_record(record, before)?;
            let was_created = before.is_placeholder();
            let was_deleted = new_cbd.is_tombstone();
            let expected = before.version;

            match self
                .store
                .replace_versioned(&primary, &key.doc_id(), expected, new_cbd.to_doc()?)
                .await
            {
                Ok(()) => {}
                Err(DocStoreError::VersionMismatch { found, .. }) => {
                    // The Lock Manager should make this impossible; a hit
                    // means a writer bypassed the lock collection.
                    error!(
                        resource = %key,
                        expected = ?expected,
                        found = ?found,
                        "version conflict under lock; concurrent writer bypassed locking"
                    );
                    return Err(TransactError::VersionConflict {
                        resource: key.to_string(),
                        expected,
                        found,
                    });
                }
                Err(e) => return Err(e.into()),
            }

            debug!(
                resource = %key,
                version = new_cbd.version.unwrap_or(0),
                tombstone = was_deleted,
                "document committed"
            );
            if was_deleted {
                outcome.deleted_subjects.push(record.subject.clone());
            } else if was_created {
                outcome.created_subjects.push(record.subject.clone());
            } else {
                outcome.updated_subjects.push(record.subject.clone());
            }
            outcome.new_cbds.push(new_cbd);
        }
        Ok(outcome)
    }

    /// Compute the after-document for one record, without writing
    fn apply_record(&self, record: &ChangeRecord, before: &Cbd) -> Result<Cbd> {
        let mut triples = before.triples.clone();

        // Removals first. Every removal triple must be present in the locked
        // document; a miss means the underlying data no longer matches what
        // the caller thought it was editing.
        for stmt in &record.removals {
            let pred_alias = self.resolver.uri_to_alias(&stmt.predicate)?;
            let removed = triples
                .get_mut(&pred_alias)
                .and_then(|values| {
                    values
                        .iter()
                        .position(|v| v == &stmt.object)
                        .map(|pos| values.remove(pos))
                })
                .is_some();
            if !removed {
                return Err(TransactError::ConsistencyViolation {
                    subject: record.subject.clone(),
                    predicate: stmt.predicate.clone(),
                    object: stmt.object.to_string(),
                });
            }
            if triples.get(&pred_alias).map(Vec::is_empty).unwrap_or(false) {
                triples.remove(&pred_alias);
            }
        }

        // Then additions, ignoring exact duplicates.
        let mut added = heron_db_core::graph::PredicateMap::new();
        for stmt in &record.additions {
            added
                .entry(stmt.predicate.clone())
                .or_default()
                .push(stmt.object.clone());
        }
        for (pred_alias, values) in alias_predicates(&added, self.resolver.as_ref())? {
            let existing = triples.entry(pred_alias).or_default();
            for v in values {
                if !existing.contains(&v) {
                    existing.push(v);
                }
            }
        }

        // Empty result becomes a tombstone: the document is kept for version
        // and impact-index bookkeeping, never physically deleted here.
        Ok(Cbd {
            key: before.key.clone(),
            version: Some(before.next_version()),
            created_at: before.created_at,
            updated_at: Utc::now(),
            triples,
            impact_index: before.impact_index.clone(),
        })
    }

    /// Alias-form key of a subject in this transaction's context
    fn key_for(&self, subject: &str, context: &str) -> Result<ResourceKey> {
        let alias = self.resolver.uri_to_alias(subject)?;
        Ok(ResourceKey::new(alias, context))
    }
}
