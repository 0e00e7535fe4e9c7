//! Impact propagation dispatcher
//!
//! Invoked once per completed transaction with the set of changed
//! (subject, predicates) pairs. Resolves regeneration candidates in two
//! independent passes, merges and deduplicates them, then routes each
//! candidate inline or onto the job queue per the configured mode for its
//! artifact kind.
//!
//! Failure semantics: the primary transaction is already committed when
//! dispatch runs. A failure resolving or regenerating one artifact is
//! logged and isolated; derived data is allowed to be transiently stale,
//! never to block or falsify primary writes.

use crate::composite::{Composite, ImpactedSubject, OperationType, ResourcesAndPredicates};
use crate::error::Result;
use crate::queue::JobQueue;
use heron_db_core::{vocab, AliasResolver, ArtifactKind, Cbd, DispatchMode, ResourceKey, StoreConfig};
use heron_db_docstore::DocStore;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome summary of one dispatch invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Candidates regenerated inline
    pub sync_regenerated: usize,
    /// Candidates serialized onto the job queue
    pub async_enqueued: usize,
    /// Isolated failures (resolution, regeneration, or enqueue)
    pub failures: usize,
}

/// One deduplicated regeneration candidate
#[derive(Debug, Clone)]
struct Candidate {
    key: ResourceKey,
    kind: ArtifactKind,
    spec_types: BTreeSet<String>,
    operation_types: BTreeSet<OperationType>,
    is_deleted: bool,
}

/// Impact propagation dispatcher
///
/// Holds a closed list of composites, one per artifact kind in use. The
/// list is fixed at construction; there is no runtime registration.
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<dyn DocStore>,
    resolver: Arc<dyn AliasResolver>,
    config: Arc<StoreConfig>,
    composites: Vec<Arc<dyn Composite>>,
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DocStore>,
        resolver: Arc<dyn AliasResolver>,
        config: Arc<StoreConfig>,
        composites: Vec<Arc<dyn Composite>>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            store,
            resolver,
            config,
            composites,
            queue,
        }
    }

    /// Resolve and route regeneration for one committed transaction
    ///
    /// `changes` maps changed subject URIs to the predicates that changed on
    /// them; `created_subjects` names the subjects committed for the first
    /// time and `deleted_subjects` those whose documents became tombstones.
    /// `context` is the alias-form context of the transaction.
    pub async fn dispatch(
        &self,
        changes: &ResourcesAndPredicates,
        created_subjects: &FxHashSet<String>,
        deleted_subjects: &FxHashSet<String>,
        context: &str,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        if changes.is_empty() {
            return Ok(report);
        }

        // Alias-form keys of every changed subject, plus which were created
        // or deleted.
        let mut changed_keys: FxHashSet<ResourceKey> = FxHashSet::default();
        let mut created_keys: FxHashSet<ResourceKey> = FxHashSet::default();
        let mut deleted_keys: FxHashSet<ResourceKey> = FxHashSet::default();
        let mut subject_keys: Vec<(String, ResourceKey)> = Vec::new();
        for subject in changes.keys() {
            let alias = self.resolver.uri_to_alias(subject)?;
            let key = ResourceKey::new(alias, context);
            changed_keys.insert(key.clone());
            if created_subjects.contains(subject) {
                created_keys.insert(key.clone());
            }
            if deleted_subjects.contains(subject) {
                deleted_keys.insert(key.clone());
            }
            subject_keys.push((subject.clone(), key));
        }

        // Candidates deduplicated by (resource, context, artifact kind).
        let mut candidates: BTreeMap<(ResourceKey, ArtifactKind), Candidate> = BTreeMap::new();
        let mut merge = |key: ResourceKey,
                         kind: ArtifactKind,
                         spec_types: Vec<String>,
                         op: OperationType,
                         is_deleted: bool| {
            let entry = candidates
                .entry((key.clone(), kind))
                .or_insert_with(|| Candidate {
                    key,
                    kind,
                    spec_types: BTreeSet::new(),
                    operation_types: BTreeSet::new(),
                    is_deleted: false,
                });
            entry.spec_types.extend(spec_types);
            entry.operation_types.insert(op);
            entry.is_deleted |= is_deleted;
        };

        // Pass 1: direct impact. A changed subject whose current rdf:type
        // set intersects a composite's types of interest is a candidate for
        // regenerating that exact subject.
        let primary = self.config.primary_collection();
        for (subject, key) in &subject_keys {
            let types = match self.current_types(&primary, key).await {
                Ok(types) => types,
                Err(e) => {
                    warn!(subject = %subject, error = %e, "direct impact resolution failed");
                    report.failures += 1;
                    continue;
                }
            };
            let is_deleted = deleted_keys.contains(key);
            let op = if is_deleted {
                OperationType::Delete
            } else if created_keys.contains(key) {
                OperationType::Create
            } else {
                OperationType::Update
            };
            for composite in &self.composites {
                if composite
                    .types_of_interest()
                    .iter()
                    .any(|t| types.contains(t))
                {
                    merge(key.clone(), composite.kind(), Vec::new(), op, is_deleted);
                }
            }
        }

        // Pass 2: indirect impact. Stored artifacts that joined in data from
        // a changed subject must be rebuilt even though their own type is
        // unrelated to the change.
        for composite in &self.composites {
            match composite.find_indirectly_impacted(changes, context).await {
                Ok(keys) => {
                    for key in keys {
                        let is_deleted = deleted_keys.contains(&key);
                        // An artifact hit that happens to be a changed
                        // subject keeps that subject's operation; unrelated
                        // artifact subjects rebuild as updates.
                        let op = if is_deleted {
                            OperationType::Delete
                        } else if created_keys.contains(&key) {
                            OperationType::Create
                        } else {
                            OperationType::Update
                        };
                        merge(key, composite.kind(), Vec::new(), op, is_deleted);
                    }
                }
                Err(e) => {
                    warn!(kind = ?composite.kind(), error = %e, "indirect impact resolution failed");
                    report.failures += 1;
                }
            }
        }

        debug!(
            candidate_count = candidates.len(),
            "impact candidates resolved"
        );

        // Route each candidate per the configured mode for its kind.
        for candidate in candidates.into_values() {
            match self.config.dispatch.mode(candidate.kind) {
                DispatchMode::Sync => self.run_sync(&candidate, &mut report).await,
                DispatchMode::Async => self.enqueue_async(&candidate, &mut report).await,
            }
        }

        info!(
            sync = report.sync_regenerated,
            queued = report.async_enqueued,
            failures = report.failures,
            "impact dispatch complete"
        );
        Ok(report)
    }

    /// Current rdf:type URI set of a subject's stored document
    async fn current_types(&self, primary: &str, key: &ResourceKey) -> Result<FxHashSet<String>> {
        let type_alias = self.resolver.uri_to_alias(vocab::rdf::TYPE)?;
        let mut types = FxHashSet::default();
        if let Some(doc) = self.store.get(primary, &key.doc_id()).await? {
            let cbd = Cbd::from_doc(doc)?;
            if let Some(values) = cbd.triples.get(&type_alias) {
                for v in values {
                    if v.is_uri() {
                        types.insert(v.value.clone());
                    }
                }
            }
        }
        Ok(types)
    }

    async fn run_sync(&self, candidate: &Candidate, report: &mut DispatchReport) {
        let Some(composite) = self.composite_for(candidate.kind) else {
            return;
        };
        let spec_types: Vec<String> = candidate.spec_types.iter().cloned().collect();
        match composite
            .regenerate(&candidate.key, &spec_types, candidate.is_deleted)
            .await
        {
            Ok(()) => report.sync_regenerated += 1,
            Err(e) => {
                warn!(
                    resource = %candidate.key,
                    kind = ?candidate.kind,
                    error = %e,
                    "synchronous regeneration failed; derived artifact left stale"
                );
                report.failures += 1;
            }
        }
    }

    async fn enqueue_async(&self, candidate: &Candidate, report: &mut DispatchReport) {
        let message = ImpactedSubject {
            resource_id: candidate.key.resource.clone(),
            context_id: candidate.key.context.clone(),
            pod_name: self.config.pod.clone(),
            operation_types: candidate.operation_types.clone(),
            spec_types: candidate.spec_types.iter().cloned().collect(),
            is_deleted: candidate.is_deleted,
        };
        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(resource = %candidate.key, error = %e, "impacted-subject serialization failed");
                report.failures += 1;
                return;
            }
        };
        match self
            .queue
            .enqueue(payload, &self.config.dispatch.queue_name)
            .await
        {
            Ok(token) => {
                debug!(resource = %candidate.key, token = %token, "impacted subject enqueued");
                report.async_enqueued += 1;
            }
            Err(e) => {
                warn!(resource = %candidate.key, error = %e, "enqueue failed; derived artifact left stale");
                report.failures += 1;
            }
        }
    }

    fn composite_for(&self, kind: ArtifactKind) -> Option<&Arc<dyn Composite>> {
        self.composites.iter().find(|c| c.kind() == kind)
    }
}
