//! Composite collaborator seam
//!
//! A composite maintains one kind of derived artifact (views, tables, or
//! search documents). The dispatcher holds a closed, explicit list of
//! composites and invokes them with immutable [`ImpactedSubject`] values;
//! there is no runtime observer registration.

use crate::error::Result;
use async_trait::async_trait;
use heron_db_core::{ArtifactKind, ResourceKey};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Kind of change a subject underwent in the committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// First write of a previously-unknown resource
    Create,
    /// Triple additions/removals on an existing resource
    Update,
    /// All triples removed; resource is now a tombstone
    Delete,
}

/// Transient dispatch message consumed by composite regenerators
///
/// Produced once per deduplicated `(resource, context, artifact kind)`
/// candidate; serialized onto the job queue for async candidates and passed
/// by reference for sync ones. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactedSubject {
    /// Resource alias of the subject to regenerate
    pub resource_id: String,
    /// Context alias
    pub context_id: String,
    /// Pod the artifact belongs to
    pub pod_name: String,
    /// Operations that produced this candidate
    pub operation_types: BTreeSet<OperationType>,
    /// Artifact specification types to regenerate (empty = all for the kind)
    pub spec_types: Vec<String>,
    /// True when the source subject was deleted; regenerators remove rather
    /// than rebuild
    pub is_deleted: bool,
}

impl ImpactedSubject {
    /// Key of the subject to regenerate
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_id.clone(), self.context_id.clone())
    }
}

/// Changed subjects mapped to the predicates that changed on them
///
/// Subject and predicate identifiers are full URIs; alias normalization
/// happens at the storage boundary.
pub type ResourcesAndPredicates = FxHashMap<String, Vec<String>>;

/// A derived-artifact subsystem consuming impacted-subject notifications
///
/// Regeneration must be idempotent: recomputing the same artifact from the
/// same source state yields the same result, so composites do not take the
/// primary lock.
#[async_trait]
pub trait Composite: Debug + Send + Sync {
    /// Which artifact kind this composite maintains
    fn kind(&self) -> ArtifactKind;

    /// rdf:type URIs whose subjects this composite regenerates directly
    fn types_of_interest(&self) -> &[String];

    /// Reverse lookup: stored artifacts whose impact index lists one of the
    /// changed subjects
    ///
    /// Returns the keys of artifacts built by joining in data from a changed
    /// subject; these must be rebuilt even though their own type is
    /// unrelated to the change.
    async fn find_indirectly_impacted(
        &self,
        resources_and_predicates: &ResourcesAndPredicates,
        context: &str,
    ) -> Result<Vec<ResourceKey>>;

    /// Regenerate (or, when `is_deleted`, remove) the artifacts for one
    /// subject
    async fn regenerate(
        &self,
        resource: &ResourceKey,
        spec_types: &[String],
        is_deleted: bool,
    ) -> Result<()>;
}
