//! Engine configuration
//!
//! One `StoreConfig` is constructed at process startup and passed by
//! reference to every component that needs it. There are no ambient
//! globals; collection naming, lock tuning, cardinality constraints, and
//! dispatch routing all live here.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of derived artifact a composite maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Materialized view documents
    View,
    /// Denormalized table rows
    Table,
    /// Search documents
    Search,
}

impl ArtifactKind {
    /// All artifact kinds, in routing order
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::View, ArtifactKind::Table, ArtifactKind::Search];

    /// Collection-name suffix for this kind
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::View => "views",
            ArtifactKind::Table => "tables",
            ArtifactKind::Search => "search",
        }
    }
}

/// How regeneration of an artifact kind is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Regenerate inline, within the caller's request
    Sync,
    /// Serialize an impacted-subject message onto the job queue
    Async,
}

/// Lock-acquisition tuning
///
/// Contention is expected under concurrency; retries use a linearly growing
/// delay with ±25% jitter, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Retry attempts before `lock_all` gives up
    /// Default: 20
    pub max_retries: u32,
    /// Base delay between attempts
    /// Default: 25ms
    pub base_delay: Duration,
    /// Upper bound on any single delay
    /// Default: 500ms
    pub max_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_retries: 20,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
        }
    }
}

/// Dispatch routing configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Regeneration mode for views
    /// Default: sync (read-after-write expectations are higher for views)
    pub view_mode: DispatchMode,
    /// Regeneration mode for tables
    /// Default: async
    pub table_mode: DispatchMode,
    /// Regeneration mode for search documents
    /// Default: async
    pub search_mode: DispatchMode,
    /// Queue name for async impacted-subject messages
    pub queue_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            view_mode: DispatchMode::Sync,
            table_mode: DispatchMode::Async,
            search_mode: DispatchMode::Async,
            queue_name: "impacted-subjects".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Mode for an artifact kind
    pub fn mode(&self, kind: ArtifactKind) -> DispatchMode {
        match kind {
            ArtifactKind::View => self.view_mode,
            ArtifactKind::Table => self.table_mode,
            ArtifactKind::Search => self.search_mode,
        }
    }
}

/// Top-level engine configuration for one (store, pod)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store name: top-level namespace grouping pods
    pub store: String,
    /// Pod name: partition of the primary resource collection
    pub pod: String,
    /// Predicate URIs constrained to at most one value per subject
    pub single_valued_predicates: FxHashSet<String>,
    /// Lock-acquisition tuning
    pub lock: LockConfig,
    /// Dispatch routing
    pub dispatch: DispatchConfig,
}

impl StoreConfig {
    pub fn new(store: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            pod: pod.into(),
            single_valued_predicates: FxHashSet::default(),
            lock: LockConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Builder method to constrain a predicate to a single value per subject
    pub fn with_single_valued(mut self, predicate: impl Into<String>) -> Self {
        self.single_valued_predicates.insert(predicate.into());
        self
    }

    /// Builder method to override lock tuning
    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Builder method to override dispatch routing
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Primary resource collection: one document per (resource, context)
    pub fn primary_collection(&self) -> String {
        format!("{}__{}", self.store, self.pod)
    }

    /// Advisory lock collection
    pub fn lock_collection(&self) -> String {
        format!("{}__{}_locks", self.store, self.pod)
    }

    /// Transaction log collection, shared across the store's pods
    pub fn txlog_collection(&self) -> String {
        format!("{}__transactions", self.store)
    }

    /// Derived-artifact collection for one artifact kind
    pub fn artifact_collection(&self, kind: ArtifactKind) -> String {
        format!("{}__{}_{}", self.store, self.pod, kind.suffix())
    }
}
