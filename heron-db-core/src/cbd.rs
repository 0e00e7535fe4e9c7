//! CBD documents
//!
//! A Concise Bounded Description is the persisted document holding one
//! resource's complete current triple set in one context. Predicates are
//! stored in alias (curie) form; the subject is implied by the key.
//!
//! ## Lifecycle states
//!
//! - **placeholder** — `version == None`, no triples. Created by the Lock
//!   Manager (insert-if-absent) for a resource with no existing document so
//!   create and update share one code path. Adopted by the first commit,
//!   which writes `version = Some(0)`.
//! - **live** — `version == Some(n)`, non-empty triples. Every successful
//!   write increments the version by exactly 1; the version is the
//!   optimistic-concurrency token.
//! - **tombstone** — `version == Some(n)`, empty triples. Deleting all of a
//!   resource's triples keeps the document for version and impact-index
//!   bookkeeping; deletions are represented, not erased.

use crate::aliasing::AliasResolver;
use crate::error::Result;
use crate::graph::{GraphIndex, PredicateMap};
use crate::key::ResourceKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted Concise Bounded Description of one resource in one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cbd {
    /// Document key: (resource alias, context alias)
    #[serde(rename = "_key")]
    pub key: ResourceKey,

    /// Optimistic-concurrency token; `None` marks an uncommitted placeholder
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    /// Creation timestamp (placeholder insertion or first write)
    #[serde(rename = "_createdAt")]
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last committed write
    #[serde(rename = "_updatedAt")]
    pub updated_at: DateTime<Utc>,

    /// Current triples, keyed by alias-form predicate
    pub triples: PredicateMap,

    /// Keys of other documents whose derived artifacts depend on this one
    #[serde(rename = "_impactIndex", default)]
    pub impact_index: Vec<ResourceKey>,
}

impl Cbd {
    /// Create an uncommitted placeholder for a previously-unknown resource
    pub fn placeholder(key: ResourceKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            version: None,
            created_at: now,
            updated_at: now,
            triples: PredicateMap::new(),
            impact_index: Vec::new(),
        }
    }

    /// True for a document that has never been committed
    pub fn is_placeholder(&self) -> bool {
        self.version.is_none()
    }

    /// True for a committed document whose triples were all removed
    pub fn is_tombstone(&self) -> bool {
        self.version.is_some() && self.triples.is_empty()
    }

    /// Version the next successful write must carry
    ///
    /// 0 for a placeholder, `n + 1` otherwise.
    pub fn next_version(&self) -> u64 {
        match self.version {
            None => 0,
            Some(n) => n + 1,
        }
    }

    /// Check whether an exact (predicate alias, value) pair is present
    pub fn contains(&self, predicate_alias: &str, object: &crate::value::Value) -> bool {
        self.triples
            .get(predicate_alias)
            .map(|vs| vs.contains(object))
            .unwrap_or(false)
    }

    /// Expand this document into a one-subject graph index
    ///
    /// The subject and predicates are expanded from alias back to URI form.
    pub fn to_graph(&self, resolver: &dyn AliasResolver) -> Result<GraphIndex> {
        let subject = resolver.alias_to_uri(&self.key.resource)?;
        let mut graph = GraphIndex::new();
        for (pred_alias, values) in &self.triples {
            let pred = resolver.alias_to_uri(pred_alias)?;
            for v in values {
                graph.add(subject.clone(), pred.clone(), v.clone());
            }
        }
        Ok(graph)
    }

    /// Serialize to the stored document form
    pub fn to_doc(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from the stored document form
    pub fn from_doc(doc: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(doc)?)
    }
}

/// Normalize a subject's URI-keyed predicate map into alias form
pub fn alias_predicates(
    predicates: &PredicateMap,
    resolver: &dyn AliasResolver,
) -> Result<PredicateMap> {
    let mut out = PredicateMap::new();
    for (pred, values) in predicates {
        out.insert(resolver.uri_to_alias(pred)?, values.clone());
    }
    Ok(out)
}
