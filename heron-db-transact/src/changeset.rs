//! ChangeSet computation
//!
//! Diffs two graph indexes into additions and removals, reifies every
//! added/removed triple as a statement resource, and groups statements into
//! per-subject change records carrying provenance. The reification is what
//! lets the transaction log record "what changed" independently of "what
//! the whole document looked like".
//!
//! ## Determinism
//!
//! Re-running the diff on identical inputs yields a byte-identical
//! ChangeSet: membership is decided by structural value equality, iteration
//! follows `BTreeMap` key order, and statement ids are derived from a
//! sha256 over the triple itself. The transaction log relies on this for
//! replay idempotence.

use chrono::{DateTime, Utc};
use heron_db_core::graph::PredicateMap;
use heron_db_core::{vocab, GraphIndex, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Free-text provenance attached to every change record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMeta {
    /// Who submitted the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Why the change was made
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the change was submitted
    pub timestamp: DateTime<Utc>,
}

impl ChangeMeta {
    /// Provenance stamped with the current time
    pub fn now() -> Self {
        Self {
            author: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder method to set the author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Builder method to set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A triple reified as its own resource
///
/// The id is a sha256 digest of the triple's structural content, so the
/// same triple always reifies to the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReifiedStatement {
    /// Statement resource id
    pub id: String,
    /// Subject URI of the reified triple
    pub subject: String,
    /// Predicate URI of the reified triple
    pub predicate: String,
    /// Object of the reified triple
    pub object: Value,
}

impl ReifiedStatement {
    /// Reify one triple
    pub fn new(subject: &str, predicate: &str, object: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(subject.as_bytes());
        hasher.update([0]);
        hasher.update(predicate.as_bytes());
        hasher.update([0]);
        hasher.update(format!("{:?}", object.kind).as_bytes());
        hasher.update([0]);
        hasher.update(object.value.as_bytes());
        hasher.update([0]);
        hasher.update(object.lang.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(object.datatype.as_deref().unwrap_or("").as_bytes());
        let hex = format!("{:x}", hasher.finalize());
        Self {
            id: format!("{}{}", vocab::sys::STATEMENT_PREFIX, &hex[..32]),
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.clone(),
        }
    }

    /// Express this statement in the RDF reification vocabulary
    pub fn to_graph(&self) -> GraphIndex {
        let mut g = GraphIndex::new();
        g.add(self.id.clone(), vocab::rdf::TYPE, Value::uri(vocab::rdf::STATEMENT));
        g.add(self.id.clone(), vocab::rdf::SUBJECT, Value::uri(&self.subject));
        g.add(self.id.clone(), vocab::rdf::PREDICATE, Value::uri(&self.predicate));
        g.add(self.id.clone(), vocab::rdf::OBJECT, self.object.clone());
        g
    }
}

/// All additions and removals for one subject, with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Subject URI the record covers
    pub subject: String,
    /// Reified added triples, in deterministic order
    pub additions: Vec<ReifiedStatement>,
    /// Reified removed triples, in deterministic order
    pub removals: Vec<ReifiedStatement>,
    /// Provenance
    pub meta: ChangeMeta,
}

impl ChangeRecord {
    /// Predicates named by this record's statements, sorted and unique
    pub fn predicates(&self) -> Vec<String> {
        let mut preds: BTreeSet<&str> = BTreeSet::new();
        for stmt in self.additions.iter().chain(self.removals.iter()) {
            preds.insert(&stmt.predicate);
        }
        preds.into_iter().map(String::from).collect()
    }

    /// True when every triple the subject held is being removed
    pub fn removes_everything(&self) -> bool {
        !self.removals.is_empty() && self.additions.is_empty()
    }
}

/// Computed difference between a "before" and "after" graph
///
/// Immutable after construction; created once per save call and discarded
/// when the transaction completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Caller's "before" snapshot, metadata-stripped
    pub before: GraphIndex,
    /// Caller's "after" snapshot, metadata-stripped
    pub after: GraphIndex,
    /// Triples present in `after` and absent from `before`
    pub additions: GraphIndex,
    /// Triples present in `before` and absent from `after`
    pub removals: GraphIndex,
    /// One record per differing subject, in subject order
    pub records: Vec<ChangeRecord>,
}

impl ChangeSet {
    /// True iff at least one record carries an addition or removal
    pub fn has_changes(&self) -> bool {
        self.records
            .iter()
            .any(|r| !r.additions.is_empty() || !r.removals.is_empty())
    }

    /// Subject URIs of every change record, in order
    pub fn subjects(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.subject.as_str()).collect()
    }

    /// Canonical "subjects and predicates of change"
    ///
    /// Derived directly from the change records while they are in hand; the
    /// predicate lists are sorted and deduplicated.
    pub fn subjects_and_predicates(&self) -> FxHashMap<String, Vec<String>> {
        self.records
            .iter()
            .map(|r| (r.subject.clone(), r.predicates()))
            .collect()
    }

    /// Total added triples
    pub fn addition_count(&self) -> usize {
        self.additions.triple_count()
    }

    /// Total removed triples
    pub fn removal_count(&self) -> usize {
        self.removals.triple_count()
    }

    /// Serialized change records for the transaction log
    pub fn records_payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.records)
    }
}

/// Triples of `a` absent from `b`, per subject
fn subject_difference(a: &PredicateMap, b: Option<&PredicateMap>) -> PredicateMap {
    let mut out = PredicateMap::new();
    for (pred, values) in a {
        let other = b.and_then(|m| m.get(pred));
        let missing: Vec<Value> = values
            .iter()
            .filter(|v| other.map(|vs| !vs.contains(v)).unwrap_or(true))
            .cloned()
            .collect();
        if !missing.is_empty() {
            out.insert(pred.clone(), missing);
        }
    }
    out
}

/// Compute the set difference `a ∖ b` over whole graphs
fn graph_difference(a: &GraphIndex, b: &GraphIndex) -> GraphIndex {
    let mut out = GraphIndex::new();
    for (subject, preds) in a.iter() {
        let diff = subject_difference(preds, b.predicates(subject));
        out.insert_subject(subject.clone(), diff);
    }
    out
}

/// Strip transport-internal metadata triples before diffing
fn strip_metadata(graph: &GraphIndex) -> GraphIndex {
    let mut out = graph.clone();
    let internal: Vec<String> = out
        .iter()
        .flat_map(|(_, preds)| preds.keys())
        .filter(|p| p.starts_with(vocab::sys::NS))
        .cloned()
        .collect();
    for pred in internal {
        out.strip_predicate(&pred);
    }
    out
}

/// Compute the ChangeSet between two graph indexes
///
/// An empty `before` makes all of `after` additions (pure create); an empty
/// `after` makes all of `before` removals (pure delete). Subjects identical
/// in both graphs produce no record.
pub fn compute_change_set(before: &GraphIndex, after: &GraphIndex, meta: ChangeMeta) -> ChangeSet {
    let before = strip_metadata(before);
    let after = strip_metadata(after);

    let additions = graph_difference(&after, &before);
    let removals = graph_difference(&before, &after);

    // One record per subject appearing in either difference; BTreeMap union
    // keeps subject order deterministic.
    let subjects: BTreeSet<String> = additions
        .subjects()
        .chain(removals.subjects())
        .cloned()
        .collect();

    let mut records = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let reify = |graph: &GraphIndex| -> Vec<ReifiedStatement> {
            graph
                .predicates(&subject)
                .map(|preds| {
                    preds
                        .iter()
                        .flat_map(|(p, values)| {
                            values.iter().map(|v| ReifiedStatement::new(&subject, p, v))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        records.push(ChangeRecord {
            additions: reify(&additions),
            removals: reify(&removals),
            subject,
            meta: meta.clone(),
        });
    }

    ChangeSet {
        before,
        after,
        additions,
        removals,
        records,
    }
}
