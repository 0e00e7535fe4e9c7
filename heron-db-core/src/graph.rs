//! In-memory triple index
//!
//! `GraphIndex` maps subject → predicate → ordered value list and is the
//! shape in which "before" and "after" resource states are exchanged with
//! the write pipeline. It is constructed fresh per operation and never
//! persisted directly; the persisted form is the CBD document.
//!
//! Both maps are `BTreeMap` so iteration order is fully determined by the
//! keys. Diffing two graphs therefore produces identical output for
//! identical inputs, which the transaction log relies on for replay
//! idempotence.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Predicate → ordered value list for one subject
pub type PredicateMap = BTreeMap<String, Vec<Value>>;

/// Subject → predicate → ordered value list
///
/// Invariant: no duplicate `(predicate, Value)` pair under one subject.
/// `add` enforces this; values within a predicate keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphIndex {
    subjects: BTreeMap<String, PredicateMap>,
}

impl GraphIndex {
    /// Create an empty graph index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a triple, ignoring exact duplicates
    ///
    /// Returns `true` if the triple was newly added.
    pub fn add(
        &mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Value,
    ) -> bool {
        let values = self
            .subjects
            .entry(subject.into())
            .or_default()
            .entry(predicate.into())
            .or_default();
        if values.contains(&object) {
            return false;
        }
        values.push(object);
        true
    }

    /// Remove an exact triple
    ///
    /// Empty predicate lists and subjects are pruned so that "has no
    /// triples" and "absent" are the same observable state. Returns `true`
    /// if the triple was present.
    pub fn remove(&mut self, subject: &str, predicate: &str, object: &Value) -> bool {
        let Some(preds) = self.subjects.get_mut(subject) else {
            return false;
        };
        let Some(values) = preds.get_mut(predicate) else {
            return false;
        };
        let Some(pos) = values.iter().position(|v| v == object) else {
            return false;
        };
        values.remove(pos);
        if values.is_empty() {
            preds.remove(predicate);
        }
        if preds.is_empty() {
            self.subjects.remove(subject);
        }
        true
    }

    /// Check whether an exact triple is present
    pub fn contains(&self, subject: &str, predicate: &str, object: &Value) -> bool {
        self.subjects
            .get(subject)
            .and_then(|p| p.get(predicate))
            .map(|vs| vs.contains(object))
            .unwrap_or(false)
    }

    /// Values for a (subject, predicate) pair
    pub fn values(&self, subject: &str, predicate: &str) -> &[Value] {
        self.subjects
            .get(subject)
            .and_then(|p| p.get(predicate))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Predicate map for one subject, if present
    pub fn predicates(&self, subject: &str) -> Option<&PredicateMap> {
        self.subjects.get(subject)
    }

    /// Iterate subjects in key order
    pub fn subjects(&self) -> impl Iterator<Item = &String> {
        self.subjects.keys()
    }

    /// Iterate `(subject, predicates)` entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PredicateMap)> {
        self.subjects.iter()
    }

    /// Iterate every triple in deterministic order
    pub fn triples(&self) -> impl Iterator<Item = (&String, &String, &Value)> {
        self.subjects.iter().flat_map(|(s, preds)| {
            preds
                .iter()
                .flat_map(move |(p, values)| values.iter().map(move |v| (s, p, v)))
        })
    }

    /// Insert a whole predicate map for a subject, replacing any existing one
    pub fn insert_subject(&mut self, subject: impl Into<String>, predicates: PredicateMap) {
        let subject = subject.into();
        if predicates.is_empty() {
            self.subjects.remove(&subject);
        } else {
            self.subjects.insert(subject, predicates);
        }
    }

    /// Remove a subject and return its predicate map
    pub fn remove_subject(&mut self, subject: &str) -> Option<PredicateMap> {
        self.subjects.remove(subject)
    }

    /// Drop every triple with the given predicate, across all subjects
    ///
    /// Used to strip transport-internal metadata predicates before diffing.
    pub fn strip_predicate(&mut self, predicate: &str) {
        self.subjects.retain(|_, preds| {
            preds.remove(predicate);
            !preds.is_empty()
        });
    }

    /// Merge another graph into this one (binary union)
    ///
    /// Duplicate triples in `other` are ignored. "Merge many" is a fold of
    /// this binary operation.
    pub fn merge(&mut self, other: &GraphIndex) {
        for (s, p, v) in other.triples() {
            self.add(s.clone(), p.clone(), v.clone());
        }
    }

    /// Number of subjects
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    /// Number of triples
    pub fn triple_count(&self) -> usize {
        self.subjects
            .values()
            .flat_map(|p| p.values())
            .map(|vs| vs.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

impl FromIterator<(String, String, Value)> for GraphIndex {
    fn from_iter<T: IntoIterator<Item = (String, String, Value)>>(iter: T) -> Self {
        let mut g = GraphIndex::new();
        for (s, p, v) in iter {
            g.add(s, p, v);
        }
        g
    }
}
