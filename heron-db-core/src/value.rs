//! RDF object values
//!
//! The object position of a triple can hold a URI reference, a blank-node
//! identifier, or a literal with an optional language tag or datatype IRI.
//!
//! ## Equality and ordering
//!
//! `Value` implements structural equality over all four fields; two literals
//! with the same lexical form but different datatypes are distinct values.
//! The `Ord` impl orders by kind discriminant first (Uri < Bnode < Literal),
//! then lexicographically by value, language, and datatype. This total order
//! is what keeps value lists and diff output deterministic regardless of
//! insertion order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Kind of an RDF object value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// URI reference to another resource
    Uri,
    /// Blank node identifier (scoped to the submitting graph)
    Bnode,
    /// Literal with optional language tag or datatype
    Literal,
}

/// Atomic object value of a triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    /// Value kind (uri, bnode, literal)
    pub kind: ValueKind,
    /// Lexical form: the IRI, bnode label, or literal text
    pub value: String,
    /// Language tag (literals only, e.g. "en")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Datatype IRI (literals only, e.g. xsd:integer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl Value {
    /// Create a URI reference value
    pub fn uri(iri: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Uri,
            value: iri.into(),
            lang: None,
            datatype: None,
        }
    }

    /// Create a blank-node value
    pub fn bnode(label: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Bnode,
            value: label.into(),
            lang: None,
            datatype: None,
        }
    }

    /// Create a plain literal value
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Literal,
            value: text.into(),
            lang: None,
            datatype: None,
        }
    }

    /// Create a language-tagged literal
    pub fn literal_lang(text: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Literal,
            value: text.into(),
            lang: Some(lang.into()),
            datatype: None,
        }
    }

    /// Create a typed literal
    pub fn literal_typed(text: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Literal,
            value: text.into(),
            lang: None,
            datatype: Some(datatype.into()),
        }
    }

    /// Check if this is a URI reference
    pub fn is_uri(&self) -> bool {
        self.kind == ValueKind::Uri
    }

    /// Check if this is a blank node
    pub fn is_bnode(&self) -> bool {
        self.kind == ValueKind::Bnode
    }

    /// Check if this is a literal of any form
    pub fn is_literal(&self) -> bool {
        self.kind == ValueKind::Literal
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.lang.cmp(&other.lang))
            .then_with(|| self.datatype.cmp(&other.datatype))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValueKind::Uri => write!(f, "<{}>", self.value),
            ValueKind::Bnode => write!(f, "_:{}", self.value),
            ValueKind::Literal => {
                write!(f, "\"{}\"", self.value)?;
                if let Some(lang) = &self.lang {
                    write!(f, "@{}", lang)?;
                } else if let Some(dt) = &self.datatype {
                    write!(f, "^^<{}>", dt)?;
                }
                Ok(())
            }
        }
    }
}
