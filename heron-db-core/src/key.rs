//! Resource keys
//!
//! A resource's persisted description is keyed by `(resource, context)` in
//! alias (curie) form. The rendered document id is `resource|context`; the
//! separator never appears in aliases, so rendering is injective.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between resource and context in a rendered document id.
pub const KEY_SEPARATOR: char = '|';

/// Alias-form identity of one CBD document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource alias (curie form of the subject URI)
    pub resource: String,
    /// Context alias (named-graph scope)
    pub context: String,
}

impl ResourceKey {
    pub fn new(resource: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            context: context.into(),
        }
    }

    /// Render the storage primary key
    pub fn doc_id(&self) -> String {
        format!("{}{}{}", self.resource, KEY_SEPARATOR, self.context)
    }

    /// Parse a rendered document id back into a key
    pub fn parse(doc_id: &str) -> Option<Self> {
        let (resource, context) = doc_id.split_once(KEY_SEPARATOR)?;
        if resource.is_empty() || context.is_empty() {
            return None;
        }
        Some(Self::new(resource, context))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.resource, KEY_SEPARATOR, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_roundtrip() {
        let key = ResourceKey::new("ex:a", "default");
        assert_eq!(key.doc_id(), "ex:a|default");
        assert_eq!(ResourceKey::parse("ex:a|default"), Some(key));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ResourceKey::parse("no-separator").is_none());
        assert!(ResourceKey::parse("|ctx").is_none());
        assert!(ResourceKey::parse("res|").is_none());
    }
}
