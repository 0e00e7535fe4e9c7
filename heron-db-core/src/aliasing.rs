//! URI ↔ alias normalization
//!
//! Persisted documents key predicates and resources by a storage-safe curie
//! alias rather than the full URI. The mapping must be total and injective:
//! a URI under a registered namespace renders as `prefix:local`; anything
//! else passes through unchanged. Registered prefixes never contain `://`,
//! so the two forms cannot collide.

use crate::error::{Error, Result};
use crate::vocab;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// URI ↔ alias resolution seam
///
/// The write pipeline treats this as total: every URI has exactly one alias
/// and every alias maps back to exactly one URI.
pub trait AliasResolver: Debug + Send + Sync {
    /// Render the storage alias for a URI
    fn uri_to_alias(&self, uri: &str) -> Result<String>;

    /// Expand a storage alias back to its URI
    fn alias_to_uri(&self, alias: &str) -> Result<String>;
}

/// Prefix-table alias resolver
///
/// Seeded with the rdf/rdfs/xsd namespaces plus the engine-internal `sys`
/// namespace; callers register their own via `with_namespace`. Longest
/// namespace match wins so nested namespaces resolve correctly.
#[derive(Debug, Clone)]
pub struct NamespaceTable {
    /// prefix → namespace URI
    by_prefix: BTreeMap<String, String>,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        let mut table = Self {
            by_prefix: BTreeMap::new(),
        };
        table.register("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        table.register("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
        table.register("xsd", "http://www.w3.org/2001/XMLSchema#");
        table.register("sys", vocab::sys::NS);
        table
    }
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register an additional namespace
    pub fn with_namespace(mut self, prefix: impl Into<String>, ns: impl Into<String>) -> Self {
        self.register(prefix, ns);
        self
    }

    fn register(&mut self, prefix: impl Into<String>, ns: impl Into<String>) {
        self.by_prefix.insert(prefix.into(), ns.into());
    }

    /// Longest registered namespace that prefixes `uri`
    fn best_match(&self, uri: &str) -> Option<(&str, &str)> {
        self.by_prefix
            .iter()
            .filter(|(_, ns)| uri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(p, ns)| (p.as_str(), ns.as_str()))
    }
}

impl AliasResolver for NamespaceTable {
    fn uri_to_alias(&self, uri: &str) -> Result<String> {
        if uri.is_empty() {
            return Err(Error::invalid_alias("empty URI"));
        }
        match self.best_match(uri) {
            Some((prefix, ns)) => {
                let local = &uri[ns.len()..];
                // A local part containing ':' would make expansion ambiguous;
                // fall back to the pass-through form.
                if local.is_empty() || local.contains(':') {
                    Ok(uri.to_string())
                } else {
                    Ok(format!("{}:{}", prefix, local))
                }
            }
            None => Ok(uri.to_string()),
        }
    }

    fn alias_to_uri(&self, alias: &str) -> Result<String> {
        if alias.is_empty() {
            return Err(Error::invalid_alias("empty alias"));
        }
        if let Some((prefix, local)) = alias.split_once(':') {
            if let Some(ns) = self.by_prefix.get(prefix) {
                if !local.contains(':') {
                    return Ok(format!("{}{}", ns, local));
                }
            }
        }
        Ok(alias.to_string())
    }
}
