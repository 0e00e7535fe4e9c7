//! Core types for the heron-db triple-store write engine
//!
//! This crate holds the leaf data model shared by every higher component:
//!
//! - [`Value`] / [`ValueKind`]: RDF object values
//! - [`GraphIndex`]: in-memory subject → predicate → values triple index
//! - [`ResourceKey`] / [`Cbd`]: persisted document identity and body
//! - [`AliasResolver`] / [`NamespaceTable`]: URI ↔ curie normalization
//! - [`StoreConfig`]: explicit, process-lifetime configuration
//! - `vocab`: RDF and engine-internal IRI constants

pub mod aliasing;
pub mod cbd;
pub mod config;
pub mod error;
pub mod graph;
pub mod key;
pub mod value;
pub mod vocab;

pub use aliasing::{AliasResolver, NamespaceTable};
pub use cbd::{alias_predicates, Cbd};
pub use config::{ArtifactKind, DispatchConfig, DispatchMode, LockConfig, StoreConfig};
pub use error::{Error, Result};
pub use graph::{GraphIndex, PredicateMap};
pub use key::ResourceKey;
pub use value::{Value, ValueKind};
