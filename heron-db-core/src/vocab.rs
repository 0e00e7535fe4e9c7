//! RDF vocabulary and engine-internal IRI constants
//!
//! Constants are organized by vocabulary:
//! - `rdf` - RDF vocabulary, including the reification terms used to record
//!   added/removed triples as statement resources
//! - `xsd` - the XSD datatypes the engine itself emits
//! - `sys` - engine-internal predicates and id prefixes; `sys` triples are
//!   transport metadata and are stripped before diffing

/// RDF vocabulary constants
pub mod rdf {
    /// rdf:type IRI
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

    /// rdf:Statement IRI (reified triple class)
    pub const STATEMENT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Statement";

    /// rdf:subject IRI
    pub const SUBJECT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#subject";

    /// rdf:predicate IRI
    pub const PREDICATE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#predicate";

    /// rdf:object IRI
    pub const OBJECT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#object";
}

/// XSD vocabulary constants
pub mod xsd {
    /// xsd:string IRI
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

    /// xsd:dateTime IRI
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
}

/// Engine-internal vocabulary
pub mod sys {
    /// Namespace for engine-internal terms
    pub const NS: &str = "urn:heron:sys#";

    /// Cache etag predicate attached by transport layers; never diffed
    pub const CACHE_ETAG: &str = "urn:heron:sys#cacheEtag";

    /// Prefix for deterministic reified-statement resource ids
    pub const STATEMENT_PREFIX: &str = "urn:heron:statement:";
}
