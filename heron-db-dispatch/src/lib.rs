//! Impact propagation for heron-db
//!
//! After the write pipeline commits a transaction, this crate decides which
//! derived artifacts (materialized views, denormalized tables, search
//! documents) must be regenerated and routes each candidate either inline
//! or onto a job queue.
//!
//! Main pieces:
//!
//! - [`Composite`]: collaborator seam for one artifact kind (types of
//!   interest, impact-index reverse lookup, regeneration)
//! - [`JobQueue`] / [`MemoryJobQueue`]: async transport seam
//! - [`Dispatcher`]: direct + indirect resolution, dedupe, sync/async
//!   routing with isolated failure handling
//! - [`impact`]: shared `_impactIndex` reverse scan for store-backed
//!   composites

pub mod composite;
pub mod dispatcher;
pub mod error;
pub mod impact;
pub mod queue;

pub use composite::{Composite, ImpactedSubject, OperationType, ResourcesAndPredicates};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{DispatchError, Result};
pub use impact::{artifact_doc_id, find_impacted, ArtifactDoc, ImpactedArtifact};
pub use queue::{JobQueue, MemoryJobQueue, QueuedJob};
