//! Transactional update pipeline for heron-db
//!
//! Callers submit "before" and "after" snapshots of a resource graph; this
//! crate computes the minimal diff, locks every subject of change, records
//! the attempt in a write-ahead transaction log, applies the diff as atomic
//! per-document conditional updates, and hands the committed change to the
//! impact propagation dispatcher. Any failure after locks are held rolls
//! the transaction back to its pre-transaction snapshots.
//!
//! Entry point: [`WriteEngine::save_changes`].

pub mod apply;
pub mod changeset;
pub mod error;
pub mod lock;
pub mod save;
pub mod txlog;

pub use apply::{ApplyOutcome, UpdateApplier};
pub use changeset::{compute_change_set, ChangeMeta, ChangeRecord, ChangeSet, ReifiedStatement};
pub use error::{Result, TransactError};
pub use lock::{LockManager, LockRecord};
pub use save::{SaveReceipt, TxnId, WriteEngine};
pub use txlog::{TransactionLog, TxnRecord, TxnStatus};
