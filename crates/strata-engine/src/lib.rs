//! The Strata change-tracking engine.
//!
//! Five components over any [`strata_core::store::VersionStore`] backend:
//!
//! - [`ChangeTracker`] — validates mutations, computes field-level diffs and
//!   content fingerprints, and appends version records.
//! - [`ChangeSetManager`] — groups tracked changes under named changesets and
//!   drives their state transitions.
//! - [`RollbackEngine`] — undoes a committed changeset by applying the
//!   structural inverse of each member, newest first.
//! - [`HistoryReader`] — reconstructs per-record and per-partition history.
//! - [`RetentionManager`] — purges old versions while keeping every record's
//!   most recent version.

pub mod changeset;
pub mod error;
pub mod history;
pub mod retention;
pub mod rollback;
pub mod tracker;

pub use changeset::ChangeSetManager;
pub use error::{Error, PartialRollbackError, Result};
pub use history::HistoryReader;
pub use retention::RetentionManager;
pub use rollback::{RollbackEngine, RollbackFailure, RollbackReport};
pub use tracker::ChangeTracker;
