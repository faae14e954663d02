//! Error taxonomy for the Strata subsystem.
//!
//! Configuration and precondition failures indicate caller bugs that would
//! otherwise silently corrupt history; they always surface synchronously and
//! are never swallowed. State and not-found failures surface synchronously as
//! well. Partial rollback is *not* an error here — it is an expected degraded
//! outcome reported as a structured result by the rollback engine.

use thiserror::Error;

use crate::{
  changeset::{ChangeSetId, ChangeSetStatus},
  version::{ChangeKind, RecordId, VersionId},
};

/// The versioned-table configuration does not cover the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
  #[error("table {0:?} is not registered for versioning")]
  UnknownTable(String),

  #[error("table {0:?} has no primary-key field configured")]
  MissingPrimaryKey(String),
}

/// The tracked mutation is malformed in a way that would corrupt history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
  #[error("{kind:?} on {table}:{record_id} requires old_values")]
  MissingOldValues {
    table:     String,
    record_id: RecordId,
    kind:      ChangeKind,
  },

  #[error("{kind:?} on {table}:{record_id} requires new_values")]
  MissingNewValues {
    table:     String,
    record_id: RecordId,
    kind:      ChangeKind,
  },

  #[error("update on {table}:{record_id} changes no tracked fields")]
  EmptyUpdate { table: String, record_id: RecordId },
}

/// The operation is invalid for the changeset's current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
  #[error("changeset {changeset} is {status:?}; expected {expected:?}")]
  InvalidStatus {
    changeset: ChangeSetId,
    status:    ChangeSetStatus,
    expected:  Vec<ChangeSetStatus>,
  },

  #[error("changeset {0} is not eligible for rollback")]
  RollbackNotEligible(ChangeSetId),
}

/// The referenced changeset or version record does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
  #[error("changeset not found: {0}")]
  Changeset(ChangeSetId),

  #[error("version not found: {0}")]
  Version(VersionId),
}
