//! Changesets — atomic, named groupings of related mutations.
//!
//! A changeset is a *logical* unit of atomicity: its member mutations are
//! durably written one statement at a time, and the changeset row records
//! whether the group as a whole was committed or rolled back. A changeset in
//! a terminal state accepts no further members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::version::{PartitionId, VersionId};

/// Identity of a changeset.
pub type ChangeSetId = Uuid;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of a changeset.
///
/// `Pending` is the only state that accepts member appends. `Committed` and
/// `RolledBack` are terminal transitions; `Archived` is an optional
/// post-terminal bookkeeping state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSetStatus {
  Pending,
  Committed,
  RolledBack,
  Archived,
}

impl ChangeSetStatus {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }
}

// ─── ChangeSet ───────────────────────────────────────────────────────────────

/// An atomic, named grouping of version records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
  pub changeset_id:      ChangeSetId,
  pub description:       String,
  pub created_at:        DateTime<Utc>,
  /// The partitions this changeset touches.
  pub partition_scope:   Vec<PartitionId>,
  pub status:            ChangeSetStatus,
  /// When false, rollback is refused even for a committed changeset.
  pub rollback_eligible: bool,
  /// Member version ids in append order. Append-only while `Pending`;
  /// frozen once the changeset reaches a terminal state.
  pub members:           Vec<VersionId>,
}

impl ChangeSet {
  /// A freshly created, empty, pending changeset.
  pub fn new(
    description: impl Into<String>,
    partition_scope: Vec<PartitionId>,
  ) -> Self {
    Self {
      changeset_id:      Uuid::new_v4(),
      description:       description.into(),
      created_at:        Utc::now(),
      partition_scope,
      status:            ChangeSetStatus::Pending,
      rollback_eligible: true,
      members:           Vec::new(),
    }
  }
}
