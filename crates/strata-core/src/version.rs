//! Version records — the fundamental unit of the Strata audit trail.
//!
//! A version record captures one mutation to one row of a versioned table.
//! Records are never updated after creation, with a single exception: the
//! `is_active` flag is cleared when a newer version of the same record is
//! appended. Records are destroyed only by the retention sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changeset::ChangeSetId;

/// Store-assigned identity of a version record; monotonically increasing.
pub type VersionId = i64;

/// Primary-key value of the row a version record describes.
pub type RecordId = i64;

/// A logical partition (e.g. a subject-area scope) used to filter and report
/// on changes across tables.
pub type PartitionId = i64;

/// A field-name → value mapping, as captured at mutation time.
///
/// `serde_json::Map` keeps its keys sorted, which makes serialised field maps
/// canonical — the content fingerprint relies on this.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

// ─── ChangeKind ──────────────────────────────────────────────────────────────

/// The kind of mutation a version record describes.
///
/// Closed set: the rollback dispatcher matches exhaustively on this enum, so
/// adding a variant without defining its inverse is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
  BulkInsert,
  BulkUpdate,
  SchemaChange,
}

impl ChangeKind {
  /// Kinds whose inverse needs the previously captured field values.
  /// Tracking one of these without `old_values` is a precondition failure.
  pub fn requires_old_values(self) -> bool {
    matches!(self, Self::Update | Self::BulkUpdate | Self::Delete)
  }

  /// Kinds that carry the post-mutation field values.
  pub fn requires_new_values(self) -> bool {
    matches!(
      self,
      Self::Insert | Self::BulkInsert | Self::Update | Self::BulkUpdate
    )
  }

  /// Kinds whose changed-field set is computed by diffing old against new
  /// values (as opposed to taking every tracked field present in `new_values`).
  pub fn is_update(self) -> bool {
    matches!(self, Self::Update | Self::BulkUpdate)
  }
}

// ─── VersionRecord ───────────────────────────────────────────────────────────

/// One immutable record of one mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
  /// Store-assigned; the authoritative identity of the record. The content
  /// hash is diagnostic metadata only and is never used for lookup.
  pub version_id:        VersionId,
  pub table_name:        String,
  pub record_id:         RecordId,
  pub partition_id:      Option<PartitionId>,
  /// The changeset this mutation belongs to, if it was tracked inside one.
  pub changeset_id:      Option<ChangeSetId>,
  pub kind:              ChangeKind,
  /// Field values before the mutation; required for update and delete kinds.
  pub old_values:        Option<FieldMap>,
  /// Field values after the mutation; required for insert and update kinds.
  pub new_values:        Option<FieldMap>,
  /// The fields that actually differ, in tracked-field order.
  pub changed_fields:    Vec<String>,
  pub changed_at:        DateTime<Utc>,
  pub actor:             String,
  pub reason:            Option<String>,
  /// SHA-256 tamper-evidence fingerprint; see [`crate::fingerprint`].
  pub content_hash:      String,
  /// True while this is the latest version of (table_name, record_id).
  pub is_active:         bool,
  /// The previous version of the same record, if one exists.
  pub parent_version_id: Option<VersionId>,
}

// ─── VersionStats ────────────────────────────────────────────────────────────

/// Aggregate counts over the version log, for reporting and capacity
/// monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStats {
  pub total_versions:  u64,
  /// Version counts per table, most-versioned table first.
  pub table_counts:    Vec<(String, u64)>,
  /// Versions appended at or after the requested recency bound.
  pub recent_versions: u64,
  /// Version counts for the most-changed partitions, bounded by the
  /// requested limit. Versions without a partition are not counted here.
  pub top_partitions:  Vec<(PartitionId, u64)>,
}

// ─── NewChange ───────────────────────────────────────────────────────────────

/// Input to `ChangeTracker::track`. The version id, fingerprint, timestamp,
/// and parent link are all derived by the tracker and the store; they are not
/// accepted from callers.
#[derive(Debug, Clone)]
pub struct NewChange {
  pub table_name:   String,
  pub record_id:    RecordId,
  pub kind:         ChangeKind,
  pub new_values:   Option<FieldMap>,
  pub old_values:   Option<FieldMap>,
  pub actor:        String,
  pub reason:       Option<String>,
  pub partition_id: Option<PartitionId>,
  pub changeset_id: Option<ChangeSetId>,
}

impl NewChange {
  /// Convenience constructor with all optional fields unset and the actor
  /// defaulted to `"system"`.
  pub fn new(
    table_name: impl Into<String>,
    record_id: RecordId,
    kind: ChangeKind,
  ) -> Self {
    Self {
      table_name: table_name.into(),
      record_id,
      kind,
      new_values: None,
      old_values: None,
      actor: "system".to_owned(),
      reason: None,
      partition_id: None,
      changeset_id: None,
    }
  }
}
