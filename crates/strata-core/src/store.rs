//! The `VersionStore` trait — the seam between the subsystem and its
//! relational backend.
//!
//! The trait is implemented by storage backends (e.g. `strata-store-sqlite`).
//! The engine crate depends on this abstraction, not on any concrete backend.
//! Backends are assumed to provide durable, atomic *single-statement* writes;
//! no multi-statement transaction API is required — a changeset is a logical,
//! not physical, unit of atomicity, so a crash mid-changeset can leave a
//! Pending changeset with some members already durably written. Such orphans
//! are surfaced by [`VersionStore::pending_changesets`] for external
//! reconciliation.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  changeset::{ChangeSet, ChangeSetId, ChangeSetStatus},
  version::{
    FieldMap, PartitionId, RecordId, VersionId, VersionRecord, VersionStats,
  },
};

/// Abstraction over a Strata storage backend.
pub trait VersionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Version records — append-only ─────────────────────────────────────

  /// Persist one version record and return it with its assigned identity.
  ///
  /// The store assigns `version_id`, links `parent_version_id` to the
  /// previous latest version of the same (table, record) pair, and clears
  /// that version's `is_active` flag; those fields on the input are ignored.
  /// Appends naming a changeset that is not `Pending` are rejected.
  fn append_version(
    &self,
    record: VersionRecord,
  ) -> impl Future<Output = Result<VersionRecord, Self::Error>> + Send + '_;

  /// Retrieve a version record by id. Returns `None` if not found.
  fn get_version(
    &self,
    id: VersionId,
  ) -> impl Future<Output = Result<Option<VersionRecord>, Self::Error>> + Send + '_;

  /// Version history for one record, most-recent first, at most `limit` rows.
  fn record_history<'a>(
    &'a self,
    table: &'a str,
    record_id: RecordId,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<VersionRecord>, Self::Error>> + Send + 'a;

  /// All changes scoped to `partition_id` across tables, most-recent first.
  /// Time bounds are half-open `[from, to)`.
  fn partition_changes(
    &self,
    partition_id: PartitionId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<VersionRecord>, Self::Error>> + Send + '_;

  // ── Changesets ────────────────────────────────────────────────────────

  /// Persist a freshly created changeset row.
  fn insert_changeset<'a>(
    &'a self,
    changeset: &'a ChangeSet,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Load a changeset with its member list populated in append order.
  /// Returns `None` if not found.
  fn get_changeset(
    &self,
    id: ChangeSetId,
  ) -> impl Future<Output = Result<Option<ChangeSet>, Self::Error>> + Send + '_;

  /// Conditionally move a changeset from one of `expected` to `to`.
  ///
  /// Fails with the backend's not-found error if the changeset does not
  /// exist, and with its state error if the current status is not listed in
  /// `expected`. The changeset row itself is never deleted — the audit trail
  /// is superseded, not erased.
  fn transition_changeset<'a>(
    &'a self,
    id: ChangeSetId,
    expected: &'a [ChangeSetStatus],
    to: ChangeSetStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// All changesets still in `Pending` state, oldest first. After a crash
  /// this is the orphan listing external reconciliation works from.
  fn pending_changesets(
    &self,
  ) -> impl Future<Output = Result<Vec<ChangeSet>, Self::Error>> + Send + '_;

  /// The member version records of a changeset, in append order.
  fn changeset_members(
    &self,
    id: ChangeSetId,
  ) -> impl Future<Output = Result<Vec<VersionRecord>, Self::Error>> + Send + '_;

  // ── Row mutations — compensating writes ───────────────────────────────

  /// Insert one row built from `values`. Returns the affected-row count.
  fn insert_row<'a>(
    &'a self,
    table: &'a str,
    values: &'a FieldMap,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Set `values` on the row addressed by the primary key.
  fn update_row<'a>(
    &'a self,
    table: &'a str,
    pk_field: &'a str,
    record_id: RecordId,
    values: &'a FieldMap,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Delete the row addressed by the primary key.
  fn delete_row<'a>(
    &'a self,
    table: &'a str,
    pk_field: &'a str,
    record_id: RecordId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Statistics ────────────────────────────────────────────────────────

  /// Aggregate counts over the whole version log. `recent_since` bounds the
  /// recent-activity count; `top_limit` bounds the per-partition list.
  fn version_statistics(
    &self,
    recent_since: DateTime<Utc>,
    top_limit: usize,
  ) -> impl Future<Output = Result<VersionStats, Self::Error>> + Send + '_;

  // ── Retention ─────────────────────────────────────────────────────────

  /// Delete version records older than `horizon`, always keeping the single
  /// most-recent version per (table, record) pair. Returns the number of
  /// rows deleted; idempotent.
  fn purge_versions_before(
    &self,
    horizon: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
