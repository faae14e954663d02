//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeZone, Utc};
use strata_core::{
  NotFoundError, StateError,
  changeset::{ChangeSet, ChangeSetStatus},
  store::VersionStore,
  version::{ChangeKind, FieldMap, VersionRecord},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

fn ts(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

fn map(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
  pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
}

fn version(
  record_id: i64,
  kind: ChangeKind,
  at: DateTime<Utc>,
) -> VersionRecord {
  VersionRecord {
    version_id: 0,
    table_name: "widgets".into(),
    record_id,
    partition_id: None,
    changeset_id: None,
    kind,
    old_values: None,
    new_values: Some(map(&[("qty", serde_json::json!(1))])),
    changed_fields: vec!["qty".into()],
    changed_at: at,
    actor: "test".into(),
    reason: None,
    content_hash: "fingerprint".into(),
    is_active: true,
    parent_version_id: None,
  }
}

// ─── Version records ─────────────────────────────────────────────────────────

#[tokio::test]
async fn append_assigns_monotonic_ids() {
  let s = store().await;

  let a = s.append_version(version(1, ChangeKind::Insert, ts(100))).await.unwrap();
  let b = s.append_version(version(2, ChangeKind::Insert, ts(101))).await.unwrap();

  assert!(a.version_id > 0);
  assert!(b.version_id > a.version_id);
}

#[tokio::test]
async fn append_links_parent_and_clears_previous_active_flag() {
  let s = store().await;

  let first = s.append_version(version(1, ChangeKind::Insert, ts(100))).await.unwrap();
  let second = s.append_version(version(1, ChangeKind::Update, ts(101))).await.unwrap();

  assert_eq!(first.parent_version_id, None);
  assert_eq!(second.parent_version_id, Some(first.version_id));

  let first = s.get_version(first.version_id).await.unwrap().unwrap();
  let second = s.get_version(second.version_id).await.unwrap().unwrap();
  assert!(!first.is_active);
  assert!(second.is_active);
}

#[tokio::test]
async fn versions_of_other_records_do_not_become_parents() {
  let s = store().await;

  s.append_version(version(1, ChangeKind::Insert, ts(100))).await.unwrap();
  let other = s.append_version(version(2, ChangeKind::Insert, ts(101))).await.unwrap();

  assert_eq!(other.parent_version_id, None);
}

#[tokio::test]
async fn get_version_missing_returns_none() {
  let s = store().await;
  assert!(s.get_version(9999).await.unwrap().is_none());
}

#[tokio::test]
async fn record_history_is_most_recent_first_and_bounded() {
  let s = store().await;

  for i in 0..5 {
    s.append_version(version(1, ChangeKind::Update, ts(100 + i))).await.unwrap();
  }
  s.append_version(version(2, ChangeKind::Insert, ts(200))).await.unwrap();

  let history = s.record_history("widgets", 1, 3).await.unwrap();
  assert_eq!(history.len(), 3);
  assert_eq!(history[0].changed_at, ts(104));
  assert_eq!(history[1].changed_at, ts(103));
  assert_eq!(history[2].changed_at, ts(102));
  assert!(history.iter().all(|v| v.record_id == 1));
}

#[tokio::test]
async fn partition_window_is_half_open() {
  let s = store().await;

  for (record_id, at) in [(1, ts(100)), (2, ts(200)), (3, ts(300))] {
    let mut v = version(record_id, ChangeKind::Insert, at);
    v.partition_id = Some(7);
    s.append_version(v).await.unwrap();
  }

  // [100, 300) includes the records at 100 and 200 but not 300.
  let changes = s
    .partition_changes(7, Some(ts(100)), Some(ts(300)), 50)
    .await
    .unwrap();
  assert_eq!(changes.len(), 2);
  assert_eq!(changes[0].changed_at, ts(200));
  assert_eq!(changes[1].changed_at, ts(100));
}

#[tokio::test]
async fn partition_changes_ignore_other_partitions() {
  let s = store().await;

  let mut in_scope = version(1, ChangeKind::Insert, ts(100));
  in_scope.partition_id = Some(1);
  s.append_version(in_scope).await.unwrap();

  let mut out_of_scope = version(2, ChangeKind::Insert, ts(101));
  out_of_scope.partition_id = Some(2);
  s.append_version(out_of_scope).await.unwrap();

  let changes = s.partition_changes(1, None, None, 50).await.unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].record_id, 1);
}

#[tokio::test]
async fn version_fields_roundtrip() {
  let s = store().await;

  let mut input = version(1, ChangeKind::Update, ts(100));
  input.partition_id = Some(3);
  input.old_values = Some(map(&[("qty", serde_json::json!(1))]));
  input.new_values = Some(map(&[("qty", serde_json::json!(5))]));
  input.reason = Some("inventory correction".into());
  input.actor = "admin".into();

  let stored = s.append_version(input).await.unwrap();
  let fetched = s.get_version(stored.version_id).await.unwrap().unwrap();

  assert_eq!(fetched.table_name, "widgets");
  assert_eq!(fetched.partition_id, Some(3));
  assert_eq!(fetched.kind, ChangeKind::Update);
  assert_eq!(fetched.old_values, Some(map(&[("qty", serde_json::json!(1))])));
  assert_eq!(fetched.new_values, Some(map(&[("qty", serde_json::json!(5))])));
  assert_eq!(fetched.changed_fields, vec!["qty"]);
  assert_eq!(fetched.changed_at, ts(100));
  assert_eq!(fetched.actor, "admin");
  assert_eq!(fetched.reason.as_deref(), Some("inventory correction"));
  assert_eq!(fetched.content_hash, "fingerprint");
}

// ─── Changesets ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn changeset_roundtrip_with_members_in_append_order() {
  let s = store().await;

  let changeset = ChangeSet::new("bulk import", vec![1, 2]);
  s.insert_changeset(&changeset).await.unwrap();

  let mut ids = Vec::new();
  for i in 0..3 {
    let mut v = version(i, ChangeKind::Insert, ts(100 + i));
    v.changeset_id = Some(changeset.changeset_id);
    ids.push(s.append_version(v).await.unwrap().version_id);
  }

  let loaded = s.get_changeset(changeset.changeset_id).await.unwrap().unwrap();
  assert_eq!(loaded.description, "bulk import");
  assert_eq!(loaded.partition_scope, vec![1, 2]);
  assert_eq!(loaded.status, ChangeSetStatus::Pending);
  assert!(loaded.rollback_eligible);
  assert_eq!(loaded.members, ids);
}

#[tokio::test]
async fn get_changeset_missing_returns_none() {
  let s = store().await;
  let missing = s.get_changeset(uuid::Uuid::new_v4()).await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn append_into_unknown_changeset_errors() {
  let s = store().await;

  let mut v = version(1, ChangeKind::Insert, ts(100));
  v.changeset_id = Some(uuid::Uuid::new_v4());

  let err = s.append_version(v).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(NotFoundError::Changeset(_))));
}

#[tokio::test]
async fn append_into_committed_changeset_errors() {
  let s = store().await;

  let changeset = ChangeSet::new("closed", vec![]);
  s.insert_changeset(&changeset).await.unwrap();
  s.transition_changeset(
    changeset.changeset_id,
    &[ChangeSetStatus::Pending],
    ChangeSetStatus::Committed,
  )
  .await
  .unwrap();

  let mut v = version(1, ChangeKind::Insert, ts(100));
  v.changeset_id = Some(changeset.changeset_id);

  let err = s.append_version(v).await.unwrap_err();
  assert!(matches!(
    err,
    Error::State(StateError::InvalidStatus {
      status: ChangeSetStatus::Committed,
      ..
    })
  ));
}

#[tokio::test]
async fn rejected_appends_leave_no_member_rows() {
  let s = store().await;

  let changeset = ChangeSet::new("closed", vec![]);
  s.insert_changeset(&changeset).await.unwrap();
  s.transition_changeset(
    changeset.changeset_id,
    &[ChangeSetStatus::Pending],
    ChangeSetStatus::Committed,
  )
  .await
  .unwrap();

  // The status gate and the insert are one serialized unit: when the gate
  // refuses, no version row exists anywhere.
  let mut v = version(1, ChangeKind::Insert, ts(100));
  v.changeset_id = Some(changeset.changeset_id);
  assert!(s.append_version(v).await.is_err());

  assert!(s.changeset_members(changeset.changeset_id).await.unwrap().is_empty());
  assert!(s.record_history("widgets", 1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn transition_is_conditional() {
  let s = store().await;

  let changeset = ChangeSet::new("once", vec![]);
  s.insert_changeset(&changeset).await.unwrap();

  s.transition_changeset(
    changeset.changeset_id,
    &[ChangeSetStatus::Pending],
    ChangeSetStatus::Committed,
  )
  .await
  .unwrap();

  // A second commit finds the changeset already committed.
  let err = s
    .transition_changeset(
      changeset.changeset_id,
      &[ChangeSetStatus::Pending],
      ChangeSetStatus::Committed,
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::State(StateError::InvalidStatus {
      status: ChangeSetStatus::Committed,
      ..
    })
  ));
}

#[tokio::test]
async fn transition_unknown_changeset_errors() {
  let s = store().await;

  let err = s
    .transition_changeset(
      uuid::Uuid::new_v4(),
      &[ChangeSetStatus::Pending],
      ChangeSetStatus::Committed,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound(NotFoundError::Changeset(_))));
}

#[tokio::test]
async fn pending_changesets_lists_only_pending_oldest_first() {
  let s = store().await;

  let mut first = ChangeSet::new("first", vec![]);
  first.created_at = ts(100);
  let mut second = ChangeSet::new("second", vec![]);
  second.created_at = ts(200);
  let mut committed = ChangeSet::new("done", vec![]);
  committed.created_at = ts(150);

  s.insert_changeset(&second).await.unwrap();
  s.insert_changeset(&first).await.unwrap();
  s.insert_changeset(&committed).await.unwrap();
  s.transition_changeset(
    committed.changeset_id,
    &[ChangeSetStatus::Pending],
    ChangeSetStatus::Committed,
  )
  .await
  .unwrap();

  let pending = s.pending_changesets().await.unwrap();
  assert_eq!(pending.len(), 2);
  assert_eq!(pending[0].description, "first");
  assert_eq!(pending[1].description, "second");
}

// ─── Row mutations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn row_mutations_roundtrip() {
  let s = store().await;
  s.execute_batch(
    "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT, qty INTEGER);",
  )
  .await
  .unwrap();

  let row = map(&[
    ("id", serde_json::json!(1)),
    ("name", serde_json::json!("anvil")),
    ("qty", serde_json::json!(3)),
  ]);
  assert_eq!(s.insert_row("widgets", &row).await.unwrap(), 1);

  let fetched = s.get_row("widgets", "id", 1).await.unwrap().unwrap();
  assert_eq!(fetched.get("name"), Some(&serde_json::json!("anvil")));
  assert_eq!(fetched.get("qty"), Some(&serde_json::json!(3)));

  let patch = map(&[("qty", serde_json::json!(9))]);
  assert_eq!(s.update_row("widgets", "id", 1, &patch).await.unwrap(), 1);
  let fetched = s.get_row("widgets", "id", 1).await.unwrap().unwrap();
  assert_eq!(fetched.get("qty"), Some(&serde_json::json!(9)));
  assert_eq!(fetched.get("name"), Some(&serde_json::json!("anvil")));

  assert_eq!(s.delete_row("widgets", "id", 1).await.unwrap(), 1);
  assert!(s.get_row("widgets", "id", 1).await.unwrap().is_none());
}

#[tokio::test]
async fn mutating_a_missing_row_affects_nothing() {
  let s = store().await;
  s.execute_batch("CREATE TABLE widgets (id INTEGER PRIMARY KEY, qty INTEGER);")
    .await
    .unwrap();

  let patch = map(&[("qty", serde_json::json!(9))]);
  assert_eq!(s.update_row("widgets", "id", 42, &patch).await.unwrap(), 0);
  assert_eq!(s.delete_row("widgets", "id", 42).await.unwrap(), 0);
}

#[tokio::test]
async fn null_values_roundtrip_through_rows() {
  let s = store().await;
  s.execute_batch("CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT);")
    .await
    .unwrap();

  let row = map(&[
    ("id", serde_json::json!(1)),
    ("name", serde_json::Value::Null),
  ]);
  s.insert_row("widgets", &row).await.unwrap();

  let fetched = s.get_row("widgets", "id", 1).await.unwrap().unwrap();
  assert_eq!(fetched.get("name"), Some(&serde_json::Value::Null));
}

#[tokio::test]
async fn hostile_identifiers_are_rejected() {
  let s = store().await;

  let row = map(&[("id", serde_json::json!(1))]);
  let err = s.insert_row("widgets; DROP TABLE widgets", &row).await.unwrap_err();
  assert!(matches!(err, Error::InvalidIdentifier(_)));

  let bad_field = map(&[("qty = 0 --", serde_json::json!(1))]);
  let err = s.insert_row("widgets", &bad_field).await.unwrap_err();
  assert!(matches!(err, Error::InvalidIdentifier(_)));
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn statistics_aggregate_the_version_log() {
  let s = store().await;

  for (record_id, at, partition) in
    [(1, ts(100), Some(7)), (1, ts(200), Some(7)), (2, ts(300), None)]
  {
    let mut v = version(record_id, ChangeKind::Update, at);
    v.partition_id = partition;
    s.append_version(v).await.unwrap();
  }
  let mut other = version(1, ChangeKind::Insert, ts(400));
  other.table_name = "gadgets".into();
  other.partition_id = Some(9);
  s.append_version(other).await.unwrap();

  let stats = s.version_statistics(ts(250), 10).await.unwrap();
  assert_eq!(stats.total_versions, 4);
  assert_eq!(stats.table_counts, vec![
    ("widgets".to_owned(), 3),
    ("gadgets".to_owned(), 1)
  ]);
  // ts(300) and ts(400) fall at or after the bound.
  assert_eq!(stats.recent_versions, 2);
  assert_eq!(stats.top_partitions, vec![(7, 2), (9, 1)]);
}

#[tokio::test]
async fn statistics_bound_the_partition_list() {
  let s = store().await;

  for (record_id, partition) in [(1, 1), (2, 2), (3, 2)] {
    let mut v = version(record_id, ChangeKind::Insert, ts(100));
    v.partition_id = Some(partition);
    s.append_version(v).await.unwrap();
  }

  let stats = s.version_statistics(ts(0), 1).await.unwrap();
  assert_eq!(stats.top_partitions, vec![(2, 2)]);
}

#[tokio::test]
async fn statistics_of_an_empty_log_are_zero() {
  let s = store().await;

  let stats = s.version_statistics(ts(0), 10).await.unwrap();
  assert_eq!(stats, strata_core::version::VersionStats::default());
}

// ─── Retention ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn purge_keeps_the_latest_version_per_record() {
  let s = store().await;

  for i in 0..3 {
    s.append_version(version(1, ChangeKind::Update, ts(100 + i))).await.unwrap();
  }
  s.append_version(version(2, ChangeKind::Insert, ts(100))).await.unwrap();

  // Horizon far past every write: everything but each record's latest goes.
  let deleted = s.purge_versions_before(ts(10_000)).await.unwrap();
  assert_eq!(deleted, 2);

  let history = s.record_history("widgets", 1, 50).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].changed_at, ts(102));

  // The sole version of record 2 survives regardless of age.
  let history = s.record_history("widgets", 2, 50).await.unwrap();
  assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn purge_is_idempotent() {
  let s = store().await;

  for i in 0..3 {
    s.append_version(version(1, ChangeKind::Update, ts(100 + i))).await.unwrap();
  }

  assert_eq!(s.purge_versions_before(ts(10_000)).await.unwrap(), 2);
  assert_eq!(s.purge_versions_before(ts(10_000)).await.unwrap(), 0);
}

#[tokio::test]
async fn purge_respects_the_horizon() {
  let s = store().await;

  s.append_version(version(1, ChangeKind::Insert, ts(100))).await.unwrap();
  s.append_version(version(1, ChangeKind::Update, ts(200))).await.unwrap();
  s.append_version(version(1, ChangeKind::Update, ts(300))).await.unwrap();

  // Only the version at 100 is both old enough and not the latest.
  let deleted = s.purge_versions_before(ts(150)).await.unwrap();
  assert_eq!(deleted, 1);

  let history = s.record_history("widgets", 1, 50).await.unwrap();
  assert_eq!(history.len(), 2);
}
