//! [`ChangeTracker`] — turns observed mutations into version records.

use std::sync::Arc;

use chrono::Utc;
use strata_core::{
  PreconditionError, fingerprint,
  registry::{TableConfig, TableRegistry},
  store::VersionStore,
  version::{ChangeKind, FieldMap, NewChange, VersionRecord},
};

use crate::error::{Error, Result};

/// Records one version per observed mutation.
///
/// The tracker performs no change-data-capture: the upstream mutation
/// producer must call [`ChangeTracker::track`] for every mutation it
/// performs, in the same logical operation as the physical write.
pub struct ChangeTracker<S> {
  store:    Arc<S>,
  registry: Arc<TableRegistry>,
}

impl<S: VersionStore> ChangeTracker<S> {
  pub fn new(store: Arc<S>, registry: Arc<TableRegistry>) -> Self {
    Self { store, registry }
  }

  /// Validate `change`, compute its changed-field set and content
  /// fingerprint, and append one version record to the store.
  ///
  /// Nothing is persisted when any precondition fails: a malformed tracked
  /// change would silently corrupt history, so it always surfaces
  /// synchronously.
  pub async fn track(&self, change: NewChange) -> Result<VersionRecord> {
    let config = self.registry.get(&change.table_name)?;

    if change.kind.requires_new_values() && change.new_values.is_none() {
      return Err(
        PreconditionError::MissingNewValues {
          table:     change.table_name,
          record_id: change.record_id,
          kind:      change.kind,
        }
        .into(),
      );
    }
    if change.kind.requires_old_values() && change.old_values.is_none() {
      return Err(
        PreconditionError::MissingOldValues {
          table:     change.table_name,
          record_id: change.record_id,
          kind:      change.kind,
        }
        .into(),
      );
    }

    let changed_fields = changed_fields(
      config,
      change.kind,
      change.old_values.as_ref(),
      change.new_values.as_ref(),
    );
    if change.kind.is_update() && changed_fields.is_empty() {
      return Err(
        PreconditionError::EmptyUpdate {
          table:     change.table_name,
          record_id: change.record_id,
        }
        .into(),
      );
    }

    let changed_at = Utc::now();
    let content_hash = fingerprint::content_hash(
      &change.table_name,
      change.record_id,
      change.kind,
      change.new_values.as_ref(),
      changed_at,
    );

    let record = VersionRecord {
      version_id: 0, // assigned by the store
      table_name: change.table_name,
      record_id: change.record_id,
      partition_id: change.partition_id,
      changeset_id: change.changeset_id,
      kind: change.kind,
      old_values: change.old_values,
      new_values: change.new_values,
      changed_fields,
      changed_at,
      actor: change.actor,
      reason: change.reason,
      content_hash,
      is_active: true,
      parent_version_id: None, // linked by the store
    };

    let stored = self
      .store
      .append_version(record)
      .await
      .map_err(Error::store)?;

    tracing::debug!(
      version = stored.version_id,
      table = %stored.table_name,
      record = stored.record_id,
      kind = ?stored.kind,
      "change tracked"
    );

    Ok(stored)
  }
}

/// The fields that actually differ, in tracked-field order.
///
/// Without old values (inserts, schema changes) every tracked field present
/// in `new_values` counts as changed. With old values the field must be
/// present in `new_values` with a value different from the captured one.
/// Excluded fields never appear.
fn changed_fields(
  config: &TableConfig,
  kind: ChangeKind,
  old_values: Option<&FieldMap>,
  new_values: Option<&FieldMap>,
) -> Vec<String> {
  let Some(new_values) = new_values else {
    // Deletes carry no new values; their changed-field set is empty.
    return Vec::new();
  };

  config
    .tracked_fields
    .iter()
    .filter(|field| config.is_tracked(field))
    .filter(|field| match new_values.get(field.as_str()) {
      None => false,
      Some(new) => {
        if kind.is_update() {
          old_values.and_then(|old| old.get(field.as_str())) != Some(new)
        } else {
          true
        }
      }
    })
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> TableConfig {
    TableConfig {
      table_name:      "widgets".into(),
      primary_key:     "id".into(),
      tracked_fields:  vec!["name".into(), "qty".into(), "updated_at".into()],
      excluded_fields: vec!["updated_at".into()],
    }
  }

  fn map(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
  }

  #[test]
  fn insert_takes_tracked_fields_present_in_new_values() {
    let new = map(&[
      ("name", serde_json::json!("a")),
      ("qty", serde_json::json!(1)),
      ("untracked", serde_json::json!(true)),
    ]);
    let fields = changed_fields(&config(), ChangeKind::Insert, None, Some(&new));
    assert_eq!(fields, vec!["name", "qty"]);
  }

  #[test]
  fn update_diffs_against_old_values() {
    let old = map(&[
      ("name", serde_json::json!("a")),
      ("qty", serde_json::json!(1)),
    ]);
    let new = map(&[
      ("name", serde_json::json!("a")),
      ("qty", serde_json::json!(5)),
    ]);
    let fields =
      changed_fields(&config(), ChangeKind::Update, Some(&old), Some(&new));
    assert_eq!(fields, vec!["qty"]);
  }

  #[test]
  fn update_with_identical_values_yields_no_fields() {
    let values = map(&[("qty", serde_json::json!(1))]);
    let fields = changed_fields(
      &config(),
      ChangeKind::Update,
      Some(&values),
      Some(&values.clone()),
    );
    assert!(fields.is_empty());
  }

  #[test]
  fn excluded_fields_never_appear() {
    let new = map(&[("updated_at", serde_json::json!("2026-01-01"))]);
    let fields = changed_fields(&config(), ChangeKind::Insert, None, Some(&new));
    assert!(fields.is_empty());
  }

  #[test]
  fn delete_has_no_changed_fields() {
    let fields = changed_fields(&config(), ChangeKind::Delete, None, None);
    assert!(fields.is_empty());
  }
}
