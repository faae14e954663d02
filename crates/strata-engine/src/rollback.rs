//! [`RollbackEngine`] — applies compensating mutations for a changeset.

use std::sync::Arc;

use serde::Serialize;
use strata_core::{
  changeset::{ChangeSet, ChangeSetId},
  registry::TableRegistry,
  store::VersionStore,
  version::{ChangeKind, FieldMap, RecordId, VersionId, VersionRecord},
};

use crate::error::{Error, PartialRollbackError, Result};

// ─── Report types ────────────────────────────────────────────────────────────

/// One member change the engine could not revert.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackFailure {
  pub version_id: VersionId,
  pub table_name: String,
  pub record_id:  RecordId,
  pub reason:     String,
}

/// Structured outcome of a rollback run.
///
/// Partial success is an expected degraded outcome, so it is reported here
/// rather than raised: callers must inspect the failure list and treat a
/// non-empty one as requiring manual intervention, never as silent success.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
  pub changeset_id: ChangeSetId,
  /// Version ids reverted, in the order their inverses were applied.
  pub reverted:     Vec<VersionId>,
  pub failures:     Vec<RollbackFailure>,
}

impl RollbackReport {
  pub fn empty(changeset_id: ChangeSetId) -> Self {
    Self {
      changeset_id,
      reverted: Vec::new(),
      failures: Vec::new(),
    }
  }

  pub fn is_complete(&self) -> bool { self.failures.is_empty() }

  /// For callers that prefer `Result` plumbing over inspecting the report.
  pub fn into_result(self) -> Result<(), PartialRollbackError> {
    if self.is_complete() {
      Ok(())
    } else {
      Err(PartialRollbackError {
        changeset_id: self.changeset_id,
        reverted:     self.reverted.len(),
        attempted:    self.reverted.len() + self.failures.len(),
        failures:     self.failures,
      })
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Replays a committed changeset's members in reverse order and applies the
/// structural inverse of each.
///
/// Known limitation, deliberate: the engine is conflict-blind. If a record
/// touched by changeset C was later modified by a different committed
/// changeset, rolling back C clobbers that later change. Detecting the lost
/// update is a policy decision left to callers.
pub struct RollbackEngine<S> {
  store:    Arc<S>,
  registry: Arc<TableRegistry>,
}

impl<S: VersionStore> RollbackEngine<S> {
  pub fn new(store: Arc<S>, registry: Arc<TableRegistry>) -> Self {
    Self { store, registry }
  }

  /// Undo every member of `changeset`, best effort.
  ///
  /// Members are inverted newest-first. The order is required, not cosmetic:
  /// within one changeset a record may be inserted then updated, and the
  /// update's old values reflect the intermediate post-insert state rather
  /// than an absolute baseline — forward order would misapply the update's
  /// inverse before the insert's inverse exists to be undone.
  ///
  /// One failed inversion never aborts the rest; failures are logged and
  /// collected into the report.
  pub async fn rollback(&self, changeset: &ChangeSet) -> Result<RollbackReport> {
    let mut members = self
      .store
      .changeset_members(changeset.changeset_id)
      .await
      .map_err(Error::store)?;

    members.sort_by(|a, b| {
      (b.changed_at, b.version_id).cmp(&(a.changed_at, a.version_id))
    });

    let mut report = RollbackReport::empty(changeset.changeset_id);
    for version in &members {
      match self.invert(version).await {
        Ok(()) => report.reverted.push(version.version_id),
        Err(reason) => {
          tracing::warn!(
            version = version.version_id,
            table = %version.table_name,
            record = version.record_id,
            reason,
            "failed to revert change"
          );
          report.failures.push(RollbackFailure {
            version_id: version.version_id,
            table_name: version.table_name.clone(),
            record_id:  version.record_id,
            reason,
          });
        }
      }
    }

    Ok(report)
  }

  /// Apply the structural inverse of one version record.
  ///
  /// Bulk kinds are already expanded to one record per constituent row at
  /// tracking time, so they take the same audited path as their scalar
  /// forms — there is no separate bulk fast path.
  async fn invert(&self, version: &VersionRecord) -> Result<(), String> {
    let config = self
      .registry
      .get(&version.table_name)
      .map_err(|e| e.to_string())?;

    match version.kind {
      // An insert's inverse is a delete by primary key.
      ChangeKind::Insert | ChangeKind::BulkInsert => {
        let affected = self
          .store
          .delete_row(&version.table_name, &config.primary_key, version.record_id)
          .await
          .map_err(|e| e.to_string())?;
        if affected == 0 {
          return Err("inserted row no longer exists".to_owned());
        }
        Ok(())
      }

      // An update's inverse restores the captured old values, touching only
      // the fields that changed.
      ChangeKind::Update | ChangeKind::BulkUpdate => {
        let old = version
          .old_values
          .as_ref()
          .ok_or_else(|| "old values were never captured".to_owned())?;
        let restore: FieldMap = version
          .changed_fields
          .iter()
          .filter_map(|f| old.get(f).map(|v| (f.clone(), v.clone())))
          .collect();
        if restore.is_empty() {
          return Err("no changed fields present in old values".to_owned());
        }

        let affected = self
          .store
          .update_row(
            &version.table_name,
            &config.primary_key,
            version.record_id,
            &restore,
          )
          .await
          .map_err(|e| e.to_string())?;
        if affected == 0 {
          return Err("updated row no longer exists".to_owned());
        }
        Ok(())
      }

      // A delete's inverse re-inserts the captured old values.
      ChangeKind::Delete => {
        let old = version
          .old_values
          .as_ref()
          .ok_or_else(|| "old values were never captured".to_owned())?;
        self
          .store
          .insert_row(&version.table_name, old)
          .await
          .map_err(|e| e.to_string())?;
        Ok(())
      }

      ChangeKind::SchemaChange => Err(
        "schema changes have no structural inverse; manual intervention \
         required"
          .to_owned(),
      ),
    }
  }
}
