//! [`ChangeSetManager`] — creates changesets and drives their lifecycle.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard},
};

use strata_core::{
  NotFoundError, StateError,
  changeset::{ChangeSet, ChangeSetId, ChangeSetStatus},
  registry::TableRegistry,
  store::VersionStore,
  version::PartitionId,
};

use crate::{
  error::{Error, Result},
  rollback::{RollbackEngine, RollbackReport},
};

/// Groups tracked changes under named, scoped changesets.
///
/// The active-changeset registry is an explicitly constructed object with
/// process-scoped lifetime — independent manager instances (e.g. under test)
/// never share state. Registry access is serialised by one mutex; the store
/// I/O each operation triggers runs outside that mutex, so I/O across
/// distinct changesets proceeds concurrently.
pub struct ChangeSetManager<S> {
  store:    Arc<S>,
  rollback: RollbackEngine<S>,
  active:   Mutex<HashMap<ChangeSetId, ChangeSet>>,
}

impl<S: VersionStore> ChangeSetManager<S> {
  pub fn new(store: Arc<S>, registry: Arc<TableRegistry>) -> Self {
    Self {
      rollback: RollbackEngine::new(Arc::clone(&store), registry),
      store,
      active: Mutex::new(HashMap::new()),
    }
  }

  fn active(&self) -> MutexGuard<'_, HashMap<ChangeSetId, ChangeSet>> {
    self.active.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Allocate a new pending changeset and return its id.
  ///
  /// The changeset row is persisted immediately, so a crash before commit
  /// leaves a discoverable orphan rather than an untraceable gap (see
  /// [`ChangeSetManager::pending`]).
  pub async fn create(
    &self,
    description: impl Into<String>,
    partition_scope: Vec<PartitionId>,
  ) -> Result<ChangeSetId> {
    let changeset = ChangeSet::new(description, partition_scope);
    let id = changeset.changeset_id;

    self
      .store
      .insert_changeset(&changeset)
      .await
      .map_err(Error::store)?;
    self.active().insert(id, changeset);

    tracing::info!(changeset = %id, "created changeset");
    Ok(id)
  }

  /// Pending → Committed.
  ///
  /// Commit is terminal but does not imply irrevocability: a committed
  /// changeset may still later be rolled back.
  pub async fn commit(&self, id: ChangeSetId) -> Result<()> {
    let changeset = self.load(id).await?;
    self.expect_status(&changeset, &[ChangeSetStatus::Pending])?;

    self
      .store
      .transition_changeset(
        id,
        &[ChangeSetStatus::Pending],
        ChangeSetStatus::Committed,
      )
      .await
      .map_err(Error::store)?;
    self.active().remove(&id);

    tracing::info!(changeset = %id, "committed changeset");
    Ok(())
  }

  /// Undo a changeset.
  ///
  /// On a pending changeset this is a no-op abort: the status flips to
  /// `RolledBack` and any members already durably written stay in the audit
  /// trail. On a committed changeset the rollback engine applies
  /// compensating mutations and the returned report lists anything it could
  /// not revert. The changeset row itself is never deleted — the rollback is
  /// recorded as a superseding transition, not an erasure.
  pub async fn rollback(&self, id: ChangeSetId) -> Result<RollbackReport> {
    let changeset = self.load(id).await?;

    if !changeset.rollback_eligible {
      return Err(StateError::RollbackNotEligible(id).into());
    }

    match changeset.status {
      ChangeSetStatus::Pending => {
        self
          .store
          .transition_changeset(
            id,
            &[ChangeSetStatus::Pending],
            ChangeSetStatus::RolledBack,
          )
          .await
          .map_err(Error::store)?;
        self.active().remove(&id);

        tracing::info!(changeset = %id, "aborted pending changeset");
        Ok(RollbackReport::empty(id))
      }

      ChangeSetStatus::Committed => {
        let report = self.rollback.rollback(&changeset).await?;

        self
          .store
          .transition_changeset(
            id,
            &[ChangeSetStatus::Committed],
            ChangeSetStatus::RolledBack,
          )
          .await
          .map_err(Error::store)?;

        tracing::info!(
          changeset = %id,
          reverted = report.reverted.len(),
          failed = report.failures.len(),
          "rolled back changeset"
        );
        Ok(report)
      }

      _ => {
        self
          .expect_status(&changeset, &[
            ChangeSetStatus::Pending,
            ChangeSetStatus::Committed,
          ])
          .map(|_| RollbackReport::empty(id))
      }
    }
  }

  /// Move a terminal changeset into the archived bookkeeping state.
  pub async fn archive(&self, id: ChangeSetId) -> Result<()> {
    let terminal =
      [ChangeSetStatus::Committed, ChangeSetStatus::RolledBack];
    let changeset = self.load(id).await?;
    self.expect_status(&changeset, &terminal)?;

    self
      .store
      .transition_changeset(id, &terminal, ChangeSetStatus::Archived)
      .await
      .map_err(Error::store)?;

    tracing::info!(changeset = %id, "archived changeset");
    Ok(())
  }

  /// All changesets still pending, oldest first.
  ///
  /// After a crash this is the orphan listing: a pending changeset may have
  /// some member mutations already durably written. Reconciliation (resume,
  /// force-commit, or force-rollback) is an external decision; the manager
  /// makes no automatic choice.
  pub async fn pending(&self) -> Result<Vec<ChangeSet>> {
    self.store.pending_changesets().await.map_err(Error::store)
  }

  /// Changesets this manager created are served from the active registry;
  /// only foreign or already-terminal ones need a store read. The cached
  /// copy is authoritative for status and eligibility, which only the
  /// manager mutates; member lists are always read from the store.
  async fn load(&self, id: ChangeSetId) -> Result<ChangeSet> {
    let cached = self.active().get(&id).cloned();
    if let Some(changeset) = cached {
      return Ok(changeset);
    }

    self
      .store
      .get_changeset(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| NotFoundError::Changeset(id).into())
  }

  fn expect_status(
    &self,
    changeset: &ChangeSet,
    expected: &[ChangeSetStatus],
  ) -> Result<()> {
    if expected.contains(&changeset.status) {
      Ok(())
    } else {
      Err(
        StateError::InvalidStatus {
          changeset: changeset.changeset_id,
          status:    changeset.status,
          expected:  expected.to_vec(),
        }
        .into(),
      )
    }
  }
}
