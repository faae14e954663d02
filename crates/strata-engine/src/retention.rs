//! [`RetentionManager`] — reclaims space from old version records.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use strata_core::store::VersionStore;

use crate::error::{Error, Result};

/// Purges version records older than a horizon while guaranteeing every
/// record keeps its single most-recent version, so history is never empty
/// for a record that ever existed.
pub struct RetentionManager<S> {
  store: Arc<S>,
}

impl<S: VersionStore> RetentionManager<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Delete versions older than `horizon`; returns the number deleted.
  ///
  /// Idempotent: re-running with no intervening writes deletes nothing.
  pub async fn cleanup(&self, horizon: DateTime<Utc>) -> Result<u64> {
    let deleted = self
      .store
      .purge_versions_before(horizon)
      .await
      .map_err(Error::store)?;

    tracing::info!(deleted, horizon = %horizon, "retention sweep complete");
    Ok(deleted)
  }

  /// Scheduled-run form: purge everything older than `max_age`.
  ///
  /// Retention failures are never fatal to the write path — an error is
  /// logged and reported as zero deletions, and the next scheduled run
  /// retries.
  pub async fn sweep(&self, max_age: Duration) -> u64 {
    match self.cleanup(Utc::now() - max_age).await {
      Ok(deleted) => deleted,
      Err(error) => {
        tracing::error!(%error, "retention sweep failed; retrying next run");
        0
      }
    }
  }
}
