//! [`HistoryReader`] — read-only reconstruction of version history.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use strata_core::{
  store::VersionStore,
  version::{PartitionId, RecordId, VersionRecord, VersionStats},
};

use crate::error::{Error, Result};

/// Pure reads over the version table; no side effects.
pub struct HistoryReader<S> {
  store: Arc<S>,
}

impl<S: VersionStore> HistoryReader<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Ordered history for one record, most-recent first, at most `limit`
  /// entries.
  pub async fn get_record_history(
    &self,
    table: &str,
    record_id: RecordId,
    limit: usize,
  ) -> Result<Vec<VersionRecord>> {
    self
      .store
      .record_history(table, record_id, limit)
      .await
      .map_err(Error::store)
  }

  /// All changes within a logical partition across tables, most-recent
  /// first, for audit and trend reporting. Time bounds are half-open
  /// `[from, to)`.
  pub async fn get_partition_changes(
    &self,
    partition_id: PartitionId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: usize,
  ) -> Result<Vec<VersionRecord>> {
    self
      .store
      .partition_changes(partition_id, from, to, limit)
      .await
      .map_err(Error::store)
  }

  /// Aggregate counts over the version log: totals, per-table breakdown,
  /// activity within the trailing `recent_window`, and the most-changed
  /// partitions (at most `top_partitions` of them).
  pub async fn statistics(
    &self,
    recent_window: Duration,
    top_partitions: usize,
  ) -> Result<VersionStats> {
    self
      .store
      .version_statistics(Utc::now() - recent_window, top_partitions)
      .await
      .map_err(Error::store)
  }
}
