//! [`SqliteStore`] — the SQLite implementation of [`VersionStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use strata_core::{
  NotFoundError, StateError,
  changeset::{ChangeSet, ChangeSetId, ChangeSetStatus},
  store::VersionStore,
  version::{
    FieldMap, PartitionId, RecordId, VersionId, VersionRecord, VersionStats,
  },
};

use crate::{
  Error, Result,
  encode::{
    RawChangeSet, VERSION_COLUMNS, check_identifier, decode_status, encode_dt,
    encode_field_map, encode_fields, encode_kind, encode_scope, encode_status,
    encode_uuid, json_to_sql, raw_version_from_row, sql_to_json,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Strata version store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run arbitrary statements against the backing database.
  ///
  /// This is the statement-execution surface mutation producers use for their
  /// physical writes (and tests use for DDL); the subsystem itself performs
  /// no change-data-capture, so ordering between a physical write and the
  /// corresponding `track` call is the caller's responsibility.
  pub async fn execute_batch(&self, sql: &str) -> Result<()> {
    let sql = sql.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read one row of a caller's domain table as a field map.
  /// Returns `None` if no row matches the primary key.
  pub async fn get_row(
    &self,
    table: &str,
    pk_field: &str,
    record_id: RecordId,
  ) -> Result<Option<FieldMap>> {
    let table = check_identifier(table)?.to_owned();
    let pk_field = check_identifier(pk_field)?.to_owned();

    let row: Option<FieldMap> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT * FROM {table} WHERE {pk_field} = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
          .query_row(rusqlite::params![record_id], |row| {
            let mut map = FieldMap::new();
            for idx in 0..row.as_ref().column_count() {
              let name = row.as_ref().column_name(idx)?.to_owned();
              map.insert(name, sql_to_json(row.get_ref(idx)?));
            }
            Ok(map)
          })
          .optional()?;
        Ok(row)
      })
      .await?;

    Ok(row)
  }

  /// Member version ids of a changeset in append order. Version ids are
  /// monotonic and appends to one changeset are serialised, so id order is
  /// call order.
  async fn member_ids(&self, id: ChangeSetId) -> Result<Vec<VersionId>> {
    let id_str = encode_uuid(id);

    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id FROM data_versions
           WHERE changeset_id = ?1 ORDER BY version_id ASC",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![id_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
      })
      .await?;

    Ok(ids)
  }
}

// ─── VersionStore impl ───────────────────────────────────────────────────────

/// Result of the gated append closure. The changeset gate and the insert run
/// as one serialized unit on the connection thread, so the gate's verdict
/// crosses back out as data rather than as an error raised mid-closure.
enum AppendOutcome {
  Inserted {
    version_id: VersionId,
    parent:     Option<VersionId>,
  },
  ChangesetMissing(ChangeSetId),
  ChangesetNotPending(ChangeSetId, String),
}

impl VersionStore for SqliteStore {
  type Error = Error;

  // ── Version records ───────────────────────────────────────────────────────

  async fn append_version(&self, record: VersionRecord) -> Result<VersionRecord> {
    let table_name   = record.table_name.clone();
    let record_id    = record.record_id;
    let partition_id = record.partition_id;
    let cs_uuid      = record.changeset_id;
    let kind_str     = encode_kind(record.kind).to_owned();
    let old_values   = record
      .old_values
      .as_ref()
      .map(encode_field_map)
      .transpose()?;
    let new_values   = record
      .new_values
      .as_ref()
      .map(encode_field_map)
      .transpose()?;
    let fields_str   = encode_fields(&record.changed_fields)?;
    let at_str       = encode_dt(record.changed_at);
    let actor        = record.actor.clone();
    let reason       = record.reason.clone();
    let hash         = record.content_hash.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        let changeset_id = cs_uuid.map(encode_uuid);

        // Appends into a changeset are only legal while it is pending. The
        // gate runs in the same closure as the insert: a concurrent
        // transition cannot slip between check and write.
        if let Some(id) = cs_uuid {
          let status: Option<String> = conn
            .query_row(
              "SELECT status FROM changesets WHERE changeset_id = ?1",
              rusqlite::params![changeset_id.as_deref()],
              |r| r.get(0),
            )
            .optional()?;
          match status {
            None => return Ok(AppendOutcome::ChangesetMissing(id)),
            Some(s) if s != "pending" => {
              return Ok(AppendOutcome::ChangesetNotPending(id, s));
            }
            Some(_) => {}
          }
        }

        // The previous latest version of this record, if any, becomes the
        // parent and loses its is_active flag.
        let parent: Option<i64> = conn
          .query_row(
            "SELECT version_id FROM data_versions
             WHERE table_name = ?1 AND record_id = ?2
             ORDER BY version_id DESC LIMIT 1",
            rusqlite::params![table_name, record_id],
            |r| r.get(0),
          )
          .optional()?;

        if let Some(p) = parent {
          conn.execute(
            "UPDATE data_versions SET is_active = 0 WHERE version_id = ?1",
            rusqlite::params![p],
          )?;
        }

        conn.execute(
          "INSERT INTO data_versions (
             table_name, record_id, partition_id, changeset_id, change_kind,
             old_values, new_values, changed_fields, changed_at, actor,
             reason, content_hash, is_active, parent_version_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13)",
          rusqlite::params![
            table_name,
            record_id,
            partition_id,
            changeset_id,
            kind_str,
            old_values,
            new_values,
            fields_str,
            at_str,
            actor,
            reason,
            hash,
            parent,
          ],
        )?;

        Ok(AppendOutcome::Inserted {
          version_id: conn.last_insert_rowid(),
          parent,
        })
      })
      .await?;

    match outcome {
      AppendOutcome::Inserted { version_id, parent } => {
        let mut stored = record;
        stored.version_id = version_id;
        stored.parent_version_id = parent;
        stored.is_active = true;
        Ok(stored)
      }
      AppendOutcome::ChangesetMissing(id) => {
        Err(NotFoundError::Changeset(id).into())
      }
      AppendOutcome::ChangesetNotPending(id, status) => Err(
        StateError::InvalidStatus {
          changeset: id,
          status:    decode_status(&status)?,
          expected:  vec![ChangeSetStatus::Pending],
        }
        .into(),
      ),
    }
  }

  async fn get_version(&self, id: VersionId) -> Result<Option<VersionRecord>> {
    let raw = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {VERSION_COLUMNS} FROM data_versions WHERE version_id = ?1"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], raw_version_from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(|r| r.into_version()).transpose()
  }

  async fn record_history(
    &self,
    table: &str,
    record_id: RecordId,
    limit: usize,
  ) -> Result<Vec<VersionRecord>> {
    let table = table.to_owned();
    let limit = limit as i64;

    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {VERSION_COLUMNS} FROM data_versions
           WHERE table_name = ?1 AND record_id = ?2
           ORDER BY changed_at DESC, version_id DESC
           LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![table, record_id, limit],
            raw_version_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_version()).collect()
  }

  async fn partition_changes(
    &self,
    partition_id: PartitionId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: usize,
  ) -> Result<Vec<VersionRecord>> {
    let from_str = from.map(encode_dt);
    let to_str   = to.map(encode_dt);
    let limit    = limit as i64;

    let raws = self
      .conn
      .call(move |conn| {
        // Half-open window: [from, to).
        let mut sql = format!(
          "SELECT {VERSION_COLUMNS} FROM data_versions WHERE partition_id = ?1"
        );
        if from_str.is_some() {
          sql.push_str(" AND changed_at >= ?2");
        }
        if to_str.is_some() {
          sql.push_str(" AND changed_at < ?3");
        }
        sql.push_str(" ORDER BY changed_at DESC, version_id DESC LIMIT ?4");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              partition_id,
              from_str.as_deref(),
              to_str.as_deref(),
              limit,
            ],
            raw_version_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_version()).collect()
  }

  // ── Changesets ────────────────────────────────────────────────────────────

  async fn insert_changeset(&self, changeset: &ChangeSet) -> Result<()> {
    let id_str      = encode_uuid(changeset.changeset_id);
    let description = changeset.description.clone();
    let at_str      = encode_dt(changeset.created_at);
    let scope_str   = encode_scope(&changeset.partition_scope)?;
    let status_str  = encode_status(changeset.status).to_owned();
    let eligible    = changeset.rollback_eligible;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO changesets (
             changeset_id, description, created_at, partition_scope,
             status, rollback_eligible
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id_str,
            description,
            at_str,
            scope_str,
            status_str,
            eligible,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_changeset(&self, id: ChangeSetId) -> Result<Option<ChangeSet>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawChangeSet> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT changeset_id, description, created_at, partition_scope,
                      status, rollback_eligible
               FROM changesets WHERE changeset_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawChangeSet {
                  changeset_id:      row.get(0)?,
                  description:       row.get(1)?,
                  created_at:        row.get(2)?,
                  partition_scope:   row.get(3)?,
                  status:            row.get(4)?,
                  rollback_eligible: row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    match raw {
      None => Ok(None),
      Some(raw) => {
        let members = self.member_ids(id).await?;
        Ok(Some(raw.into_changeset(members)?))
      }
    }
  }

  async fn transition_changeset(
    &self,
    id: ChangeSetId,
    expected: &[ChangeSetStatus],
    to: ChangeSetStatus,
  ) -> Result<()> {
    let id_str = encode_uuid(id);
    let to_str = encode_status(to).to_owned();
    let expected_strs: Vec<String> = expected
      .iter()
      .map(|s| encode_status(*s).to_owned())
      .collect();
    let expected_owned = expected.to_vec();

    let (affected, current): (usize, Option<String>) = self
      .conn
      .call(move |conn| {
        let placeholders = (0..expected_strs.len())
          .map(|i| format!("?{}", i + 3))
          .collect::<Vec<_>>()
          .join(", ");
        let sql = format!(
          "UPDATE changesets SET status = ?1
           WHERE changeset_id = ?2 AND status IN ({placeholders})"
        );

        let mut params: Vec<rusqlite::types::Value> = vec![
          rusqlite::types::Value::Text(to_str),
          rusqlite::types::Value::Text(id_str.clone()),
        ];
        params.extend(
          expected_strs
            .into_iter()
            .map(rusqlite::types::Value::Text),
        );

        let affected =
          conn.execute(&sql, rusqlite::params_from_iter(params))?;

        let current: Option<String> = if affected == 0 {
          conn
            .query_row(
              "SELECT status FROM changesets WHERE changeset_id = ?1",
              rusqlite::params![id_str],
              |r| r.get(0),
            )
            .optional()?
        } else {
          None
        };

        Ok((affected, current))
      })
      .await?;

    if affected > 0 {
      return Ok(());
    }
    match current {
      None => Err(NotFoundError::Changeset(id).into()),
      Some(status_str) => Err(
        StateError::InvalidStatus {
          changeset: id,
          status:    decode_status(&status_str)?,
          expected:  expected_owned,
        }
        .into(),
      ),
    }
  }

  async fn pending_changesets(&self) -> Result<Vec<ChangeSet>> {
    let raws: Vec<RawChangeSet> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT changeset_id, description, created_at, partition_scope,
                  status, rollback_eligible
           FROM changesets WHERE status = 'pending'
           ORDER BY created_at ASC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawChangeSet {
              changeset_id:      row.get(0)?,
              description:       row.get(1)?,
              created_at:        row.get(2)?,
              partition_scope:   row.get(3)?,
              status:            row.get(4)?,
              rollback_eligible: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut changesets = Vec::with_capacity(raws.len());
    for raw in raws {
      let id = crate::encode::decode_uuid(&raw.changeset_id)?;
      let members = self.member_ids(id).await?;
      changesets.push(raw.into_changeset(members)?);
    }
    Ok(changesets)
  }

  async fn changeset_members(
    &self,
    id: ChangeSetId,
  ) -> Result<Vec<VersionRecord>> {
    let id_str = encode_uuid(id);

    let raws = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {VERSION_COLUMNS} FROM data_versions
           WHERE changeset_id = ?1 ORDER BY version_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], raw_version_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|r| r.into_version()).collect()
  }

  // ── Row mutations ─────────────────────────────────────────────────────────

  async fn insert_row(&self, table: &str, values: &FieldMap) -> Result<u64> {
    let table = check_identifier(table)?.to_owned();
    let mut fields = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());
    for (field, value) in values {
      fields.push(check_identifier(field)?.to_owned());
      params.push(json_to_sql(value));
    }

    let affected = self
      .conn
      .call(move |conn| {
        let placeholders = (0..fields.len())
          .map(|i| format!("?{}", i + 1))
          .collect::<Vec<_>>()
          .join(", ");
        let sql = format!(
          "INSERT INTO {table} ({}) VALUES ({placeholders})",
          fields.join(", ")
        );
        Ok(conn.execute(&sql, rusqlite::params_from_iter(params))?)
      })
      .await?;

    Ok(affected as u64)
  }

  async fn update_row(
    &self,
    table: &str,
    pk_field: &str,
    record_id: RecordId,
    values: &FieldMap,
  ) -> Result<u64> {
    let table = check_identifier(table)?.to_owned();
    let pk_field = check_identifier(pk_field)?.to_owned();
    let mut fields = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len() + 1);
    for (field, value) in values {
      fields.push(check_identifier(field)?.to_owned());
      params.push(json_to_sql(value));
    }
    params.push(rusqlite::types::Value::Integer(record_id));

    let affected = self
      .conn
      .call(move |conn| {
        let assignments = fields
          .iter()
          .enumerate()
          .map(|(i, f)| format!("{f} = ?{}", i + 1))
          .collect::<Vec<_>>()
          .join(", ");
        let sql = format!(
          "UPDATE {table} SET {assignments} WHERE {pk_field} = ?{}",
          fields.len() + 1
        );
        Ok(conn.execute(&sql, rusqlite::params_from_iter(params))?)
      })
      .await?;

    Ok(affected as u64)
  }

  async fn delete_row(
    &self,
    table: &str,
    pk_field: &str,
    record_id: RecordId,
  ) -> Result<u64> {
    let table = check_identifier(table)?.to_owned();
    let pk_field = check_identifier(pk_field)?.to_owned();

    let affected = self
      .conn
      .call(move |conn| {
        let sql = format!("DELETE FROM {table} WHERE {pk_field} = ?1");
        Ok(conn.execute(&sql, rusqlite::params![record_id])?)
      })
      .await?;

    Ok(affected as u64)
  }

  // ── Statistics ────────────────────────────────────────────────────────────

  async fn version_statistics(
    &self,
    recent_since: DateTime<Utc>,
    top_limit: usize,
  ) -> Result<VersionStats> {
    let since_str = encode_dt(recent_since);
    let top_limit = top_limit as i64;

    let stats = self
      .conn
      .call(move |conn| {
        let total: i64 =
          conn.query_row("SELECT COUNT(*) FROM data_versions", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
          "SELECT table_name, COUNT(*) FROM data_versions
           GROUP BY table_name
           ORDER BY COUNT(*) DESC, table_name ASC",
        )?;
        let table_counts = stmt
          .query_map([], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let recent: i64 = conn.query_row(
          "SELECT COUNT(*) FROM data_versions WHERE changed_at >= ?1",
          rusqlite::params![since_str],
          |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
          "SELECT partition_id, COUNT(*) FROM data_versions
           WHERE partition_id IS NOT NULL
           GROUP BY partition_id
           ORDER BY COUNT(*) DESC, partition_id ASC
           LIMIT ?1",
        )?;
        let top_partitions = stmt
          .query_map(rusqlite::params![top_limit], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)? as u64))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(VersionStats {
          total_versions: total as u64,
          table_counts,
          recent_versions: recent as u64,
          top_partitions,
        })
      })
      .await?;

    Ok(stats)
  }

  // ── Retention ─────────────────────────────────────────────────────────────

  async fn purge_versions_before(&self, horizon: DateTime<Utc>) -> Result<u64> {
    let horizon_str = encode_dt(horizon);

    let deleted = self
      .conn
      .call(move |conn| {
        // The most recent version of every record survives regardless of
        // age, so history is never empty for a record that ever existed.
        let deleted = conn.execute(
          "DELETE FROM data_versions
           WHERE changed_at < ?1
             AND version_id NOT IN (
               SELECT MAX(version_id) FROM data_versions
               GROUP BY table_name, record_id
             )",
          rusqlite::params![horizon_str],
        )?;
        Ok(deleted)
      })
      .await?;

    Ok(deleted as u64)
  }
}
