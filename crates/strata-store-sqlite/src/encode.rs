//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so lexicographic ordering in SQL equals
//! chronological ordering. Structured fields (field maps, changed-field
//! lists, partition scopes) are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use strata_core::{
  changeset::{ChangeSet, ChangeSetStatus},
  version::{ChangeKind, FieldMap, PartitionId, VersionId, VersionRecord},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── ChangeKind ──────────────────────────────────────────────────────────────

pub fn encode_kind(k: ChangeKind) -> &'static str {
  match k {
    ChangeKind::Insert => "insert",
    ChangeKind::Update => "update",
    ChangeKind::Delete => "delete",
    ChangeKind::BulkInsert => "bulk_insert",
    ChangeKind::BulkUpdate => "bulk_update",
    ChangeKind::SchemaChange => "schema_change",
  }
}

pub fn decode_kind(s: &str) -> Result<ChangeKind> {
  match s {
    "insert" => Ok(ChangeKind::Insert),
    "update" => Ok(ChangeKind::Update),
    "delete" => Ok(ChangeKind::Delete),
    "bulk_insert" => Ok(ChangeKind::BulkInsert),
    "bulk_update" => Ok(ChangeKind::BulkUpdate),
    "schema_change" => Ok(ChangeKind::SchemaChange),
    other => Err(Error::UnknownDiscriminant(other.to_owned())),
  }
}

// ─── ChangeSetStatus ─────────────────────────────────────────────────────────

pub fn encode_status(s: ChangeSetStatus) -> &'static str {
  match s {
    ChangeSetStatus::Pending => "pending",
    ChangeSetStatus::Committed => "committed",
    ChangeSetStatus::RolledBack => "rolled_back",
    ChangeSetStatus::Archived => "archived",
  }
}

pub fn decode_status(s: &str) -> Result<ChangeSetStatus> {
  match s {
    "pending" => Ok(ChangeSetStatus::Pending),
    "committed" => Ok(ChangeSetStatus::Committed),
    "rolled_back" => Ok(ChangeSetStatus::RolledBack),
    "archived" => Ok(ChangeSetStatus::Archived),
    other => Err(Error::UnknownDiscriminant(other.to_owned())),
  }
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_field_map(m: &FieldMap) -> Result<String> {
  Ok(serde_json::to_string(m)?)
}

pub fn decode_field_map(s: &str) -> Result<FieldMap> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_fields(fields: &[String]) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_scope(scope: &[PartitionId]) -> Result<String> {
  Ok(serde_json::to_string(scope)?)
}

pub fn decode_scope(s: &str) -> Result<Vec<PartitionId>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Table and field names from the registry are interpolated into compensating
/// statements; only plain identifiers are allowed through.
pub fn check_identifier(name: &str) -> Result<&str> {
  let mut chars = name.chars();
  let head_ok = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
  if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
    Ok(name)
  } else {
    Err(Error::InvalidIdentifier(name.to_owned()))
  }
}

// ─── JSON ↔ SQL values ───────────────────────────────────────────────────────

/// Convert a captured field value into a SQLite value for binding into a
/// compensating statement. Nested structures are stored as JSON text.
pub fn json_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
  use rusqlite::types::Value as Sql;

  match value {
    serde_json::Value::Null => Sql::Null,
    serde_json::Value::Bool(b) => Sql::Integer(i64::from(*b)),
    serde_json::Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        Sql::Integer(i)
      } else {
        Sql::Real(n.as_f64().unwrap_or(f64::NAN))
      }
    }
    serde_json::Value::String(s) => Sql::Text(s.clone()),
    nested => Sql::Text(nested.to_string()),
  }
}

/// Convert a SQLite column value back into JSON, for reading rows out of the
/// caller's domain tables.
pub fn sql_to_json(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
  use rusqlite::types::ValueRef;

  match value {
    ValueRef::Null => serde_json::Value::Null,
    ValueRef::Integer(i) => serde_json::Value::from(i),
    ValueRef::Real(f) => serde_json::Value::from(f),
    ValueRef::Text(t) => {
      serde_json::Value::String(String::from_utf8_lossy(t).into_owned())
    }
    ValueRef::Blob(b) => serde_json::Value::String(format!("{b:02x?}")),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `data_versions` row.
pub struct RawVersion {
  pub version_id:        VersionId,
  pub table_name:        String,
  pub record_id:         i64,
  pub partition_id:      Option<i64>,
  pub changeset_id:      Option<String>,
  pub change_kind:       String,
  pub old_values:        Option<String>,
  pub new_values:        Option<String>,
  pub changed_fields:    String,
  pub changed_at:        String,
  pub actor:             String,
  pub reason:            Option<String>,
  pub content_hash:      String,
  pub is_active:         bool,
  pub parent_version_id: Option<VersionId>,
}

impl RawVersion {
  pub fn into_version(self) -> Result<VersionRecord> {
    Ok(VersionRecord {
      version_id:        self.version_id,
      table_name:        self.table_name,
      record_id:         self.record_id,
      partition_id:      self.partition_id,
      changeset_id:      self
        .changeset_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      kind:              decode_kind(&self.change_kind)?,
      old_values:        self
        .old_values
        .as_deref()
        .map(decode_field_map)
        .transpose()?,
      new_values:        self
        .new_values
        .as_deref()
        .map(decode_field_map)
        .transpose()?,
      changed_fields:    decode_fields(&self.changed_fields)?,
      changed_at:        decode_dt(&self.changed_at)?,
      actor:             self.actor,
      reason:            self.reason,
      content_hash:      self.content_hash,
      is_active:         self.is_active,
      parent_version_id: self.parent_version_id,
    })
  }
}

/// Raw strings read directly from a `changesets` row.
pub struct RawChangeSet {
  pub changeset_id:      String,
  pub description:       String,
  pub created_at:        String,
  pub partition_scope:   String,
  pub status:            String,
  pub rollback_eligible: bool,
}

impl RawChangeSet {
  /// `members` is loaded separately from the `data_versions` table.
  pub fn into_changeset(self, members: Vec<VersionId>) -> Result<ChangeSet> {
    Ok(ChangeSet {
      changeset_id: decode_uuid(&self.changeset_id)?,
      description: self.description,
      created_at: decode_dt(&self.created_at)?,
      partition_scope: decode_scope(&self.partition_scope)?,
      status: decode_status(&self.status)?,
      rollback_eligible: self.rollback_eligible,
      members,
    })
  }
}

/// Shorthand used by the store's SELECT statements.
pub const VERSION_COLUMNS: &str = "version_id, table_name, record_id, \
   partition_id, changeset_id, change_kind, old_values, new_values, \
   changed_fields, changed_at, actor, reason, content_hash, is_active, \
   parent_version_id";

/// Map one row of [`VERSION_COLUMNS`] into a [`RawVersion`].
pub fn raw_version_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersion> {
  Ok(RawVersion {
    version_id:        row.get(0)?,
    table_name:        row.get(1)?,
    record_id:         row.get(2)?,
    partition_id:      row.get(3)?,
    changeset_id:      row.get(4)?,
    change_kind:       row.get(5)?,
    old_values:        row.get(6)?,
    new_values:        row.get(7)?,
    changed_fields:    row.get(8)?,
    changed_at:        row.get(9)?,
    actor:             row.get(10)?,
    reason:            row.get(11)?,
    content_hash:      row.get(12)?,
    is_active:         row.get(13)?,
    parent_version_id: row.get(14)?,
  })
}
