//! SQL schema for the Strata SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS changesets (
    changeset_id      TEXT PRIMARY KEY,
    description       TEXT NOT NULL,
    created_at        TEXT NOT NULL,    -- fixed-width RFC 3339 UTC
    partition_scope   TEXT NOT NULL DEFAULT '[]',
    status            TEXT NOT NULL DEFAULT 'pending',
    rollback_eligible INTEGER NOT NULL DEFAULT 1
);

-- One row per observed mutation. Rows are append-only: after creation the
-- only column ever updated is is_active, and rows are deleted only by the
-- retention sweep.
CREATE TABLE IF NOT EXISTS data_versions (
    version_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name        TEXT NOT NULL,
    record_id         INTEGER NOT NULL,
    partition_id      INTEGER,
    changeset_id      TEXT REFERENCES changesets(changeset_id),
    change_kind       TEXT NOT NULL,    -- discriminant of ChangeKind
    old_values        TEXT,             -- JSON field map or NULL
    new_values        TEXT,             -- JSON field map or NULL
    changed_fields    TEXT NOT NULL,    -- JSON array of field names
    changed_at        TEXT NOT NULL,    -- fixed-width RFC 3339 UTC
    actor             TEXT NOT NULL,
    reason            TEXT,
    content_hash      TEXT NOT NULL,    -- diagnostic fingerprint, not a key
    is_active         INTEGER NOT NULL DEFAULT 1,
    parent_version_id INTEGER REFERENCES data_versions(version_id)
);

CREATE INDEX IF NOT EXISTS versions_record_idx
    ON data_versions(table_name, record_id);
CREATE INDEX IF NOT EXISTS versions_partition_idx
    ON data_versions(partition_id);
CREATE INDEX IF NOT EXISTS versions_changeset_idx
    ON data_versions(changeset_id);
CREATE INDEX IF NOT EXISTS versions_changed_at_idx
    ON data_versions(changed_at);

PRAGMA user_version = 1;
";
