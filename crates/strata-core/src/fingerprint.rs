//! Content fingerprints for version records.
//!
//! The fingerprint is a SHA-256 hash over a canonical JSON rendering of the
//! mutation. It is diagnostic tamper-evidence metadata only: the authoritative
//! identity of a version record is its store-assigned sequential id, and the
//! timestamp already makes records distinct.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::version::{ChangeKind, FieldMap, RecordId};

/// Compute the fingerprint for one mutation.
///
/// Canonical: `serde_json::Map` keeps keys sorted, so the same field values
/// in any insertion order produce the same hash.
pub fn content_hash(
  table: &str,
  record_id: RecordId,
  kind: ChangeKind,
  new_values: Option<&FieldMap>,
  changed_at: DateTime<Utc>,
) -> String {
  let canonical = serde_json::json!({
    "change_kind": kind,
    "new_values":  new_values,
    "record_id":   record_id,
    "table":       table,
    "timestamp":   changed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
  });

  let mut hasher = Sha256::new();
  hasher.update(canonical.to_string().as_bytes());
  hex::encode(hasher.finalize())
}
