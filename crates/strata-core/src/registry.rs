//! Static configuration of the versioned tables.
//!
//! Loaded once at startup and read-only thereafter. The registry is an
//! explicitly constructed, injected object — there is no global table list —
//! so independent subsystem instances (e.g. under test) never share state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

// ─── TableConfig ─────────────────────────────────────────────────────────────

/// Versioning configuration for one table.
///
/// Serde-derivable so embedding applications can load configs from their own
/// configuration source (TOML file, environment layer, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
  pub table_name:      String,
  /// The primary-key field used to address rows in compensating statements.
  pub primary_key:     String,
  /// The fields considered when computing changed-field sets.
  pub tracked_fields:  Vec<String>,
  /// Fields never diffed or restored — typically auto-maintained timestamps.
  #[serde(default)]
  pub excluded_fields: Vec<String>,
}

impl TableConfig {
  /// Whether `field` participates in diffing: tracked and not excluded.
  pub fn is_tracked(&self, field: &str) -> bool {
    self.tracked_fields.iter().any(|f| f == field)
      && !self.excluded_fields.iter().any(|f| f == field)
  }
}

// ─── TableRegistry ───────────────────────────────────────────────────────────

/// The set of versioned tables, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
  tables: HashMap<String, TableConfig>,
}

impl TableRegistry {
  pub fn new(configs: impl IntoIterator<Item = TableConfig>) -> Self {
    let tables = configs
      .into_iter()
      .map(|c| (c.table_name.clone(), c))
      .collect();
    Self { tables }
  }

  /// Look up the config for `table`, failing if the table is unknown or its
  /// primary-key field is blank.
  pub fn get(&self, table: &str) -> Result<&TableConfig, ConfigurationError> {
    let config = self
      .tables
      .get(table)
      .ok_or_else(|| ConfigurationError::UnknownTable(table.to_owned()))?;
    if config.primary_key.is_empty() {
      return Err(ConfigurationError::MissingPrimaryKey(table.to_owned()));
    }
    Ok(config)
  }

  pub fn contains(&self, table: &str) -> bool { self.tables.contains_key(table) }

  /// Names of all registered tables, in no particular order.
  pub fn tables(&self) -> impl Iterator<Item = &str> {
    self.tables.keys().map(String::as_str)
  }
}
