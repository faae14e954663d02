//! Error type for `strata-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown discriminant: {0:?}")]
  UnknownDiscriminant(String),

  /// Table or field name that is not a plain SQL identifier. Identifiers come
  /// from the table registry and are interpolated into compensating
  /// statements, so they are checked before use.
  #[error("invalid SQL identifier: {0:?}")]
  InvalidIdentifier(String),

  #[error(transparent)]
  State(#[from] strata_core::StateError),

  #[error(transparent)]
  NotFound(#[from] strata_core::NotFoundError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
