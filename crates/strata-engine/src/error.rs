//! Error type for `strata-engine`.
//!
//! Wraps the core taxonomy so callers can match on the failure classes
//! `strata-core::error` defines. Backend failures cross the generic seam
//! boxed.

use strata_core::{
  ConfigurationError, NotFoundError, PreconditionError, StateError,
  changeset::ChangeSetId,
};
use thiserror::Error;

use crate::rollback::RollbackFailure;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error(transparent)]
  Precondition(#[from] PreconditionError),

  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  NotFound(#[from] NotFoundError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Some inversions of a rollback failed.
///
/// This is never raised by the engine — partial rollback is an expected
/// degraded outcome reported through [`crate::rollback::RollbackReport`].
/// Callers that prefer a `Result` obtain this via `RollbackReport::into_result`
/// and must treat it as requiring manual intervention, never as silent
/// success.
#[derive(Debug, Error)]
#[error(
  "rollback of changeset {changeset_id} reverted {reverted} of {attempted} \
   changes"
)]
pub struct PartialRollbackError {
  pub changeset_id: ChangeSetId,
  pub reverted:     usize,
  pub attempted:    usize,
  pub failures:     Vec<RollbackFailure>,
}
