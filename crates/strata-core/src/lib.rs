//! Core types and trait definitions for the Strata version-control subsystem.
//!
//! This crate is deliberately free of database dependencies. It defines the
//! domain types (version records, changesets, table configuration), the error
//! taxonomy, the content-fingerprint helper, and the [`store::VersionStore`]
//! trait that storage backends implement.

pub mod changeset;
pub mod error;
pub mod fingerprint;
pub mod registry;
pub mod store;
pub mod version;

pub use error::{
  ConfigurationError, NotFoundError, PreconditionError, StateError,
};
