//! Inputs to a provisioning run.
//!
//! A run reads two things, both read-only for its whole duration:
//!
//! - a [StackConfig], describing the fleet: which scopes each cloud allows
//!   (see [ScopeRegistry]), how secret stores are reached, and who owns the
//!   repositories;
//! - a [RepositoryCatalog] of [RepositoryDescriptor]s, one per repository,
//!   each declaring the access it wants.
//!
//! Every optional field has a documented default in [defaults].

mod error;
pub use error::*;

pub mod defaults;

mod scope;
pub use scope::*;

mod registry;
pub use registry::*;

mod repository;
pub use repository::*;

mod config;
pub use config::*;

mod catalog;
pub use catalog::*;
