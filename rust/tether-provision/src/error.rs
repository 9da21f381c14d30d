use tether_engine::TetherEngineError;
use tether_model::{Provider, ScopeId};
use thiserror::Error;

use crate::Stage;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TetherProvisionError {
    /// A scope was used before its provider handle was declared
    #[error("No {provider} provider handle was declared for scope '{scope}'")]
    MissingProviderHandle {
        /// The provider
        provider: Provider,
        /// The scope without a handle
        scope: ScopeId,
    },

    /// A (repository, provider) pair was moved out of stage order
    #[error("Cannot move {provider} provisioning of '{repository}' from {from} to {to}")]
    StageOrder {
        /// The repository
        repository: String,
        /// The provider
        provider: Provider,
        /// The stage the pair was in
        from: Stage,
        /// The requested stage
        to: Stage,
    },

    /// The execution engine reported a failure
    #[error(transparent)]
    Engine(#[from] TetherEngineError),

    /// The report could not be encoded
    #[error("Failed to encode report: {0}")]
    Report(String),
}
