use std::path::PathBuf;

use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum TetherModelError {
    /// A configuration or repository file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// The file or directory that could not be read
        path: PathBuf,
        /// The underlying failure
        source: std::io::Error,
    },

    /// The stack configuration is not valid TOML or misses a field
    #[error("Invalid stack configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// A repository file is not a valid repository definition
    #[error("Invalid repository definition in {path}: {source}")]
    Repository {
        /// The offending file
        path: PathBuf,
        /// The parse failure
        source: serde_yaml::Error,
    },

    /// Two repository files define the same repository
    #[error("Repository '{0}' is defined more than once")]
    DuplicateRepository(String),
}
