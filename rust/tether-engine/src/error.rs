use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TetherEngineError {
    /// The engine could not realize the declared object
    #[error("Engine failed to realize '{name}': {reason}")]
    Realize {
        /// The declaration that failed
        name: String,
        /// The engine's failure report
        reason: String,
    },

    /// A declaration with the same name was already realized
    #[error("Declaration '{0}' was realized more than once")]
    DuplicateDeclaration(String),

    /// A declaration refers to one that was never declared
    #[error("Declaration '{name}' depends on undeclared '{dependency}'")]
    UnknownDependency {
        /// The dependent declaration
        name: String,
        /// The missing dependency
        dependency: String,
    },

    /// A realized object did not report an expected output
    #[error("Declaration '{name}' has no output '{key}'")]
    MissingOutput {
        /// The realized declaration
        name: String,
        /// The expected output key
        key: String,
    },
}

/// Why a deferred value could not be produced.
///
/// A [Rejection] always names the declaration that failed first (its
/// `origin`). Every declaration that depends on it rejects with the same
/// [Rejection], so a single failure is reported once, against the object
/// that actually failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{origin}: {reason}")]
pub struct Rejection {
    /// The declaration that could not be realized.
    pub origin: String,
    /// The underlying failure report.
    pub reason: String,
}

impl Rejection {
    /// Create a rejection attributed to `origin`.
    pub fn new(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<TetherEngineError> for Rejection {
    fn from(error: TetherEngineError) -> Self {
        let origin = match &error {
            TetherEngineError::Realize { name, .. }
            | TetherEngineError::DuplicateDeclaration(name)
            | TetherEngineError::UnknownDependency { name, .. }
            | TetherEngineError::MissingOutput { name, .. } => name.clone(),
        };
        Rejection::new(origin, error)
    }
}
