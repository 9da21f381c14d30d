use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tether_common::Deferred;
use tracing::{debug, error};

use crate::{Declaration, Engine, Outputs, Rejection, TetherEngineError};

/// The deferred outputs of a declared object.
pub type DeferredOutputs = Deferred<Outputs, Rejection>;

/// Conveniences for consuming [DeferredOutputs].
pub trait DeferredOutputsExt {
    /// A single output of the object, once it is realized. Rejects with
    /// [TetherEngineError::MissingOutput] if the engine did not report it.
    fn output(&self, key: &str) -> Deferred<String, Rejection>;

    /// Resolves once the object is realized.
    fn ready(&self) -> Deferred<(), Rejection>;
}

impl DeferredOutputsExt for DeferredOutputs {
    fn output(&self, key: &str) -> Deferred<String, Rejection> {
        let key = key.to_string();
        self.and_then(move |outputs| async move { Ok(outputs.require(&key)?) })
    }

    fn ready(&self) -> Deferred<(), Rejection> {
        self.apply(|_| ())
    }
}

/// Drives declarations through an [Engine].
///
/// Declaring an object returns immediately with its [DeferredOutputs]. The
/// object is realized in the background as soon as every declaration it
/// depends on has been realized, so independent chains progress
/// concurrently and a slow or failing chain never holds up an unrelated one.
///
/// Dependencies are looked up by name once a declaration's inputs are known,
/// so they must have been declared by then. A declaration whose dependency
/// rejected is never handed to the engine; it rejects with its dependency's
/// [Rejection].
///
/// ```rust
/// # use tether_engine::{Declaration, MemoryEngine, ResourceKind, Stack};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let stack = Stack::new(MemoryEngine::default());
///
/// stack.declare(Declaration::new(ResourceKind::AwsProvider, "aws-provider-111"));
/// let role = stack.declare(
///     Declaration::new(ResourceKind::AwsRole, "aws-iam-role-ci-svc@111")
///         .provider("aws-provider-111")
///         .input("account", "111")
///         .input("name", "ci-svc"),
/// );
///
/// let arn = role.apply(|outputs| outputs.get("arn").map(str::to_string));
/// assert_eq!(arn.await.unwrap().as_deref(), Some("arn:aws:iam::111:role/ci-svc"));
/// assert!(stack.settle().await.is_clean());
/// # }
/// ```
#[derive(Clone)]
pub struct Stack {
    engine: Arc<dyn Engine>,
    declared: Arc<Mutex<IndexMap<String, DeferredOutputs>>>,
    duplicates: Arc<Mutex<Vec<DeferredOutputs>>>,
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("declared", &self.declared.lock().len())
            .finish()
    }
}

impl Stack {
    /// Drive declarations through `engine`.
    pub fn new<E>(engine: E) -> Self
    where
        E: Engine + 'static,
    {
        Self {
            engine: Arc::new(engine),
            declared: Arc::default(),
            duplicates: Arc::default(),
        }
    }

    /// Declare an object whose inputs are known now.
    pub fn declare(&self, declaration: Declaration) -> DeferredOutputs {
        let name = declaration.name.clone();
        self.declare_deferred(name, Deferred::resolved(declaration))
    }

    /// Declare an object whose inputs depend on other deferred values.
    ///
    /// `name` must match the name of the declaration `declaration` resolves
    /// to; it is needed up front so that dependents can refer to the object
    /// before its inputs are known.
    pub fn declare_deferred(
        &self,
        name: impl Into<String>,
        declaration: Deferred<Declaration, Rejection>,
    ) -> DeferredOutputs {
        let name = name.into();
        let mut declared = self.declared.lock();

        if declared.contains_key(&name) {
            let rejected = DeferredOutputs::rejected(Rejection::from(
                TetherEngineError::DuplicateDeclaration(name),
            ));
            self.duplicates.lock().push(rejected.clone());
            return rejected;
        }

        let engine = self.engine.clone();
        let registry = self.declared.clone();
        let expected = name.clone();

        let outputs = declaration
            .and_then(move |declaration| async move {
                if declaration.name != expected {
                    return Err(Rejection::new(
                        expected,
                        format!("resolved to a declaration named '{}'", declaration.name),
                    ));
                }

                let mut dependencies = Vec::with_capacity(declaration.depends_on.len());
                for dependency in &declaration.depends_on {
                    let handle = registry.lock().get(dependency).cloned();
                    match handle {
                        Some(handle) => dependencies.push(handle),
                        None => {
                            return Err(Rejection::from(TetherEngineError::UnknownDependency {
                                name: declaration.name.clone(),
                                dependency: dependency.clone(),
                            }));
                        }
                    }
                }
                Deferred::all(dependencies).await?;

                match engine.realize(&declaration).await {
                    Ok(outputs) => {
                        debug!(name = %declaration.name, kind = %declaration.kind, "realized");
                        Ok(outputs)
                    }
                    Err(failure) => Err(Rejection::from(failure)),
                }
            })
            .spawn();

        declared.insert(name, outputs.clone());
        outputs
    }

    /// The deferred outputs of an already declared object.
    pub fn get(&self, name: &str) -> Option<DeferredOutputs> {
        self.declared.lock().get(name).cloned()
    }

    /// Names of every declared object, in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.declared.lock().keys().cloned().collect()
    }

    /// Wait for every declared object to be realized or rejected.
    ///
    /// Failures are reported once per failed object, together with the
    /// declarations that could not be realized because of it.
    pub async fn settle(&self) -> Settlement {
        let declared = self
            .declared
            .lock()
            .iter()
            .map(|(name, outputs)| (name.clone(), outputs.clone()))
            .collect::<Vec<_>>();
        let duplicates = self.duplicates.lock().clone();

        let mut settlement = Settlement::default();
        let mut failures: IndexMap<String, Failure> = IndexMap::new();

        for (name, outputs) in declared {
            match outputs.await {
                Ok(_) => settlement.realized.push(name),
                Err(rejection) => {
                    let failure =
                        failures
                            .entry(rejection.origin.clone())
                            .or_insert_with(|| Failure {
                                rejection: rejection.clone(),
                                blocked: Vec::new(),
                            });
                    if name != rejection.origin {
                        failure.blocked.push(name);
                    }
                }
            }
        }
        for duplicate in duplicates {
            if let Err(rejection) = duplicate.await {
                failures
                    .entry(rejection.origin.clone())
                    .or_insert_with(|| Failure {
                        rejection,
                        blocked: Vec::new(),
                    });
            }
        }

        for failure in failures.values() {
            error!(
                origin = %failure.rejection.origin,
                blocked = failure.blocked.len(),
                "{}",
                failure.rejection.reason
            );
        }
        settlement.failures = failures.into_values().collect();
        settlement
    }
}

/// The outcome of every declaration in a [Stack].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    /// Names of realized declarations.
    pub realized: Vec<String>,
    /// One entry per object that could not be realized.
    pub failures: Vec<Failure>,
}

impl Settlement {
    /// Whether every declaration was realized.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An object that could not be realized, and what it held up.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The engine's report, attributed to the failed object.
    pub rejection: Rejection,
    /// Declarations abandoned because they depended on the failed object.
    pub blocked: Vec<String>,
}
