use std::sync::Arc;

use serde_json::{Map, Value, json};
use tether_engine::Stack;
use tether_model::{RepositoryCatalog, RepositoryDescriptor, StackConfig};

use crate::{Federations, StageTracker};

/// Everything a provisioning run shares between its pipelines.
///
/// Configuration and catalog are read-only for the whole run. The
/// [Federations] cache and the [StageTracker] are shared by reference, so
/// clones of a [Context] observe the same trusts and the same progress.
#[derive(Debug, Clone)]
pub struct Context {
    /// Stack configuration.
    pub config: Arc<StackConfig>,
    /// Repository definitions.
    pub catalog: Arc<RepositoryCatalog>,
    /// Where declarations go.
    pub stack: Stack,
    /// Memoized federation trusts.
    pub federations: Federations,
    /// Per (repository, provider) progress.
    pub stages: StageTracker,
}

impl Context {
    /// A fresh run over `config` and `catalog`, declaring into `stack`.
    pub fn new(config: StackConfig, catalog: RepositoryCatalog, stack: Stack) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            stack,
            federations: Federations::default(),
            stages: StageTracker::default(),
        }
    }

    /// The repository owner.
    pub fn owner(&self) -> &str {
        &self.config.repositories.owner
    }

    /// The stack environment.
    pub fn environment(&self) -> &str {
        &self.config.environment
    }

    /// A repository definition by name.
    pub fn repository(&self, name: &str) -> Option<&RepositoryDescriptor> {
        self.catalog.get(name)
    }

    /// Labels attached to taggable objects.
    pub fn labels(&self, purpose: &str, repository: Option<&str>) -> Value {
        let mut labels = Map::new();
        labels.insert("environment".into(), json!(self.environment()));
        labels.insert("purpose".into(), json!(purpose));
        if let Some(repository) = repository {
            labels.insert("repository".into(), json!(repository));
        }
        Value::Object(labels)
    }
}
