use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::{Declaration, Engine, Outputs, ResourceKind, TetherEngineError};

/// A trivial implementation of [Engine] that realizes nothing and records
/// everything.
///
/// Outputs are synthesized deterministically from each declaration (an ARN
/// from the account and role name, a service account email from the project
/// and account id, and so on), so a plan produced against a [MemoryEngine]
/// looks like the one a real engine would report. Specific declarations can
/// be made to fail with [MemoryEngine::failing].
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<RwLock<MemoryEngineState>>,
}

#[derive(Default)]
struct MemoryEngineState {
    realized: IndexMap<String, Declaration>,
    failing: HashMap<String, String>,
}

impl MemoryEngine {
    /// Make realization of the named declaration fail with `reason`.
    pub fn failing(self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.state.write().failing.insert(name.into(), reason.into());
        self
    }

    /// Every realized declaration, in realization order.
    pub fn declarations(&self) -> Vec<Declaration> {
        self.state.read().realized.values().cloned().collect()
    }

    /// A realized declaration by name.
    pub fn get(&self, name: &str) -> Option<Declaration> {
        self.state.read().realized.get(name).cloned()
    }

    /// Realized declarations of one kind, in realization order.
    pub fn of_kind(&self, kind: ResourceKind) -> Vec<Declaration> {
        self.state
            .read()
            .realized
            .values()
            .filter(|declaration| declaration.kind == kind)
            .cloned()
            .collect()
    }

    /// Realized declaration names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .state
            .read()
            .realized
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// The number of realized declarations.
    pub fn len(&self) -> usize {
        self.state.read().realized.len()
    }

    /// Whether nothing was realized.
    pub fn is_empty(&self) -> bool {
        self.state.read().realized.is_empty()
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("realized", &self.len())
            .finish()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn realize(&self, declaration: &Declaration) -> Result<Outputs, TetherEngineError> {
        let mut state = self.state.write();

        if let Some(reason) = state.failing.get(&declaration.name) {
            return Err(TetherEngineError::Realize {
                name: declaration.name.clone(),
                reason: reason.clone(),
            });
        }
        if state.realized.contains_key(&declaration.name) {
            return Err(TetherEngineError::DuplicateDeclaration(
                declaration.name.clone(),
            ));
        }
        if let Some(dependency) = declaration
            .depends_on
            .iter()
            .find(|dependency| !state.realized.contains_key(*dependency))
        {
            return Err(TetherEngineError::UnknownDependency {
                name: declaration.name.clone(),
                dependency: dependency.clone(),
            });
        }

        state
            .realized
            .insert(declaration.name.clone(), declaration.clone());

        Ok(synthesize(declaration))
    }
}

fn synthesize(declaration: &Declaration) -> Outputs {
    let input = |key: &str| declaration.input_str(key).unwrap_or_default().to_string();

    let outputs = declaration
        .inputs
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(value) => Some((key, value)),
            _ => None,
        })
        .fold(
            Outputs::new(&declaration.name).with("id", &declaration.name),
            |outputs, (key, value)| outputs.with(key, value),
        );

    match declaration.kind {
        ResourceKind::AwsOidcProvider => {
            let url = input("url");
            let host = url.trim_start_matches("https://");
            outputs.with(
                "arn",
                format!("arn:aws:iam::{}:oidc-provider/{host}", input("account")),
            )
        }
        ResourceKind::AwsRole => outputs.with(
            "arn",
            format!("arn:aws:iam::{}:role/{}", input("account"), input("name")),
        ),
        ResourceKind::AwsPolicy => outputs.with(
            "arn",
            format!("arn:aws:iam::{}:policy/{}", input("account"), input("name")),
        ),
        ResourceKind::GoogleWorkloadIdentityPool => outputs.with(
            "name",
            format!(
                "projects/{}/locations/global/workloadIdentityPools/{}",
                input("project"),
                input("workload_identity_pool_id")
            ),
        ),
        ResourceKind::GoogleWorkloadIdentityPoolProvider => outputs.with(
            "name",
            format!(
                "{}/providers/{}",
                input("workload_identity_pool"),
                input("workload_identity_pool_provider_id")
            ),
        ),
        ResourceKind::GoogleCustomRole => outputs.with(
            "id",
            format!("projects/{}/roles/{}", input("project"), input("role_id")),
        ),
        ResourceKind::GoogleServiceAccount => {
            let email = format!(
                "{}@{}.iam.gserviceaccount.com",
                input("account_id"),
                input("project")
            );
            outputs
                .with(
                    "name",
                    format!("projects/{}/serviceAccounts/{email}", input("project")),
                )
                .with("email", email)
        }
        ResourceKind::GoogleHmacKey => outputs
            .with(
                "access_id",
                format!(
                    "GOOG1{}",
                    fingerprint(&declaration.name, "access", 24).to_uppercase()
                ),
            )
            .with("secret", fingerprint(&declaration.name, "secret", 40)),
        ResourceKind::PulumiAccessToken => outputs.with(
            "value",
            format!("pul-{}", fingerprint(&declaration.name, "token", 40)),
        ),
        _ => outputs,
    }
}

fn fingerprint(name: &str, purpose: &str, length: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(purpose.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hex = hasher.finalize().to_hex();
    let hex = hex.as_str();
    hex[..length.min(hex.len())].to_string()
}
