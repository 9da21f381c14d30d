use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tether_common::{Deferred, OnceMap};
use tether_engine::{Declaration, DeferredOutputs, DeferredOutputsExt, Rejection, ResourceKind};
use tether_model::{Destination, Provider, RepositoryDescriptor};
use tracing::{info, warn};

use crate::{Context, Pipeline, naming};

/// Secret keys written by the credential distributor.
pub mod keys {
    #![allow(missing_docs)]

    pub const AWS_IDENTITY_ROLE_ARN: &str = "AWS_IDENTITY_ROLE_ARN";
    pub const AWS_REGION: &str = "AWS_REGION";

    pub const GOOGLE_WORKLOAD_IDENTITY_PROVIDER: &str = "GOOGLE_WORKLOAD_IDENTITY_PROVIDER";
    pub const GOOGLE_WORKLOAD_IDENTITY_SERVICE_ACCOUNT: &str =
        "GOOGLE_WORKLOAD_IDENTITY_SERVICE_ACCOUNT";
    pub const CLOUDSDK_COMPUTE_REGION: &str = "CLOUDSDK_COMPUTE_REGION";
    pub const GCS_ACCESS_KEY_ID: &str = "GCS_ACCESS_KEY_ID";
    pub const GCS_SECRET_ACCESS_KEY: &str = "GCS_SECRET_ACCESS_KEY";

    pub const PULUMI_ACCESS_TOKEN: &str = "PULUMI_ACCESS_TOKEN";

    pub const TS_OAUTH_CLIENT_ID: &str = "TS_OAUTH_CLIENT_ID";
    pub const TS_OAUTH_SECRET: &str = "TS_OAUTH_SECRET";

    pub const VAULT_ADDR: &str = "VAULT_ADDR";
    pub const VAULT_ROLE: &str = "VAULT_ROLE";
    pub const VAULT_PATH: &str = "VAULT_PATH";
}

/// Auth backend CI logs into the versioned KV store through.
pub const VAULT_AUTH_BACKEND: &str = "github";

/// Lifetime of tokens issued to CI by the versioned KV store, in seconds.
pub const VAULT_TOKEN_TTL: u64 = 60 * 60;

/// One piece of generated credential material, not necessarily known yet.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Secret key, e.g. [keys::AWS_REGION].
    pub key: &'static str,
    /// Secret value.
    pub value: Deferred<String, Rejection>,
}

impl Credential {
    /// A credential whose value becomes known later.
    pub fn new(key: &'static str, value: Deferred<String, Rejection>) -> Self {
        Self { key, value }
    }

    /// A credential whose value is already known.
    pub fn known(key: &'static str, value: impl Into<String>) -> Self {
        Self::new(key, Deferred::resolved(value.into()))
    }
}

#[derive(Debug, Clone)]
struct DopplerTarget {
    project: String,
    environment: String,
    ready: Deferred<(), Rejection>,
}

#[derive(Debug, Clone)]
struct VaultTarget {
    path: String,
    store: String,
    ready: Deferred<(), Rejection>,
}

/// The secret destinations of a run and the credential distributor writing
/// into them.
///
/// A destination without a live connection has no targets at all, so writes
/// to it are skipped for every repository. A repository that did not opt
/// into a destination has no target there, so nothing is ever written to it
/// for that repository.
#[derive(Debug, Clone, Default)]
pub struct Destinations {
    doppler: IndexMap<String, DopplerTarget>,
    vault: IndexMap<String, VaultTarget>,
}

impl Destinations {
    /// Declare the per-repository setup of every connected destination.
    pub fn setup(context: &Context) -> Self {
        let mut destinations = Destinations::default();

        if context.config.doppler.connection().is_some() {
            for repository in context.catalog.iter() {
                if repository.opted_into(Destination::Doppler) {
                    let target = setup_doppler(context, repository);
                    destinations
                        .doppler
                        .insert(repository.name.clone(), target);
                }
            }
        } else {
            warn!(destination = %Destination::Doppler, "no live connection; skipping");
        }

        match context.config.vault.connection() {
            Some(connection) => {
                let mounts = OnceMap::default();
                for repository in context.catalog.iter() {
                    if repository.opted_into(Destination::Vault) {
                        let target =
                            setup_vault(context, &connection.address, &mounts, repository);
                        destinations.vault.insert(repository.name.clone(), target);
                    }
                }
            }
            None => warn!(destination = %Destination::Vault, "no live connection; skipping"),
        }

        destinations
    }

    /// Resolves once `destination` is set up for `repository`. `None` when
    /// nothing will ever be written there for that repository.
    pub fn wired(&self, repository: &str, destination: Destination) -> Option<Deferred<(), Rejection>> {
        match destination {
            Destination::Doppler => self.doppler.get(repository).map(|target| target.ready.clone()),
            Destination::Vault => self.vault.get(repository).map(|target| target.ready.clone()),
        }
    }

    /// Write `credentials` for the pipeline's repository into every
    /// destination it opted into, adding each write to `pipeline` as a
    /// credential step. Returns the number of writes.
    ///
    /// Nothing is written before the pipeline's federation, identity and
    /// grant steps are realized; if any of them fails, every write rejects
    /// with that failure. The team config store receives one secret per key.
    /// The versioned KV store receives one secret per provider domain,
    /// holding every key of that domain.
    pub fn distribute(
        &self,
        context: &Context,
        pipeline: &mut Pipeline,
        credentials: &[Credential],
    ) -> usize {
        if credentials.is_empty() {
            return 0;
        }

        let repository = pipeline.repository().to_string();
        let provider = pipeline.provider();
        let granted = pipeline.granted();
        let credentials = credentials
            .iter()
            .map(|credential| Credential {
                key: credential.key,
                value: granted.zip(&credential.value).apply(|(_, value)| value),
            })
            .collect::<Vec<_>>();
        let mut writes = Vec::new();

        if let Some(target) = self.doppler.get(&repository) {
            for credential in &credentials {
                let name = naming::doppler::secret(&target.project, credential.key);
                let key = credential.key;
                let project = target.project.clone();
                let environment = target.environment.clone();
                let config = context.environment().to_string();
                let declaration = credential.value.apply({
                    let name = name.clone();
                    move |value| {
                        Declaration::new(ResourceKind::DopplerSecret, name)
                            .input("name", key)
                            .input("value", value)
                            .input("project", project)
                            .input("config", config)
                            .depends_on(environment)
                    }
                });
                writes.push(context.stack.declare_deferred(name, declaration).ready());
            }
        }

        if let Some(target) = self.vault.get(&repository) {
            let name = naming::vault::secret(&target.path, provider.as_str());
            let keys = credentials.iter().map(|credential| credential.key).collect::<Vec<_>>();
            let path = target.path.clone();
            let store = target.store.clone();
            let declaration = Deferred::all(credentials.iter().map(|credential| credential.value.clone()))
                .apply({
                    let name = name.clone();
                    move |values| {
                        let data = keys
                            .into_iter()
                            .zip(values)
                            .map(|(key, value)| (key.to_string(), Value::String(value)))
                            .collect::<Map<_, _>>();
                        Declaration::new(ResourceKind::VaultSecret, name)
                            .input("mount", path)
                            .input("name", provider.as_str())
                            .input("data_json", Value::Object(data).to_string())
                            .depends_on(store)
                    }
                });
            writes.push(context.stack.declare_deferred(name, declaration).ready());
        }

        let written = writes.len();
        for write in writes {
            pipeline.credential(write);
        }
        written
    }
}

fn setup_doppler(context: &Context, repository: &RepositoryDescriptor) -> DopplerTarget {
    let owner = context.owner();
    let environment = context.environment();
    let project_name = naming::doppler::project(&repository.name);
    let environment_name = naming::doppler::environment(environment, &repository.name);

    context.stack.declare(
        Declaration::new(ResourceKind::DopplerProject, &project_name)
            .input("name", repository.name.as_str())
            .input(
                "description",
                format!("GitHub repository: {owner}/{}", repository.name),
            ),
    );
    let ready = context
        .stack
        .declare(
            Declaration::new(ResourceKind::DopplerEnvironment, &environment_name)
                .input("project", repository.name.as_str())
                .input("slug", environment)
                .input("name", environment)
                .depends_on(&project_name),
        )
        .ready();

    info!(
        destination = %Destination::Doppler,
        repository = %repository.name,
        "manual action: link the project to the repository"
    );

    DopplerTarget {
        project: repository.name.clone(),
        environment: environment_name,
        ready,
    }
}

fn setup_vault(
    context: &Context,
    default_address: &str,
    mounts: &OnceMap<String, DeferredOutputs>,
    repository: &RepositoryDescriptor,
) -> VaultTarget {
    let owner = context.owner();
    let stack = &context.stack;
    let access = repository.access_permissions.vault.as_ref();
    let address = access
        .and_then(|vault| vault.address.clone())
        .unwrap_or_else(|| default_address.to_string());
    let additional_mounts = access
        .map(|vault| vault.additional_mounts.clone())
        .unwrap_or_default();

    let path = naming::vault::path(&repository.name);
    let store_name = naming::vault::store(&repository.name);
    let store = stack.declare(
        Declaration::new(ResourceKind::VaultMount, &store_name)
            .input("path", path.as_str())
            .input("type", "kv")
            .input("options", json!({ "version": "2" }))
            .input(
                "description",
                format!("GitHub repository: {owner}/{}", repository.name),
            ),
    );

    let mut policy_dependencies = vec![store_name.clone()];
    for mount in additional_mounts.iter().filter(|mount| mount.create) {
        let name = naming::vault::store(&mount.path.replace('/', "-"));
        mounts.get_or_init(mount.path.clone(), |path| {
            stack.declare(
                Declaration::new(ResourceKind::VaultMount, &name)
                    .input("path", path.as_str())
                    .input("type", "kv")
                    .input("options", json!({ "version": "2" }))
                    .input("description", format!("Shared mount: {path}")),
            )
        });
        policy_dependencies.push(name);
    }

    let policy_name = naming::vault::policy(&repository.name);
    let policy = stack.declare(
        Declaration::new(ResourceKind::VaultPolicy, &policy_name)
            .input("name", path.as_str())
            .input("policy", render_policy(&path, &additional_mounts))
            .depends_on_all(policy_dependencies),
    );

    let role_name = naming::vault::role(&repository.name);
    let role = stack.declare(
        Declaration::new(ResourceKind::VaultJwtRole, &role_name)
            .input("backend", VAULT_AUTH_BACKEND)
            .input("role_type", "jwt")
            .input("role_name", path.as_str())
            .input("token_policies", vec![path.clone()])
            .input("token_ttl", VAULT_TOKEN_TTL)
            .input("bound_audiences", vec![format!("https://github.com/{owner}")])
            .input("user_claim", "repository")
            .input(
                "bound_claims",
                json!({ "repository": format!("{owner}/{}", repository.name) }),
            )
            .depends_on(&policy_name),
    );
    let role_id = role.output("role_name");

    let coordinates_name = naming::vault::secret(&path, "vault");
    stack.declare_deferred(
        coordinates_name.clone(),
        role_id.apply({
            let path = path.clone();
            let address = address.clone();
            let store_name = store_name.clone();
            let role_name = role_name.clone();
            move |role_id| {
                Declaration::new(ResourceKind::VaultSecret, coordinates_name)
                    .input("mount", path)
                    .input("name", "vault")
                    .input(
                        "data_json",
                        json!({ "address": address, "role": role_id, "path": VAULT_AUTH_BACKEND })
                            .to_string(),
                    )
                    .depends_on(store_name)
                    .depends_on(role_name)
            }
        }),
    );

    let repository_object = naming::github::repository(owner, &repository.name);
    for (key, value) in [
        (keys::VAULT_ADDR, Deferred::resolved(address)),
        (keys::VAULT_ROLE, role_id.clone()),
        (keys::VAULT_PATH, Deferred::resolved(VAULT_AUTH_BACKEND.to_string())),
    ] {
        let name = naming::github::actions_secret(&repository.name, key);
        let repository_name = repository.name.clone();
        let repository_object = repository_object.clone();
        stack.declare_deferred(
            name.clone(),
            value.apply(move |value| {
                Declaration::new(ResourceKind::GithubActionsSecret, name)
                    .input("repository", repository_name)
                    .input("secret_name", key)
                    .input("plaintext_value", value)
                    .depends_on(repository_object)
            }),
        );
    }

    let ready = Deferred::all([store, policy, role]).apply(|_| ());
    VaultTarget {
        path,
        store: store_name,
        ready,
    }
}

fn render_policy(path: &str, additional_mounts: &[tether_model::AdditionalMount]) -> String {
    let mut policy = format!("path \"{path}/*\" {{\n  capabilities = [\"read\", \"list\"]\n}}\n");
    for mount in additional_mounts {
        let capabilities = mount
            .permissions
            .iter()
            .map(|permission| format!("\"{permission}\""))
            .collect::<Vec<_>>()
            .join(", ");
        policy.push_str(&format!(
            "\npath \"{}/*\" {{\n  capabilities = [{capabilities}]\n}}\n",
            mount.path
        ));
    }
    policy
}
