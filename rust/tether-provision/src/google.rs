//! The project-based cloud pipeline.
//!
//! Per allowed project: a provider handle. Per project touched by an
//! eligible repository: the services identities rely on. Per project used as
//! a primary scope: one workload identity pool and pool provider. Per
//! repository: a service account in its primary project, a custom role and a
//! role membership in every project it touches, the binding letting CI
//! impersonate the service account, and optionally an object-storage key.

use indexmap::{IndexMap, IndexSet};
use serde_json::json;
use tether_engine::{Declaration, DeferredOutputsExt, ResourceKind};
use tether_model::{Provider, ScopeId, ScopeRegistry};

use crate::{
    Context, Credential, Destinations, FederationTrust, Pipeline, ScopedAccess, TOKEN_ISSUER,
    TetherProvisionError, keys, naming, permissions,
};

/// Services every touched project has enabled.
pub const DEFAULT_SERVICES: &[&str] = &[
    "iam.googleapis.com",
    "iamcredentials.googleapis.com",
    "cloudresourcemanager.googleapis.com",
    "cloudkms.googleapis.com",
    "storage.googleapis.com",
    "storage-component.googleapis.com",
];

/// Role letting a federated principal impersonate a service account.
pub const WORKLOAD_IDENTITY_USER_ROLE: &str = "roles/iam.workloadIdentityUser";

/// Declare provider handles for every allowed project.
pub fn declare_providers(context: &Context, registry: &ScopeRegistry) -> IndexMap<ScopeId, String> {
    if context.config.google.is_none() {
        return IndexMap::new();
    }

    registry
        .allowed()
        .map(|project| {
            let name = naming::google::provider(project.as_str());
            context.stack.declare(
                Declaration::new(ResourceKind::GoogleProvider, &name)
                    .input("project", project.as_str())
                    .input("region", registry.default_region()),
            );
            (project.clone(), name)
        })
        .collect()
}

/// Enable services in every project touched by `eligible`: the defaults,
/// plus whatever the repositories touching the project asked for. Each
/// service is enabled once per project.
///
/// Returns the names of the service declarations, per project.
pub fn enable_services(
    context: &Context,
    providers: &IndexMap<ScopeId, String>,
    eligible: &[ScopedAccess],
) -> Result<IndexMap<ScopeId, Vec<String>>, TetherProvisionError> {
    let mut wanted: IndexMap<ScopeId, IndexSet<String>> = IndexMap::new();
    for access in eligible {
        let requested = context
            .repository(&access.repository)
            .and_then(|repository| repository.access_permissions.google.as_ref())
            .map(|google| google.enabled_services.clone())
            .unwrap_or_default();
        for project in access.scopes() {
            wanted
                .entry(project)
                .or_insert_with(|| DEFAULT_SERVICES.iter().map(|service| service.to_string()).collect())
                .extend(requested.iter().cloned());
        }
    }

    wanted
        .into_iter()
        .map(|(project, services)| -> Result<_, TetherProvisionError> {
            let provider = handle(providers, &project)?;
            let names = services
                .into_iter()
                .map(|service| {
                    let name = naming::google::service(project.as_str(), &service);
                    context.stack.declare(
                        Declaration::new(ResourceKind::GoogleProjectService, &name)
                            .provider(provider)
                            .input("project", project.as_str())
                            .input("service", service)
                            .input("disable_on_destroy", false),
                    );
                    name
                })
                .collect::<Vec<_>>();
            Ok((project, names))
        })
        .collect()
}

/// Establish the federation trust of `project`, declaring it on first use.
pub fn federate(
    context: &Context,
    providers: &IndexMap<ScopeId, String>,
    services: &IndexMap<ScopeId, Vec<String>>,
    project: &ScopeId,
) -> Result<FederationTrust, TetherProvisionError> {
    context
        .federations
        .establish(Provider::Google, project, |project| {
            let provider = handle(providers, project)?;

            let pool_name = naming::google::pool(project.as_str());
            let pool = context.stack.declare(
                Declaration::new(ResourceKind::GoogleWorkloadIdentityPool, &pool_name)
                    .provider(provider)
                    .input("project", project.as_str())
                    .input(
                        "workload_identity_pool_id",
                        format!("github-{}", naming::postfix(&pool_name)),
                    )
                    .input("display_name", "GitHub Identity Pool")
                    .input("description", "Identity pool for CI workflows")
                    .depends_on_all(services.get(project).cloned().unwrap_or_default()),
            );
            let principal = pool.output("name");

            let pool_provider_name = naming::google::pool_provider(project.as_str());
            let issuer = context
                .stack
                .declare_deferred(
                    pool_provider_name.clone(),
                    principal.apply({
                        let provider = provider.to_string();
                        let project = project.clone();
                        let pool_name = pool_name.clone();
                        let owner = context.owner().to_string();
                        move |pool| {
                            Declaration::new(
                                ResourceKind::GoogleWorkloadIdentityPoolProvider,
                                &pool_provider_name,
                            )
                            .provider(provider)
                            .input("project", project.as_str())
                            .input("workload_identity_pool", pool)
                            .input(
                                "workload_identity_pool_provider_id",
                                format!("github-actions-{}", naming::postfix(&pool_provider_name)),
                            )
                            .input("display_name", "GitHub Actions")
                            .input("oidc", json!({ "issuer_uri": TOKEN_ISSUER }))
                            .input(
                                "attribute_mapping",
                                json!({
                                    "google.subject": "assertion.sub",
                                    "attribute.actor": "assertion.actor",
                                    "attribute.repository": "assertion.repository",
                                }),
                            )
                            .input(
                                "attribute_condition",
                                format!("assertion.repository_owner == '{owner}'"),
                            )
                            .depends_on(pool_name)
                        }
                    }),
                )
                .output("name");

            Ok(FederationTrust {
                provider: Provider::Google,
                scope: project.clone(),
                anchors: vec![
                    pool_name,
                    naming::google::pool_provider(project.as_str()),
                ],
                principal,
                issuer,
            })
        })
}

/// Declare the CI identity of one eligible repository and distribute its
/// credentials.
pub fn provision(
    context: &Context,
    registry: &ScopeRegistry,
    providers: &IndexMap<ScopeId, String>,
    services: &IndexMap<ScopeId, Vec<String>>,
    destinations: &Destinations,
    access: &ScopedAccess,
) -> Result<Pipeline, TetherProvisionError> {
    let repository = access.repository.as_str();
    let primary = &access.primary_scope;
    let provider = handle(providers, primary)?;
    let trust = federate(context, providers, services, primary)?;
    let mut pipeline = Pipeline::new(repository, Provider::Google);
    pipeline.federation(trust.ready());

    let account_name = naming::google::service_account(repository, primary.as_str());
    let account = context.stack.declare(
        Declaration::new(ResourceKind::GoogleServiceAccount, &account_name)
            .provider(provider)
            .input("project", primary.as_str())
            .input("account_id", naming::ci_identity(repository, &account_name))
            .input("display_name", format!("GitHub Repository: {repository}"))
            .depends_on_all(services.get(primary).cloned().unwrap_or_default()),
    );
    pipeline.identity(account.ready());

    let role_id = naming::ci_role_id(
        repository,
        &naming::google::role(repository, primary.as_str()),
    );
    for project in access.scopes() {
        let provider = handle(providers, &project)?;
        let granted = permissions::compose(permissions::GOOGLE_BASELINE, access, &project)
            .unwrap_or_default();

        let role_name = naming::google::role(repository, project.as_str());
        let role = context.stack.declare(
            Declaration::new(ResourceKind::GoogleCustomRole, &role_name)
                .provider(provider)
                .input("project", project.as_str())
                .input("role_id", role_id.as_str())
                .input("title", format!("CI {repository}"))
                .input("description", format!("GitHub Repository: {repository}"))
                .input("stage", "GA")
                .input("permissions", granted.to_vec())
                .depends_on_all(services.get(&project).cloned().unwrap_or_default()),
        );

        let member_name = naming::google::role_member(repository, project.as_str());
        let member = context.stack.declare_deferred(
            member_name.clone(),
            account.output("email").zip(&role.output("id")).apply({
                let provider = provider.to_string();
                let account_name = account_name.clone();
                move |(email, role)| {
                    Declaration::new(ResourceKind::GoogleProjectIamMember, member_name)
                        .provider(provider)
                        .input("project", project.as_str())
                        .input("role", role)
                        .input("member", format!("serviceAccount:{email}"))
                        .depends_on(role_name)
                        .depends_on(account_name)
                }
            }),
        );
        pipeline.grant(role.ready()).grant(member.ready());
    }

    let binding_name = naming::google::identity_binding(repository, primary.as_str());
    let subject = format!("{}/{repository}", context.owner());
    let binding = context.stack.declare_deferred(
        binding_name.clone(),
        account.output("name").zip(&trust.principal).apply({
            let provider = provider.to_string();
            let account_name = account_name.clone();
            let anchors = trust.anchors.clone();
            move |(account, pool)| {
                Declaration::new(ResourceKind::GoogleServiceAccountIamBinding, binding_name)
                    .provider(provider)
                    .input("service_account_id", account)
                    .input("role", WORKLOAD_IDENTITY_USER_ROLE)
                    .input(
                        "members",
                        vec![format!(
                            "principalSet://iam.googleapis.com/{pool}/attribute.repository/{subject}"
                        )],
                    )
                    .depends_on(account_name)
                    .depends_on_all(anchors)
            }
        }),
    );
    pipeline.grant(binding.ready());

    let mut credentials = vec![
        Credential::new(keys::GOOGLE_WORKLOAD_IDENTITY_PROVIDER, trust.issuer.clone()),
        Credential::new(
            keys::GOOGLE_WORKLOAD_IDENTITY_SERVICE_ACCOUNT,
            account.output("email"),
        ),
        Credential::known(keys::CLOUDSDK_COMPUTE_REGION, access.region.as_str()),
    ];

    if wants_hmac_key(context, registry, repository) {
        let key_name = naming::google::hmac_key(repository, primary.as_str());
        let key = context.stack.declare_deferred(
            key_name.clone(),
            account.output("email").apply({
                let provider = provider.to_string();
                let project = primary.clone();
                move |email| {
                    Declaration::new(ResourceKind::GoogleHmacKey, key_name)
                        .provider(provider)
                        .input("project", project.as_str())
                        .input("service_account_email", email)
                        .depends_on(account_name)
                }
            }),
        );
        pipeline.grant(key.ready());
        credentials.push(Credential::new(keys::GCS_ACCESS_KEY_ID, key.output("access_id")));
        credentials.push(Credential::new(keys::GCS_SECRET_ACCESS_KEY, key.output("secret")));
    }

    destinations.distribute(context, &mut pipeline, &credentials);

    Ok(pipeline)
}

/// Whether the repository gets an object-storage key: the stack must allow
/// keys and the repository must ask for one.
pub fn wants_hmac_key(context: &Context, registry: &ScopeRegistry, repository: &str) -> bool {
    registry.flag(ScopeRegistry::ALLOW_HMAC_KEYS)
        && context
            .repository(repository)
            .and_then(|repository| repository.access_permissions.google.as_ref())
            .is_some_and(|google| google.hmac_key)
}

fn handle<'a>(
    providers: &'a IndexMap<ScopeId, String>,
    project: &ScopeId,
) -> Result<&'a str, TetherProvisionError> {
    providers
        .get(project)
        .map(String::as_str)
        .ok_or_else(|| TetherProvisionError::MissingProviderHandle {
            provider: Provider::Google,
            scope: project.clone(),
        })
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tether_engine::{MemoryEngine, ResourceKind, Stack};
    use tether_model::{
        AccessLevel, GoogleAccess, GoogleConfig, LinkedAccess, Provider, RepositoryCatalog,
        RepositoryDescriptor, ScopeId, StackConfig,
    };
    use testresult::TestResult;

    use super::{declare_providers, enable_services, provision};
    use crate::{Context, Destinations, Stage, naming, resolve};

    fn repository(name: &str, project: &str) -> RepositoryDescriptor {
        let mut repository = RepositoryDescriptor::new(name);
        repository.access_permissions.doppler = Some(false);
        repository.access_permissions.google = Some(GoogleAccess {
            project: Some(ScopeId::from(project)),
            ..Default::default()
        });
        repository
    }

    async fn run(repositories: Vec<RepositoryDescriptor>, allow_hmac_keys: bool) -> TestResult<(MemoryEngine, Context)> {
        let engine = MemoryEngine::default();
        let mut config = StackConfig::new("acme");
        config.google = Some(GoogleConfig {
            default_region: "europe-west4".into(),
            projects: vec!["a".into(), "b".into()],
            allow_hmac_keys,
        });
        let context = Context::new(
            config,
            RepositoryCatalog::new(repositories)?,
            Stack::new(engine.clone()),
        );

        let registry = context.config.registry(Provider::Google).ok_or("no registry")?;
        let providers = declare_providers(&context, &registry);
        let destinations = Destinations::setup(&context);
        let eligible = resolve(&registry, &context.catalog).eligible;
        let services = enable_services(&context, &providers, &eligible)?;

        for access in &eligible {
            context
                .stages
                .advance(&access.repository, Provider::Google, Stage::Validated)?;
            let pipeline = provision(&context, &registry, &providers, &services, &destinations, access)?;
            pipeline.track(context.stages.clone()).await?;
        }
        assert!(context.stack.settle().await.is_clean());
        Ok((engine, context))
    }

    #[tokio::test]
    async fn it_grants_linked_projects_a_role_of_their_own() -> TestResult {
        let mut linked = repository("svc-r", "a");
        if let Some(google) = linked.access_permissions.google.as_mut() {
            google.iam_permissions = vec!["p1".into()];
            google.linked_projects = IndexMap::from([(
                ScopeId::from("b"),
                LinkedAccess::new(AccessLevel::Restricted),
            )]);
        }

        let (engine, context) = run(vec![linked], false).await?;

        let primary = engine
            .get(&naming::google::role("svc-r", "a"))
            .ok_or("primary role missing")?;
        let secondary = engine
            .get(&naming::google::role("svc-r", "b"))
            .ok_or("linked role missing")?;
        assert_eq!(secondary.input_str("project"), Some("b"));
        assert_eq!(primary.input_str("role_id"), secondary.input_str("role_id"));

        let granted = |role: &tether_engine::Declaration, permission: &str| {
            role.inputs["permissions"]
                .as_array()
                .is_some_and(|permissions| permissions.contains(&json!(permission)))
        };
        assert!(granted(&primary, "p1"));
        assert!(!granted(&secondary, "p1"));

        assert_eq!(engine.of_kind(ResourceKind::GoogleServiceAccount).len(), 1);
        assert_eq!(engine.of_kind(ResourceKind::GoogleProjectIamMember).len(), 2);
        assert_eq!(engine.of_kind(ResourceKind::GoogleWorkloadIdentityPool).len(), 1);
        assert!(context.stages.completed("svc-r", Provider::Google));
        Ok(())
    }

    #[tokio::test]
    async fn it_enables_each_service_once_per_project() -> TestResult {
        let mut first = repository("svc-a", "a");
        let mut second = repository("svc-b", "a");
        for repository in [&mut first, &mut second] {
            if let Some(google) = repository.access_permissions.google.as_mut() {
                google.enabled_services = vec!["run.googleapis.com".into()];
            }
        }

        let (engine, _) = run(vec![first, second], false).await?;

        let services = engine.of_kind(ResourceKind::GoogleProjectService);
        assert_eq!(services.len(), super::DEFAULT_SERVICES.len() + 1);
        assert!(
            engine
                .get(&naming::google::service("a", "run.googleapis.com"))
                .is_some()
        );
        assert_eq!(engine.of_kind(ResourceKind::GoogleWorkloadIdentityPoolProvider).len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_binds_the_pool_to_one_repository() -> TestResult {
        let (engine, _) = run(vec![repository("svc-a", "a")], false).await?;

        let binding = engine
            .get(&naming::google::identity_binding("svc-a", "a"))
            .ok_or("binding missing")?;
        let pool = engine
            .get(&naming::google::pool("a"))
            .ok_or("pool missing")?;
        let pool_id = pool.input_str("workload_identity_pool_id").unwrap_or_default();
        assert_eq!(
            binding.inputs["members"],
            json!([format!(
                "principalSet://iam.googleapis.com/projects/a/locations/global/workloadIdentityPools/{pool_id}/attribute.repository/acme/svc-a"
            )])
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_issues_storage_keys_only_when_allowed() -> TestResult {
        let mut wants_key = repository("svc-a", "a");
        if let Some(google) = wants_key.access_permissions.google.as_mut() {
            google.hmac_key = true;
        }

        let (engine, _) = run(vec![wants_key.clone()], false).await?;
        assert!(engine.of_kind(ResourceKind::GoogleHmacKey).is_empty());

        let (engine, _) = run(vec![wants_key], true).await?;
        assert_eq!(engine.of_kind(ResourceKind::GoogleHmacKey).len(), 1);
        Ok(())
    }
}
