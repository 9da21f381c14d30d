use futures::future::try_join_all;
use indexmap::IndexSet;
use tether_engine::{Engine, Stack};
use tether_model::{Destination, Provider, RepositoryCatalog, ScopeRegistry, StackConfig};
use tracing::info;

use crate::{
    Context, Destinations, Exclusion, ExclusionReason, Pipeline, Report, Resolution, ScopeMembership,
    ScopeReport, Stage, TetherProvisionError, Wiring, aws, github, google, pulumi, resolve,
    tailscale, unique_scopes,
};

/// Provision every repository of `catalog` for every provider and
/// destination it asks for, declaring objects into `engine`.
///
/// Invalid access intents exclude a repository from one provider only, and a
/// failed object stops only the pipelines that depend on it. Both are
/// reported rather than returned as errors.
pub async fn provision<E>(
    config: StackConfig,
    catalog: RepositoryCatalog,
    engine: E,
) -> Result<Report, TetherProvisionError>
where
    E: Engine + 'static,
{
    let context = Context::new(config, catalog, Stack::new(engine));
    run(&context).await
}

/// Run a provisioning pass over an existing [Context].
pub async fn run(context: &Context) -> Result<Report, TetherProvisionError> {
    let mut report = Report::default();
    let mut pipelines = Vec::new();

    github::declare_repositories(context);
    let destinations = Destinations::setup(context);

    if let Some((registry, resolution)) = validate(context, Provider::Aws, &mut report)? {
        let providers = aws::declare_providers(context, &registry);
        for account in unique_scopes(&resolution.eligible) {
            aws::federate(context, &providers, &account)?;
        }
        for access in &resolution.eligible {
            pipelines.push(aws::provision(context, &providers, &destinations, access)?);
        }
        report.aws = ScopeReport {
            allowed: registry.allowed().cloned().collect(),
            configured: ScopeMembership::from_eligible(&resolution.eligible),
        };
    }

    let mut storage_keys = IndexSet::new();
    if let Some((registry, resolution)) = validate(context, Provider::Google, &mut report)? {
        let providers = google::declare_providers(context, &registry);
        let services = google::enable_services(context, &providers, &resolution.eligible)?;
        for project in unique_scopes(&resolution.eligible) {
            google::federate(context, &providers, &services, &project)?;
        }
        for access in &resolution.eligible {
            if google::wants_hmac_key(context, &registry, &access.repository) {
                storage_keys.insert(access.repository.clone());
            }
            pipelines.push(google::provision(
                context,
                &registry,
                &providers,
                &services,
                &destinations,
                access,
            )?);
        }
        report.google = ScopeReport {
            allowed: registry.allowed().cloned().collect(),
            configured: ScopeMembership::from_eligible(&resolution.eligible),
        };
    }

    for repository in wanting(context, Provider::Pulumi) {
        context
            .stages
            .advance(&repository, Provider::Pulumi, Stage::Validated)?;
        pipelines.push(pulumi::provision(context, &destinations, &repository));
        report.pulumi.repositories.push(repository);
    }

    let (mesh, excluded) = tailscale::provision(
        context,
        &destinations,
        &wanting(context, Provider::Tailscale),
    );
    exclude(context, &excluded, &mut report)?;
    for pipeline in &mesh {
        context
            .stages
            .advance(pipeline.repository(), Provider::Tailscale, Stage::Validated)?;
        report
            .tailscale
            .repositories
            .push(pipeline.repository().to_string());
    }
    pipelines.extend(mesh);

    track(context, pipelines).await?;
    let settlement = context.stack.settle().await;

    for repository in context.catalog.iter() {
        let name = repository.name.as_str();
        let google = context.stages.completed(name, Provider::Google);
        report.repositories.insert(
            repository.name.clone(),
            Wiring {
                aws: context.stages.completed(name, Provider::Aws),
                google,
                gcs: google && storage_keys.contains(name),
                pulumi: context.stages.completed(name, Provider::Pulumi),
                tailscale: context.stages.completed(name, Provider::Tailscale),
                doppler: wired(&destinations, name, Destination::Doppler).await,
                vault: wired(&destinations, name, Destination::Vault).await,
            },
        );
    }
    report.collect_failures(&settlement, &context.stages);

    info!(
        realized = settlement.realized.len(),
        excluded = report.exclusions.len(),
        failed = report.failures.len(),
        "provisioning settled"
    );
    Ok(report)
}

/// Resolve a scoped provider's access intents, recording exclusions. `None`
/// when the provider is not configured for this stack, in which case every
/// repository asking for it is excluded.
fn validate(
    context: &Context,
    provider: Provider,
    report: &mut Report,
) -> Result<Option<(ScopeRegistry, Resolution)>, TetherProvisionError> {
    let configured = match provider {
        Provider::Aws => context.config.aws.is_some(),
        Provider::Google => context.config.google.is_some(),
        Provider::Pulumi | Provider::Tailscale => true,
    };
    let registry = context.config.registry(provider).filter(|_| configured);

    let Some(registry) = registry else {
        let excluded = wanting(context, provider)
            .into_iter()
            .map(|repository| {
                Exclusion::new(
                    provider,
                    repository,
                    None,
                    ExclusionReason::UnconfiguredProvider,
                )
            })
            .collect::<Vec<_>>();
        exclude(context, &excluded, report)?;
        return Ok(None);
    };

    let resolution = resolve(&registry, &context.catalog);
    exclude(context, &resolution.exclusions, report)?;
    for access in &resolution.eligible {
        context
            .stages
            .advance(&access.repository, provider, Stage::Validated)?;
    }
    Ok(Some((registry, resolution)))
}

/// Move excluded pairs to their terminal stage and report them. A pair
/// excluded for several reasons is moved once.
fn exclude(
    context: &Context,
    exclusions: &[Exclusion],
    report: &mut Report,
) -> Result<(), TetherProvisionError> {
    let pairs = exclusions
        .iter()
        .map(|exclusion| (exclusion.repository.as_str(), exclusion.provider))
        .collect::<IndexSet<_>>();
    for (repository, provider) in pairs {
        context.stages.advance(repository, provider, Stage::Excluded)?;
    }
    report.exclusions.extend(exclusions.iter().cloned());
    Ok(())
}

async fn wired(destinations: &Destinations, repository: &str, destination: Destination) -> bool {
    match destinations.wired(repository, destination) {
        Some(ready) => ready.await.is_ok(),
        None => false,
    }
}

fn wanting(context: &Context, provider: Provider) -> Vec<String> {
    context
        .catalog
        .iter()
        .filter(|repository| repository.wants(provider))
        .map(|repository| repository.name.clone())
        .collect()
}

/// Follow every pipeline concurrently. A pipeline stuck on a slow or failed
/// step holds up nobody else.
async fn track(context: &Context, pipelines: Vec<Pipeline>) -> Result<(), TetherProvisionError> {
    try_join_all(
        pipelines
            .into_iter()
            .map(|pipeline| pipeline.track(context.stages.clone())),
    )
    .await?;
    Ok(())
}
