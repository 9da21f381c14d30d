//! The mesh VPN integration.

use tether_model::{Provider, TailscaleOAuthConfig};

use crate::{
    Context, Credential, Destinations, Exclusion, ExclusionReason, Pipeline, keys,
};

/// Hand the fleet-wide mesh OAuth client to every repository that asked for
/// it.
///
/// Without a configured client, every such repository is excluded from the
/// integration instead.
pub fn provision(
    context: &Context,
    destinations: &Destinations,
    repositories: &[String],
) -> (Vec<Pipeline>, Vec<Exclusion>) {
    let Some(oauth) = context.config.tailscale.as_ref().map(|tailscale| &tailscale.oauth) else {
        let exclusions = repositories
            .iter()
            .map(|repository| {
                Exclusion::new(
                    Provider::Tailscale,
                    repository,
                    None,
                    ExclusionReason::UnconfiguredProvider,
                )
            })
            .collect();
        return (Vec::new(), exclusions);
    };

    let pipelines = repositories
        .iter()
        .map(|repository| distribute(context, destinations, oauth, repository))
        .collect();
    (pipelines, Vec::new())
}

fn distribute(
    context: &Context,
    destinations: &Destinations,
    oauth: &TailscaleOAuthConfig,
    repository: &str,
) -> Pipeline {
    let credentials = [
        Credential::known(keys::TS_OAUTH_CLIENT_ID, oauth.id.as_str()),
        Credential::known(keys::TS_OAUTH_SECRET, oauth.secret.as_str()),
    ];

    let mut pipeline = Pipeline::new(repository, Provider::Tailscale);
    destinations.distribute(context, &mut pipeline, &credentials);
    pipeline
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tether_engine::{MemoryEngine, Stack};
    use tether_model::{
        RepositoryCatalog, RepositoryDescriptor, StackConfig, TailscaleConfig,
        TailscaleOAuthConfig,
    };
    use testresult::TestResult;

    use super::provision;
    use crate::{Context, Destinations, ExclusionReason};

    fn context(engine: &MemoryEngine, tailscale: Option<TailscaleConfig>) -> TestResult<Context> {
        let mut config = StackConfig::new("acme");
        config.doppler.token = Some("dp.st.token".into());
        config.tailscale = tailscale;
        let mut repository = RepositoryDescriptor::new("svc-a");
        repository.access_permissions.tailscale = Some(true);
        Ok(Context::new(
            config,
            RepositoryCatalog::new(vec![repository])?,
            Stack::new(engine.clone()),
        ))
    }

    #[tokio::test]
    async fn it_distributes_the_configured_client() -> TestResult {
        let engine = MemoryEngine::default();
        let context = context(
            &engine,
            Some(TailscaleConfig {
                oauth: TailscaleOAuthConfig {
                    id: "client".into(),
                    secret: "tskey-client".into(),
                },
            }),
        )?;
        let destinations = Destinations::setup(&context);

        let (pipelines, exclusions) = provision(&context, &destinations, &["svc-a".into()]);
        assert!(context.stack.settle().await.is_clean());

        assert!(exclusions.is_empty());
        assert_eq!(pipelines.len(), 1);
        let secret = engine
            .get("doppler-svc-a-TS_OAUTH_SECRET")
            .ok_or("secret not written")?;
        assert_eq!(secret.input_str("value"), Some("tskey-client"));
        Ok(())
    }

    #[tokio::test]
    async fn it_excludes_everyone_without_a_client() -> TestResult {
        let engine = MemoryEngine::default();
        let context = context(&engine, None)?;
        let destinations = Destinations::setup(&context);

        let (pipelines, exclusions) = provision(&context, &destinations, &["svc-a".into()]);

        assert!(pipelines.is_empty());
        assert_eq!(exclusions.len(), 1);
        assert_eq!(exclusions[0].reason, ExclusionReason::UnconfiguredProvider);
        Ok(())
    }
}
