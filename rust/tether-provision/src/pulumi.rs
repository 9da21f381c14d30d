//! The deployment token issuer.

use tether_engine::{Declaration, DeferredOutputsExt, ResourceKind};
use tether_model::Provider;

use crate::{Context, Credential, Destinations, Pipeline, keys, naming};

/// Issue a deployment access token for `repository` and distribute it.
///
/// The token issuer has no scopes and no federation: the pipeline goes
/// straight from the token to its distribution.
pub fn provision(context: &Context, destinations: &Destinations, repository: &str) -> Pipeline {
    let name = naming::pulumi::access_token(repository);
    let token = context.stack.declare(
        Declaration::new(ResourceKind::PulumiAccessToken, &name)
            .input("description", format!("GitHub Repository: {repository}")),
    );

    let mut pipeline = Pipeline::new(repository, Provider::Pulumi);
    pipeline.identity(token.ready());

    let credentials = [Credential::new(keys::PULUMI_ACCESS_TOKEN, token.output("value"))];
    destinations.distribute(context, &mut pipeline, &credentials);
    pipeline
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tether_engine::{MemoryEngine, ResourceKind, Stack};
    use tether_model::{Provider, RepositoryCatalog, RepositoryDescriptor, StackConfig};
    use testresult::TestResult;

    use super::provision;
    use crate::{Context, Destinations, Stage};

    #[tokio::test]
    async fn it_writes_the_token_to_the_team_config_store() -> TestResult {
        let engine = MemoryEngine::default();
        let mut config = StackConfig::new("acme");
        config.doppler.token = Some("dp.st.token".into());
        let mut repository = RepositoryDescriptor::new("svc-a");
        repository.access_permissions.pulumi = Some(true);
        let context = Context::new(
            config,
            RepositoryCatalog::new(vec![repository])?,
            Stack::new(engine.clone()),
        );
        let destinations = Destinations::setup(&context);

        context.stages.advance("svc-a", Provider::Pulumi, Stage::Validated)?;
        let pipeline = provision(&context, &destinations, "svc-a");

        assert_eq!(
            pipeline.track(context.stages.clone()).await?,
            Stage::CredentialsDistributed
        );
        assert!(context.stack.settle().await.is_clean());

        let token = engine
            .get("pulumi-access-token-svc-a")
            .ok_or("token not realized")?;
        assert_eq!(token.kind, ResourceKind::PulumiAccessToken);
        let secret = engine
            .get("doppler-svc-a-PULUMI_ACCESS_TOKEN")
            .ok_or("secret not written")?;
        assert_eq!(secret.input_str("value").map(|value| value.starts_with("pul-")), Some(true));
        Ok(())
    }
}
