use pretty_assertions::assert_eq;
use serde_json::Value;
use tether_engine::{Declaration, MemoryEngine, ResourceKind};
use tether_model::{Provider, RepositoryCatalog, RepositoryDescriptor, ScopeId, StackConfig};
use tether_provision::{Affected, ExclusionReason, GOOGLE_BASELINE, Report, naming, provision};
use testresult::TestResult;

const STACK: &str = r#"
environment = "prod"

[repositories]
owner = "acme"

[aws]
default_region = "eu-central-1"

[aws.accounts.111]
role_arn = "arn:aws:iam::111:role/provisioner"
external_id = "tether"

[google]
default_region = "europe-west4"
projects = ["a", "b"]
"#;

fn catalog(documents: &[&str]) -> TestResult<RepositoryCatalog> {
    let repositories = documents
        .iter()
        .map(|document| serde_yaml::from_str::<RepositoryDescriptor>(document))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RepositoryCatalog::new(repositories)?)
}

async fn run(
    config: &str,
    documents: &[&str],
    engine: MemoryEngine,
) -> TestResult<(Report, MemoryEngine)> {
    let report = provision(
        StackConfig::from_toml_str(config)?,
        catalog(documents)?,
        engine.clone(),
    )
    .await?;
    Ok((report, engine))
}

fn permissions(declaration: &Declaration) -> Vec<String> {
    declaration.inputs["permissions"]
        .as_array()
        .map(|permissions| {
            permissions
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

const SVC_A: &str = "name: svc-a\naccessPermissions:\n  aws:\n    account: 111\n";
const SVC_B: &str = "name: svc-b\naccessPermissions:\n  aws:\n    account: '111'\n";
const SVC_C: &str = "name: svc-c\naccessPermissions:\n  aws:\n    account: 999\n";

#[tokio::test]
async fn it_shares_a_scope_and_excludes_an_unregistered_one() -> TestResult {
    let (report, engine) = run(STACK, &[SVC_A, SVC_B, SVC_C], MemoryEngine::default()).await?;

    assert_eq!(report.aws.allowed, vec![ScopeId::from("111")]);
    assert_eq!(
        report.aws.configured.get(&ScopeId::from("111")),
        vec!["svc-a", "svc-b"]
    );
    assert!(report.aws.configured.get(&ScopeId::from("999")).is_empty());

    assert_eq!(report.exclusions.len(), 1);
    assert_eq!(report.exclusions[0].repository, "svc-c");
    assert_eq!(report.exclusions[0].scope, Some(ScopeId::from("999")));
    assert_eq!(report.exclusions[0].reason, ExclusionReason::UnregisteredScope);

    assert_eq!(engine.of_kind(ResourceKind::AwsOidcProvider).len(), 1);
    assert_eq!(engine.of_kind(ResourceKind::AwsRole).len(), 2);
    assert!(report.repositories["svc-a"].aws);
    assert!(report.repositories["svc-b"].aws);
    assert!(!report.repositories["svc-c"].aws);
    assert!(report.failures.is_empty());
    Ok(())
}

#[tokio::test]
async fn it_attenuates_restricted_links_and_elevates_full_ones() -> TestResult {
    let restricted = r#"
name: svc-r
accessPermissions:
  doppler: false
  google:
    project: a
    iamPermissions: [p1, p2]
    linkedProjects:
      b:
        iamPermissions: [x9]
"#;
    let full = r#"
name: svc-f
accessPermissions:
  doppler: false
  google:
    project: a
    iamPermissions: [p1, p2]
    linkedProjects:
      b:
        accessLevel: full
        iamPermissions: [x9]
"#;
    let (report, engine) = run(STACK, &[restricted, full], MemoryEngine::default()).await?;

    let role = |repository: &str, project: &str| {
        engine
            .get(&naming::google::role(repository, project))
            .map(|role| permissions(&role))
            .ok_or(format!("no role for {repository} in {project}"))
    };
    let baseline = GOOGLE_BASELINE
        .iter()
        .map(|permission| permission.to_string())
        .collect::<Vec<_>>();
    let elevated = baseline
        .iter()
        .cloned()
        .chain(["p1".to_string(), "p2".to_string()])
        .collect::<Vec<_>>();

    assert_eq!(role("svc-r", "a")?, elevated);
    assert_eq!(role("svc-r", "b")?, baseline);
    assert_eq!(role("svc-f", "b")?, role("svc-f", "a")?);
    assert!(!role("svc-f", "b")?.contains(&"x9".to_string()));

    assert_eq!(
        report.google.configured.get(&ScopeId::from("b")),
        vec!["svc-r", "svc-f"]
    );
    assert_eq!(engine.of_kind(ResourceKind::GoogleWorkloadIdentityPool).len(), 1);
    Ok(())
}

#[tokio::test]
async fn it_declares_the_same_names_on_every_run() -> TestResult {
    let linked = "name: svc-l\naccessPermissions:\n  google:\n    project: a\n    linkedProjects: [b]\n";

    let (_, first) = run(STACK, &[SVC_A, SVC_B, linked], MemoryEngine::default()).await?;
    let (_, second) = run(STACK, &[SVC_A, SVC_B, linked], MemoryEngine::default()).await?;

    assert_eq!(first.names(), second.names());
    let identities = |engine: &MemoryEngine| {
        engine
            .of_kind(ResourceKind::GoogleServiceAccount)
            .into_iter()
            .map(|account| account.input_str("account_id").map(String::from))
            .collect::<Vec<_>>()
    };
    assert_eq!(identities(&first), identities(&second));
    Ok(())
}

#[tokio::test]
async fn it_never_writes_to_a_destination_a_repository_skipped() -> TestResult {
    let quiet = "name: quiet\naccessPermissions:\n  doppler: false\n  aws:\n    account: 111\n";
    let (report, engine) = run(STACK, &[SVC_A, quiet], MemoryEngine::default()).await?;

    assert!(report.repositories["quiet"].aws);
    assert!(!report.repositories["quiet"].doppler);
    assert!(report.repositories["svc-a"].doppler);
    assert!(
        engine
            .of_kind(ResourceKind::DopplerSecret)
            .iter()
            .all(|secret| secret.input_str("project") == Some("svc-a"))
    );
    assert!(engine.get(&naming::doppler::project("quiet")).is_none());
    Ok(())
}

#[tokio::test]
async fn it_skips_a_store_without_a_live_connection() -> TestResult {
    let config = format!("{STACK}\n[vault]\nenabled = true\naddress = \"https://vault.acme.dev\"\n");
    let (report, engine) = run(&config, &[SVC_A], MemoryEngine::default()).await?;

    assert!(report.repositories["svc-a"].aws);
    assert!(report.repositories["svc-a"].doppler);
    assert!(!report.repositories["svc-a"].vault);
    assert!(engine.of_kind(ResourceKind::VaultMount).is_empty());
    assert!(engine.of_kind(ResourceKind::VaultSecret).is_empty());
    assert!(report.failures.is_empty());
    Ok(())
}

#[tokio::test]
async fn it_contains_a_failure_to_its_own_pipeline() -> TestResult {
    let both = r#"
name: svc-a
accessPermissions:
  aws:
    account: 111
  google:
    project: a
"#;
    let failed = naming::aws::role("svc-a", "111");
    let engine = MemoryEngine::default().failing(&failed, "access denied");
    let (report, engine) = run(STACK, &[both, SVC_B], engine).await?;

    assert!(!report.repositories["svc-a"].aws);
    assert!(report.repositories["svc-a"].google);
    assert!(report.repositories["svc-b"].aws);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].origin, failed);
    assert_eq!(
        report.failures[0].affected,
        vec![Affected {
            repository: "svc-a".into(),
            provider: Provider::Aws,
        }]
    );
    assert!(
        report.failures[0]
            .blocked
            .contains(&naming::aws::policy_attachment("svc-a", "111"))
    );
    assert!(engine.get(&naming::aws::policy("svc-a", "111")).is_some());
    assert!(
        engine
            .get(&naming::doppler::secret("svc-a", "AWS_IDENTITY_ROLE_ARN"))
            .is_none()
    );
    Ok(())
}

#[tokio::test]
async fn it_excludes_repositories_from_an_unconfigured_provider() -> TestResult {
    let config = "[repositories]\nowner = \"acme\"\n";
    let wants_google = "name: svc-g\naccessPermissions:\n  google:\n    project: a\n  tailscale: true\n";
    let (report, engine) = run(config, &[wants_google], MemoryEngine::default()).await?;

    let reasons = report
        .exclusions
        .iter()
        .map(|exclusion| (exclusion.provider, exclusion.reason))
        .collect::<Vec<_>>();
    assert_eq!(
        reasons,
        vec![
            (Provider::Google, ExclusionReason::UnconfiguredProvider),
            (Provider::Tailscale, ExclusionReason::UnconfiguredProvider),
        ]
    );
    assert!(engine.of_kind(ResourceKind::GoogleServiceAccount).is_empty());
    assert!(engine.get(&naming::github::repository("acme", "svc-g")).is_some());
    Ok(())
}

#[tokio::test]
async fn it_writes_no_credentials_for_a_pair_whose_identity_or_grant_failed() -> TestResult {
    let config = format!(
        "{STACK}\n[vault]\nenabled = true\naddress = \"https://vault.acme.dev\"\ntoken = \"hvs.token\"\n"
    );
    let google = "name: svc-g\naccessPermissions:\n  google:\n    project: a\n";
    let account = naming::google::service_account("svc-g", "a");
    let attachment = naming::aws::policy_attachment("svc-a", "111");
    let engine = MemoryEngine::default()
        .failing(&account, "quota exceeded")
        .failing(&attachment, "access denied");
    let (report, engine) = run(&config, &[SVC_A, SVC_B, google], engine).await?;

    assert!(!report.repositories["svc-a"].aws);
    assert!(!report.repositories["svc-g"].google);
    assert!(report.repositories["svc-b"].aws);
    assert!(report.repositories["svc-a"].vault);

    assert!(
        engine
            .of_kind(ResourceKind::DopplerSecret)
            .iter()
            .all(|secret| secret.input_str("project") == Some("svc-b"))
    );
    for (repository, provider) in [("svc-a", Provider::Aws), ("svc-g", Provider::Google)] {
        let path = naming::vault::path(repository);
        assert!(engine.get(&naming::vault::secret(&path, provider.as_str())).is_none());
    }
    assert!(
        engine
            .get(&naming::vault::secret(&naming::vault::path("svc-b"), "aws"))
            .is_some()
    );

    let origins = report
        .failures
        .iter()
        .map(|failure| failure.origin.as_str())
        .collect::<Vec<_>>();
    assert_eq!(origins.len(), 2);
    assert!(origins.contains(&account.as_str()));
    assert!(origins.contains(&attachment.as_str()));
    Ok(())
}

#[tokio::test]
async fn it_keeps_dashed_repositories_in_dashed_projects_apart() -> TestResult {
    let config = r#"
[repositories]
owner = "acme"

[google]
default_region = "europe-west4"
projects = ["web-prod", "prod"]
"#;
    let api = "name: api\naccessPermissions:\n  google:\n    project: web-prod\n";
    let api_web = "name: api-web\naccessPermissions:\n  google:\n    project: prod\n";
    let (report, engine) = run(config, &[api, api_web], MemoryEngine::default()).await?;

    assert!(report.failures.is_empty());
    assert!(report.repositories["api"].google);
    assert!(report.repositories["api-web"].google);
    assert_eq!(engine.of_kind(ResourceKind::GoogleServiceAccount).len(), 2);
    assert_eq!(engine.of_kind(ResourceKind::GoogleCustomRole).len(), 2);
    Ok(())
}
