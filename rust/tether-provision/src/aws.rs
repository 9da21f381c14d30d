//! The account-based cloud pipeline.
//!
//! Per allowed account: a provider handle. Per account used by at least one
//! eligible repository: one OIDC identity provider. Per repository: a CI role
//! trusting that identity provider for the repository only, a policy holding
//! the composed permissions, and the attachment of one to the other.

use indexmap::IndexMap;
use serde_json::json;
use tether_engine::{Declaration, DeferredOutputsExt, ResourceKind};
use tether_model::{Provider, ScopeId, ScopeRegistry};

use crate::{
    Context, Credential, Destinations, FederationTrust, Pipeline, ScopedAccess,
    TOKEN_ISSUER, TetherProvisionError, keys, naming, permissions,
};

/// Audience CI requests tokens for.
pub const TOKEN_AUDIENCE: &str = "sts.amazonaws.com";

/// Thumbprint registered with the identity provider. The issuer is trusted
/// through the cloud's own certificate store, so the value is a placeholder.
pub const TOKEN_ISSUER_THUMBPRINT: &str = "ffffffffffffffffffffffffffffffffffffffff";

/// Declare provider handles for every allowed account.
pub fn declare_providers(context: &Context, registry: &ScopeRegistry) -> IndexMap<ScopeId, String> {
    let Some(aws) = context.config.aws.as_ref() else {
        return IndexMap::new();
    };

    registry
        .allowed()
        .filter_map(|account| {
            let settings = aws.accounts.get(account)?;
            let name = naming::aws::provider(account.as_str());
            context.stack.declare(
                Declaration::new(ResourceKind::AwsProvider, &name)
                    .input("account", account.as_str())
                    .input("region", registry.default_region())
                    .input(
                        "assume_role",
                        json!({
                            "role_arn": settings.role_arn,
                            "external_id": settings.external_id,
                        }),
                    ),
            );
            Some((account.clone(), name))
        })
        .collect()
}

/// Establish the federation trust of `account`, declaring it on first use.
pub fn federate(
    context: &Context,
    providers: &IndexMap<ScopeId, String>,
    account: &ScopeId,
) -> Result<FederationTrust, TetherProvisionError> {
    context
        .federations
        .establish(Provider::Aws, account, |account| {
            let provider = providers.get(account).ok_or_else(|| {
                TetherProvisionError::MissingProviderHandle {
                    provider: Provider::Aws,
                    scope: account.clone(),
                }
            })?;

            let name = naming::aws::identity_provider(account.as_str());
            let arn = context
                .stack
                .declare(
                    Declaration::new(ResourceKind::AwsOidcProvider, &name)
                        .provider(provider)
                        .input("account", account.as_str())
                        .input("url", TOKEN_ISSUER)
                        .input("client_id_list", vec![TOKEN_AUDIENCE])
                        .input("thumbprint_list", vec![TOKEN_ISSUER_THUMBPRINT])
                        .input("tags", context.labels("github-actions", None)),
                )
                .output("arn");

            Ok(FederationTrust {
                provider: Provider::Aws,
                scope: account.clone(),
                anchors: vec![name],
                principal: arn.clone(),
                issuer: arn,
            })
        })
}

/// Declare the CI identity of one eligible repository and distribute its
/// credentials.
pub fn provision(
    context: &Context,
    providers: &IndexMap<ScopeId, String>,
    destinations: &Destinations,
    access: &ScopedAccess,
) -> Result<Pipeline, TetherProvisionError> {
    let repository = access.repository.as_str();
    let account = &access.primary_scope;
    let provider = providers.get(account).cloned().ok_or_else(|| {
        TetherProvisionError::MissingProviderHandle {
            provider: Provider::Aws,
            scope: account.clone(),
        }
    })?;
    let trust = federate(context, providers, account)?;
    let mut pipeline = Pipeline::new(repository, Provider::Aws);
    pipeline.federation(trust.ready());

    let role_name = naming::aws::role(repository, account.as_str());
    let physical_name = naming::ci_identity(repository, &role_name);
    let description = format!("GitHub Repository: {repository}");
    let labels = context.labels("github-repository", Some(repository));
    let subject = format!("repo:{}/{repository}:*", context.owner());

    let role = context.stack.declare_deferred(
        role_name.clone(),
        trust.principal.apply({
            let role_name = role_name.clone();
            let provider = provider.clone();
            let account = account.clone();
            let physical_name = physical_name.clone();
            let description = description.clone();
            let labels = labels.clone();
            let anchors = trust.anchors.clone();
            move |principal| {
                let trust_policy = json!({
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "sts:AssumeRoleWithWebIdentity",
                        "Effect": "Allow",
                        "Principal": { "Federated": principal },
                        "Condition": {
                            "StringEquals": {
                                "token.actions.githubusercontent.com:aud": TOKEN_AUDIENCE,
                            },
                            "StringLike": {
                                "token.actions.githubusercontent.com:sub": subject,
                            },
                        },
                    }],
                });
                Declaration::new(ResourceKind::AwsRole, role_name)
                    .provider(provider)
                    .input("account", account.as_str())
                    .input("name", physical_name)
                    .input("description", description)
                    .input("assume_role_policy", trust_policy.to_string())
                    .input("tags", labels)
                    .depends_on_all(anchors)
            }
        }),
    );
    pipeline.identity(role.ready());

    let permissions = permissions::compose(permissions::AWS_BASELINE, access, account)
        .unwrap_or_default()
        .to_vec();
    let policy_name = naming::aws::policy(repository, account.as_str());
    let policy = context.stack.declare(
        Declaration::new(ResourceKind::AwsPolicy, &policy_name)
            .provider(&provider)
            .input("account", account.as_str())
            .input("name", physical_name)
            .input("description", description)
            .input(
                "policy",
                json!({
                    "Version": "2012-10-17",
                    "Statement": [{ "Action": permissions, "Effect": "Allow", "Resource": "*" }],
                })
                .to_string(),
            )
            .input("tags", labels),
    );

    let attachment_name = naming::aws::policy_attachment(repository, account.as_str());
    let attachment = context.stack.declare_deferred(
        attachment_name.clone(),
        role.output("name").zip(&policy.output("arn")).apply({
            let provider = provider.clone();
            move |(role, policy_arn)| {
                Declaration::new(ResourceKind::AwsRolePolicyAttachment, attachment_name)
                    .provider(provider)
                    .input("role", role)
                    .input("policy_arn", policy_arn)
                    .depends_on(role_name)
                    .depends_on(policy_name)
            }
        }),
    );
    pipeline.grant(policy.ready()).grant(attachment.ready());

    let credentials = [
        Credential::new(keys::AWS_IDENTITY_ROLE_ARN, role.output("arn")),
        Credential::known(keys::AWS_REGION, access.region.as_str()),
    ];
    destinations.distribute(context, &mut pipeline, &credentials);

    Ok(pipeline)
}
