use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{Provider, ScopeId, ScopeRegistry, TetherModelError, defaults};

/// Fleet-wide stack configuration.
///
/// ```toml
/// environment = "prod"
///
/// [repositories]
/// owner = "acme"
///
/// [aws]
/// default_region = "eu-central-1"
///
/// [aws.accounts.111111111111]
/// role_arn = "arn:aws:iam::111111111111:role/provisioner"
/// external_id = "tether"
///
/// [google]
/// default_region = "europe-west4"
/// projects = ["acme-main"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack environment, used as the team config store's config name and
    /// as a label on every taggable object.
    #[serde(default = "defaults::environment")]
    pub environment: String,
    /// Repository owner settings.
    pub repositories: RepositoriesConfig,
    /// Account-based cloud.
    #[serde(default)]
    pub aws: Option<AwsConfig>,
    /// Project-based cloud.
    #[serde(default)]
    pub google: Option<GoogleConfig>,
    /// Versioned KV store.
    #[serde(default)]
    pub vault: VaultConfig,
    /// Team config store.
    #[serde(default)]
    pub doppler: DopplerConfig,
    /// VPN/mesh integration.
    #[serde(default)]
    pub tailscale: Option<TailscaleConfig>,
    /// Whether repositories may be deleted.
    #[serde(default)]
    pub allow_repository_deletion: bool,
}

/// Repository owner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoriesConfig {
    /// Owning user or organization.
    pub owner: String,
    /// Subscription tier; `none` means a free plan.
    #[serde(default = "defaults::subscription")]
    pub subscription: String,
}

impl RepositoriesConfig {
    /// Whether the owner pays for a plan (rulesets on private repositories
    /// require one).
    pub fn has_subscription(&self) -> bool {
        !self.subscription.is_empty() && self.subscription != defaults::SUBSCRIPTION
    }
}

/// Account-based cloud settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Region used when a repository does not name one.
    pub default_region: String,
    /// Allowed accounts and how to reach them.
    #[serde(default)]
    pub accounts: IndexMap<ScopeId, AwsAccountConfig>,
}

/// How the provisioner assumes a role in an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsAccountConfig {
    /// Role assumed for provisioning.
    pub role_arn: String,
    /// External id presented when assuming the role.
    pub external_id: String,
}

/// Project-based cloud settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Region used when a repository does not name one.
    pub default_region: String,
    /// Allowed projects.
    #[serde(default)]
    pub projects: Vec<ScopeId>,
    /// Whether object-storage keys may be issued.
    #[serde(default)]
    pub allow_hmac_keys: bool,
}

/// Versioned KV store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Whether the store is in use.
    #[serde(default)]
    pub enabled: bool,
    /// Store address handed to CI.
    #[serde(default)]
    pub address: String,
    /// Provisioning token; read from `VAULT_TOKEN` when absent.
    #[serde(default)]
    pub token: Option<String>,
}

/// A live connection to the versioned KV store.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConnection {
    /// Store address.
    pub address: String,
    /// Provisioning token.
    pub token: String,
}

impl VaultConfig {
    /// The live connection, if the store is enabled and a token is known.
    pub fn connection(&self) -> Option<VaultConnection> {
        match (&self.token, self.enabled) {
            (Some(token), true) if !token.is_empty() => Some(VaultConnection {
                address: self.address.clone(),
                token: token.clone(),
            }),
            _ => None,
        }
    }
}

/// Team config store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DopplerConfig {
    /// Whether the store is in use.
    #[serde(default = "defaults::doppler_enabled")]
    pub enabled: bool,
    /// Provisioning token; read from `DOPPLER_TOKEN` when absent.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for DopplerConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::DOPPLER_ENABLED,
            token: None,
        }
    }
}

/// A live connection to the team config store. Unlike the versioned KV
/// store, it needs no token up front: without one, the store's own client
/// authenticates from its ambient configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DopplerConnection {
    /// Provisioning token, if one was configured.
    pub token: Option<String>,
}

impl DopplerConfig {
    /// The live connection, if the store is enabled. A missing token does
    /// not disconnect it.
    pub fn connection(&self) -> Option<DopplerConnection> {
        self.enabled.then(|| DopplerConnection {
            token: self.token.clone(),
        })
    }
}

/// VPN/mesh integration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailscaleConfig {
    /// Fleet-wide OAuth client handed to CI.
    pub oauth: TailscaleOAuthConfig,
}

/// An OAuth client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailscaleOAuthConfig {
    /// Client id.
    pub id: String,
    /// Client secret.
    pub secret: String,
}

impl StackConfig {
    /// A minimal configuration for the given owner.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            environment: defaults::environment(),
            repositories: RepositoriesConfig {
                owner: owner.into(),
                subscription: defaults::subscription(),
            },
            aws: None,
            google: None,
            vault: VaultConfig::default(),
            doppler: DopplerConfig::default(),
            tailscale: None,
            allow_repository_deletion: defaults::ALLOW_REPOSITORY_DELETION,
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, TetherModelError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TetherModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TetherModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Fill in values that may come from the process environment.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`.
    pub fn with_environment<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.vault.token.is_none() {
            self.vault.token = lookup("VAULT_TOKEN");
        }
        if self.doppler.token.is_none() {
            self.doppler.token = lookup("DOPPLER_TOKEN");
        }
        if let Some(value) = lookup("ALLOW_REPOSITORY_DELETION") {
            self.allow_repository_deletion = value.eq_ignore_ascii_case("true");
        }
        self
    }

    /// The allow-list of scopes for a scoped provider. Providers that are
    /// not configured have an empty registry.
    pub fn registry(&self, provider: Provider) -> Option<ScopeRegistry> {
        match provider {
            Provider::Aws => Some(match &self.aws {
                Some(aws) => ScopeRegistry::new(
                    provider,
                    aws.default_region.clone(),
                    aws.accounts.keys().cloned(),
                ),
                None => ScopeRegistry::new(provider, String::new(), IndexSet::new()),
            }),
            Provider::Google => Some(match &self.google {
                Some(google) => ScopeRegistry::new(
                    provider,
                    google.default_region.clone(),
                    google.projects.iter().cloned(),
                )
                .with_flag(ScopeRegistry::ALLOW_HMAC_KEYS, google.allow_hmac_keys),
                None => ScopeRegistry::new(provider, String::new(), IndexSet::new()),
            }),
            Provider::Pulumi | Provider::Tailscale => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    use super::*;

    const STACK: &str = r#"
[repositories]
owner = "acme"

[aws]
default_region = "eu-central-1"

[aws.accounts.111111111111]
role_arn = "arn:aws:iam::111111111111:role/provisioner"
external_id = "tether"

[google]
default_region = "europe-west4"
projects = ["acme-main", "acme-shared"]
allow_hmac_keys = true

[vault]
enabled = true
address = "https://vault.acme.dev"
"#;

    #[test]
    fn it_parses_a_stack_with_defaults() -> TestResult {
        let config = StackConfig::from_toml_str(STACK)?;

        assert_eq!(config.environment, defaults::ENVIRONMENT);
        assert_eq!(config.repositories.subscription, defaults::SUBSCRIPTION);
        assert!(!config.repositories.has_subscription());
        assert!(config.doppler.enabled);
        assert!(config.tailscale.is_none());
        assert!(!config.allow_repository_deletion);

        let aws = config.registry(Provider::Aws).ok_or("no registry")?;
        assert!(aws.contains(&ScopeId::from("111111111111")));
        assert_eq!(aws.default_region(), "eu-central-1");

        let google = config.registry(Provider::Google).ok_or("no registry")?;
        assert_eq!(
            google.allowed().cloned().collect::<Vec<_>>(),
            vec![ScopeId::from("acme-main"), ScopeId::from("acme-shared")]
        );
        assert!(google.flag(ScopeRegistry::ALLOW_HMAC_KEYS));
        assert!(config.registry(Provider::Pulumi).is_none());
        Ok(())
    }

    #[test]
    fn it_reads_tokens_from_the_environment() -> TestResult {
        let config = StackConfig::from_toml_str(STACK)?;
        assert_eq!(config.vault.connection(), None);

        let config = config.with_environment(|key| match key {
            "VAULT_TOKEN" => Some("hvs.token".into()),
            "ALLOW_REPOSITORY_DELETION" => Some("TRUE".into()),
            _ => None,
        });

        assert_eq!(
            config.vault.connection(),
            Some(VaultConnection {
                address: "https://vault.acme.dev".into(),
                token: "hvs.token".into(),
            })
        );
        assert!(config.allow_repository_deletion);
        assert_eq!(config.doppler.connection(), Some(DopplerConnection { token: None }));
        Ok(())
    }

    #[test]
    fn it_treats_a_disabled_store_as_disconnected() {
        let mut config = StackConfig::new("acme");
        config.vault.token = Some("hvs.token".into());
        config.doppler.enabled = false;

        assert_eq!(config.vault.connection(), None);
        assert_eq!(config.doppler.connection(), None);
    }

    #[test]
    fn it_only_requires_a_token_for_the_kv_store() {
        let mut config = StackConfig::new("acme");
        config.vault.enabled = true;
        config.vault.address = "https://vault.acme.dev".into();

        assert_eq!(config.vault.connection(), None);
        assert_eq!(
            config.doppler.connection(),
            Some(DopplerConnection { token: None })
        );
    }

    #[test]
    fn it_reports_an_unconfigured_cloud_as_empty() {
        let config = StackConfig::new("acme");
        let registry = config.registry(Provider::Aws);

        assert_eq!(registry.map(|registry| registry.is_empty()), Some(true));
    }
}
