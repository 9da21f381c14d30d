use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TetherEngineError;

/// The kinds of objects the execution engine knows how to realize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ResourceKind {
    AwsProvider,
    AwsOidcProvider,
    AwsRole,
    AwsPolicy,
    AwsRolePolicyAttachment,
    GoogleProvider,
    GoogleProjectService,
    GoogleWorkloadIdentityPool,
    GoogleWorkloadIdentityPoolProvider,
    GoogleCustomRole,
    GoogleServiceAccount,
    GoogleProjectIamMember,
    GoogleServiceAccountIamBinding,
    GoogleHmacKey,
    GithubRepository,
    GithubRuleset,
    GithubActionsSecret,
    DopplerProject,
    DopplerEnvironment,
    DopplerSecret,
    VaultMount,
    VaultPolicy,
    VaultJwtRole,
    VaultSecret,
    PulumiAccessToken,
}

impl ResourceKind {
    /// The snake_case kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::AwsProvider => "aws_provider",
            ResourceKind::AwsOidcProvider => "aws_oidc_provider",
            ResourceKind::AwsRole => "aws_role",
            ResourceKind::AwsPolicy => "aws_policy",
            ResourceKind::AwsRolePolicyAttachment => "aws_role_policy_attachment",
            ResourceKind::GoogleProvider => "google_provider",
            ResourceKind::GoogleProjectService => "google_project_service",
            ResourceKind::GoogleWorkloadIdentityPool => "google_workload_identity_pool",
            ResourceKind::GoogleWorkloadIdentityPoolProvider => {
                "google_workload_identity_pool_provider"
            }
            ResourceKind::GoogleCustomRole => "google_custom_role",
            ResourceKind::GoogleServiceAccount => "google_service_account",
            ResourceKind::GoogleProjectIamMember => "google_project_iam_member",
            ResourceKind::GoogleServiceAccountIamBinding => "google_service_account_iam_binding",
            ResourceKind::GoogleHmacKey => "google_hmac_key",
            ResourceKind::GithubRepository => "github_repository",
            ResourceKind::GithubRuleset => "github_ruleset",
            ResourceKind::GithubActionsSecret => "github_actions_secret",
            ResourceKind::DopplerProject => "doppler_project",
            ResourceKind::DopplerEnvironment => "doppler_environment",
            ResourceKind::DopplerSecret => "doppler_secret",
            ResourceKind::VaultMount => "vault_mount",
            ResourceKind::VaultPolicy => "vault_policy",
            ResourceKind::VaultJwtRole => "vault_jwt_role",
            ResourceKind::VaultSecret => "vault_secret",
            ResourceKind::PulumiAccessToken => "pulumi_access_token",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared object: what should exist, not how to make it exist.
///
/// `name` is the object's logical name. It is a deterministic function of
/// what the object is for, so that a repeated run declares the same names
/// and the engine converges on existing objects instead of duplicating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Logical name, unique within a run.
    pub name: String,
    /// What kind of object this is.
    pub kind: ResourceKind,
    /// The scope-bound provider handle the object is created through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Object arguments.
    pub inputs: Map<String, Value>,
    /// Declarations that must be realized first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Declaration {
    /// Declare an object of `kind` named `name`.
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            provider: None,
            inputs: Map::new(),
            depends_on: Vec::new(),
        }
    }

    /// Create the object through the named provider handle. The handle is
    /// also a dependency.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        self = self.depends_on(provider.clone());
        self.provider = Some(provider);
        self
    }

    /// Set an input.
    pub fn input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// Add an explicit dependency.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.depends_on.contains(&name) {
            self.depends_on.push(name);
        }
        self
    }

    /// Add several explicit dependencies.
    pub fn depends_on_all<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, Declaration::depends_on)
    }

    /// A string input, if present.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }
}

/// Values reported by the engine once an object exists (identifiers, ARNs,
/// generated credentials).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outputs {
    #[serde(skip)]
    name: String,
    values: BTreeMap<String, String>,
}

impl Outputs {
    /// Outputs of the object named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Record an output.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// An output, if reported.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// An output that must have been reported.
    pub fn require(&self, key: &str) -> Result<String, TetherEngineError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| TetherEngineError::MissingOutput {
                name: self.name.clone(),
                key: key.to_string(),
            })
    }

    /// All outputs.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}
