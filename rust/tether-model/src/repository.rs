use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Destination, Provider, ScopeId, defaults};

/// Visibility of a repository on the source host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Anyone can read the repository.
    #[default]
    Public,
    /// Only collaborators can read the repository.
    Private,
    /// Members of the owning organization can read the repository.
    Internal,
}

impl Visibility {
    /// The lowercase visibility name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }
}

/// A repository definition, as loaded from the repository catalog.
///
/// Field names follow the catalog's YAML files (`camelCase`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDescriptor {
    /// Unique, stable repository name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Repository visibility.
    #[serde(default)]
    pub visibility: Visibility,
    /// Archive instead of deleting.
    #[serde(default)]
    pub protected: bool,
    /// Repository topics.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Homepage URL.
    #[serde(default)]
    pub homepage: Option<String>,
    /// Enable the wiki.
    #[serde(default)]
    pub enable_wiki: bool,
    /// Enable discussions.
    #[serde(default)]
    pub enable_discussions: bool,
    /// Request a project board.
    #[serde(default)]
    pub create_project: bool,
    /// Branch serving pages.
    #[serde(default)]
    pub pages_branch: Option<String>,
    /// Branch and tag rulesets.
    #[serde(default)]
    pub rulesets: Option<RulesetsConfig>,
    /// Declared access intents.
    #[serde(default)]
    pub access_permissions: AccessPermissions,
}

impl RepositoryDescriptor {
    /// Create a descriptor with no access intents.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            visibility: Visibility::default(),
            protected: false,
            topics: Vec::new(),
            homepage: None,
            enable_wiki: false,
            enable_discussions: false,
            create_project: false,
            pages_branch: None,
            rulesets: None,
            access_permissions: AccessPermissions::default(),
        }
    }

    /// Whether the repository is private.
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// The branch serving pages.
    pub fn pages_branch(&self) -> &str {
        self.pages_branch.as_deref().unwrap_or(defaults::PAGES_BRANCH)
    }

    /// The cloud access intent for a scoped provider, if one is declared.
    ///
    /// Only project-based clouds support linked scopes; an account-based
    /// intent never carries any.
    pub fn cloud_intent(&self, provider: Provider) -> Option<CloudAccessIntent> {
        match provider {
            Provider::Aws => self.access_permissions.aws.as_ref().map(|aws| CloudAccessIntent {
                primary_scope: aws.account.clone(),
                region: aws.region.clone(),
                extra_permissions: aws.iam_permissions.iter().cloned().collect(),
                linked_scopes: IndexMap::new(),
            }),
            Provider::Google => {
                self.access_permissions
                    .google
                    .as_ref()
                    .map(|google| CloudAccessIntent {
                        primary_scope: google.project.clone(),
                        region: google.region.clone(),
                        extra_permissions: google.iam_permissions.iter().cloned().collect(),
                        linked_scopes: google.linked_projects.clone(),
                    })
            }
            Provider::Pulumi | Provider::Tailscale => None,
        }
    }

    /// Whether the repository requested the given unscoped integration.
    pub fn wants(&self, provider: Provider) -> bool {
        match provider {
            Provider::Aws => self.access_permissions.aws.is_some(),
            Provider::Google => self.access_permissions.google.is_some(),
            Provider::Pulumi => self.access_permissions.pulumi.unwrap_or(false),
            Provider::Tailscale => self.access_permissions.tailscale.unwrap_or(false),
        }
    }

    /// Whether the repository opted into the given secret destination.
    pub fn opted_into(&self, destination: Destination) -> bool {
        match destination {
            Destination::Doppler => self
                .access_permissions
                .doppler
                .unwrap_or(defaults::DOPPLER_OPT_IN),
            Destination::Vault => self
                .access_permissions
                .vault
                .as_ref()
                .map(|vault| vault.enabled)
                .unwrap_or(defaults::VAULT_OPT_IN),
        }
    }
}

/// Everything a repository asks to be wired up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPermissions {
    /// Token issuer access token.
    #[serde(default)]
    pub pulumi: Option<bool>,
    /// VPN/mesh OAuth client.
    #[serde(default)]
    pub tailscale: Option<bool>,
    /// Team config store opt-in.
    #[serde(default)]
    pub doppler: Option<bool>,
    /// Versioned KV store opt-in and extra mounts.
    #[serde(default)]
    pub vault: Option<VaultAccess>,
    /// Project-based cloud access.
    #[serde(default)]
    pub google: Option<GoogleAccess>,
    /// Account-based cloud access.
    #[serde(default)]
    pub aws: Option<AwsAccess>,
}

/// Versioned KV store access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultAccess {
    /// Whether the repository receives a store.
    #[serde(default = "defaults::vault_opt_in")]
    pub enabled: bool,
    /// Overrides the stack's store address.
    #[serde(default)]
    pub address: Option<String>,
    /// Extra mounts the repository's CI may access.
    #[serde(default)]
    pub additional_mounts: Vec<AdditionalMount>,
}

/// An extra KV mount granted to a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMount {
    /// Mount path.
    pub path: String,
    /// Whether the mount is created for the repository.
    #[serde(default)]
    pub create: bool,
    /// Policy capabilities, e.g. `read`, `list`.
    pub permissions: Vec<String>,
}

/// Account-based cloud access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccess {
    /// The account the repository's identity lives in.
    #[serde(default)]
    pub account: Option<ScopeId>,
    /// Overrides the provider's default region.
    #[serde(default)]
    pub region: Option<String>,
    /// Permissions granted on top of the baseline.
    #[serde(default)]
    pub iam_permissions: Vec<String>,
}

/// Project-based cloud access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAccess {
    /// The project the repository's identity lives in.
    #[serde(default)]
    pub project: Option<ScopeId>,
    /// Overrides the provider's default region.
    #[serde(default)]
    pub region: Option<String>,
    /// Permissions granted on top of the baseline.
    #[serde(default)]
    pub iam_permissions: Vec<String>,
    /// Secondary projects the identity also operates in.
    #[serde(default, deserialize_with = "linked_scopes")]
    pub linked_projects: IndexMap<ScopeId, LinkedAccess>,
    /// Services enabled in every project the repository touches.
    #[serde(default)]
    pub enabled_services: Vec<String>,
    /// Request object-storage access keys.
    #[serde(default)]
    pub hmac_key: bool,
}

/// How much of a repository's access carries over into a linked scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Same permissions as the primary scope.
    Full,
    /// Baseline permissions only.
    #[default]
    Restricted,
}

/// Access to a linked scope. What is granted there derives from the access
/// level and the repository's own permissions; a link carries no
/// permissions of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccess {
    /// Access level in the linked scope.
    #[serde(default)]
    pub access_level: AccessLevel,
}

impl LinkedAccess {
    /// A linked scope at the given access level.
    pub fn new(access_level: AccessLevel) -> Self {
        Self { access_level }
    }
}

/// Linked scopes are written either as a mapping from scope to access, or as
/// a plain list of scopes at the default access level.
fn linked_scopes<'de, D>(deserializer: D) -> Result<IndexMap<ScopeId, LinkedAccess>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Map(IndexMap<ScopeId, Option<LinkedAccess>>),
        List(Vec<ScopeId>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Map(map) => map
            .into_iter()
            .map(|(scope, access)| (scope, access.unwrap_or_default()))
            .collect(),
        Raw::List(list) => list
            .into_iter()
            .map(|scope| (scope, LinkedAccess::default()))
            .collect(),
    })
}

/// The provider-neutral view of one repository's access to one cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAccessIntent {
    /// The scope the identity lives in; absent when the repository forgot to
    /// name one.
    pub primary_scope: Option<ScopeId>,
    /// Region override.
    pub region: Option<String>,
    /// Additional permissions, deduplicated, in declaration order.
    pub extra_permissions: IndexSet<String>,
    /// Secondary scopes.
    pub linked_scopes: IndexMap<ScopeId, LinkedAccess>,
}

impl CloudAccessIntent {
    /// An intent for the given primary scope with nothing else declared.
    pub fn new(primary_scope: impl Into<ScopeId>) -> Self {
        Self {
            primary_scope: Some(primary_scope.into()),
            region: None,
            extra_permissions: IndexSet::new(),
            linked_scopes: IndexMap::new(),
        }
    }

    /// Every scope the intent touches: the primary scope first, then each
    /// linked scope that differs from it.
    pub fn scopes(&self) -> Vec<ScopeId> {
        let mut scopes: IndexSet<ScopeId> = IndexSet::new();
        if let Some(primary) = &self.primary_scope {
            scopes.insert(primary.clone());
        }
        scopes.extend(self.linked_scopes.keys().cloned());
        scopes.into_iter().collect()
    }
}

/// Branch and tag rulesets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesetsConfig {
    /// Branch ruleset.
    #[serde(default)]
    pub branch: Option<RulesetConfig>,
    /// Tag ruleset.
    #[serde(default)]
    pub tag: Option<RulesetConfig>,
}

/// A single ruleset. Unset fields take their value from [crate::defaults].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct RulesetConfig {
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
    pub restrict_creation: Option<bool>,
    pub allow_force_push: Option<bool>,
    pub require_conversation_resolution: Option<bool>,
    pub require_signed_commits: Option<bool>,
    pub require_code_owner_review: Option<bool>,
    pub approving_review_count: Option<u32>,
    pub require_last_push_approval: Option<bool>,
    pub require_updated_branch_before_merge: Option<bool>,
    #[serde(default)]
    pub required_checks: Option<Vec<String>>,
    pub allow_bypass: Option<bool>,
    #[serde(default)]
    pub allow_bypass_integrations: Vec<u64>,
}

#[allow(missing_docs)]
impl RulesetConfig {
    pub fn restrict_creation(&self) -> bool {
        self.restrict_creation.unwrap_or(defaults::RESTRICT_CREATION)
    }

    pub fn allow_force_push(&self) -> bool {
        self.allow_force_push.unwrap_or(defaults::ALLOW_FORCE_PUSH)
    }

    pub fn require_conversation_resolution(&self) -> bool {
        self.require_conversation_resolution
            .unwrap_or(defaults::REQUIRE_CONVERSATION_RESOLUTION)
    }

    pub fn require_signed_commits(&self) -> bool {
        self.require_signed_commits
            .unwrap_or(defaults::REQUIRE_SIGNED_COMMITS)
    }

    pub fn require_code_owner_review(&self) -> bool {
        self.require_code_owner_review
            .unwrap_or(defaults::REQUIRE_CODE_OWNER_REVIEW)
    }

    pub fn approving_review_count(&self) -> u32 {
        self.approving_review_count
            .unwrap_or(defaults::APPROVING_REVIEW_COUNT)
    }

    pub fn require_last_push_approval(&self) -> bool {
        self.require_last_push_approval
            .unwrap_or(defaults::REQUIRE_LAST_PUSH_APPROVAL)
    }

    pub fn require_updated_branch_before_merge(&self) -> bool {
        self.require_updated_branch_before_merge
            .unwrap_or(defaults::REQUIRE_UPDATED_BRANCH_BEFORE_MERGE)
    }

    pub fn allow_bypass(&self) -> bool {
        self.allow_bypass.unwrap_or(defaults::ALLOW_BYPASS)
    }
}
