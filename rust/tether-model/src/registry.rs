use indexmap::{IndexMap, IndexSet};

use crate::{Provider, ScopeId};

/// The fleet-wide allow-list of scopes for one provider.
///
/// A scope must appear here before any repository may use it. The registry is
/// read-only for the whole of a provisioning run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeRegistry {
    provider: Provider,
    default_region: String,
    allowed: IndexSet<ScopeId>,
    flags: IndexMap<&'static str, bool>,
}

impl ScopeRegistry {
    /// Object-storage access keys may be derived for identities.
    pub const ALLOW_HMAC_KEYS: &'static str = "allow_hmac_keys";

    /// Create a registry.
    pub fn new<I>(provider: Provider, default_region: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = ScopeId>,
    {
        Self {
            provider,
            default_region: default_region.into(),
            allowed: allowed.into_iter().collect(),
            flags: IndexMap::new(),
        }
    }

    /// Set a provider-specific flag.
    pub fn with_flag(mut self, flag: &'static str, value: bool) -> Self {
        self.flags.insert(flag, value);
        self
    }

    /// The provider this registry belongs to.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Region used when a repository does not name one.
    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Whether the scope may be used.
    pub fn contains(&self, scope: &ScopeId) -> bool {
        self.allowed.contains(scope)
    }

    /// Allowed scopes, in configuration order.
    pub fn allowed(&self) -> impl Iterator<Item = &ScopeId> {
        self.allowed.iter()
    }

    /// Whether no scope is allowed.
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// A provider-specific flag; unset flags are off.
    pub fn flag(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }
}
