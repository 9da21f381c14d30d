use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

/// An opaque provider-specific administrative boundary: an account id for
/// account-based clouds, a project id for project-based ones.
///
/// Account ids are frequently written as bare numbers in repository files, so
/// a [ScopeId] deserializes from either a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    /// Create a scope id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The scope id as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ScopeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ScopeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number.to_string()),
        })
    }
}

/// A provider domain for which credentials are provisioned and distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Account-based cloud (AWS).
    Aws,
    /// Project-based cloud (Google Cloud).
    Google,
    /// Token issuer integration (Pulumi Cloud).
    Pulumi,
    /// VPN/mesh integration (Tailscale).
    Tailscale,
}

impl Provider {
    /// Every provider, in reporting order.
    pub const ALL: [Provider; 4] = [
        Provider::Aws,
        Provider::Google,
        Provider::Pulumi,
        Provider::Tailscale,
    ];

    /// The lowercase provider name used in object names and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Google => "google",
            Provider::Pulumi => "pulumi",
            Provider::Tailscale => "tailscale",
        }
    }

    /// Whether repositories reach this provider through scopes.
    pub fn is_scoped(&self) -> bool {
        matches!(self, Provider::Aws | Provider::Google)
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external secret store a repository may opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Team config store (Doppler).
    Doppler,
    /// Generic versioned KV store (Vault KV v2).
    Vault,
}

impl Destination {
    /// Every destination, in reporting order.
    pub const ALL: [Destination; 2] = [Destination::Doppler, Destination::Vault];

    /// The lowercase destination name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Doppler => "doppler",
            Destination::Vault => "vault",
        }
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ScopeId;

    #[test]
    fn it_reads_numeric_and_textual_scope_ids() {
        let ids: Vec<ScopeId> = serde_yaml::from_str("[123456789012, \"my-project\"]").unwrap();

        assert_eq!(ids, vec![ScopeId::from("123456789012"), ScopeId::from("my-project")]);
    }
}
