use indexmap::IndexSet;
use serde::Serialize;
use tether_model::{AccessLevel, Provider, ScopeId};

use crate::ScopedAccess;

/// Baseline permissions of every account-based CI identity.
pub const AWS_BASELINE: &[&str] = &["iam:*", "s3:*", "kms:*"];

/// Baseline permissions of every project-based CI identity.
pub const GOOGLE_BASELINE: &[&str] = &[
    "cloudkms.cryptoKeyVersions.useToDecrypt",
    "cloudkms.cryptoKeyVersions.useToEncrypt",
    "cloudkms.cryptoKeys.getIamPolicy",
    "cloudkms.cryptoKeys.setIamPolicy",
    "cloudkms.locations.get",
    "cloudkms.locations.list",
    "iam.serviceAccountKeys.create",
    "iam.serviceAccountKeys.delete",
    "iam.serviceAccountKeys.disable",
    "iam.serviceAccountKeys.enable",
    "iam.serviceAccountKeys.get",
    "iam.serviceAccountKeys.list",
    "iam.serviceAccounts.create",
    "iam.serviceAccounts.delete",
    "iam.serviceAccounts.disable",
    "iam.serviceAccounts.enable",
    "iam.serviceAccounts.get",
    "iam.serviceAccounts.getIamPolicy",
    "iam.serviceAccounts.list",
    "iam.serviceAccounts.setIamPolicy",
    "iam.serviceAccounts.undelete",
    "iam.serviceAccounts.update",
    "resourcemanager.projects.get",
    "resourcemanager.projects.getIamPolicy",
    "resourcemanager.projects.setIamPolicy",
    "resourcemanager.projects.update",
    "storage.hmacKeys.create",
    "storage.hmacKeys.delete",
    "storage.hmacKeys.get",
    "storage.hmacKeys.list",
    "storage.hmacKeys.update",
    "storage.buckets.create",
    "storage.buckets.createTagBinding",
    "storage.buckets.delete",
    "storage.buckets.deleteTagBinding",
    "storage.buckets.get",
    "storage.buckets.getIamPolicy",
    "storage.buckets.getObjectInsights",
    "storage.buckets.list",
    "storage.buckets.listEffectiveTags",
    "storage.buckets.listTagBindings",
    "storage.buckets.setIamPolicy",
    "storage.buckets.update",
    "storage.multipartUploads.abort",
    "storage.multipartUploads.create",
    "storage.multipartUploads.list",
    "storage.multipartUploads.listParts",
    "storage.objects.create",
    "storage.objects.delete",
    "storage.objects.get",
    "storage.objects.getIamPolicy",
    "storage.objects.list",
    "storage.objects.setIamPolicy",
    "storage.objects.update",
];

/// The fixed baseline of a scoped provider. Unscoped providers grant no
/// cloud permissions.
pub fn baseline(provider: Provider) -> &'static [&'static str] {
    match provider {
        Provider::Aws => AWS_BASELINE,
        Provider::Google => GOOGLE_BASELINE,
        Provider::Pulumi | Provider::Tailscale => &[],
    }
}

/// An ordered, duplicate-free set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(IndexSet<String>);

impl PermissionSet {
    /// Whether the set grants `permission`.
    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Permissions in grant order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The number of permissions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Permissions in grant order.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S> FromIterator<S> for PermissionSet
where
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S> Extend<S> for PermissionSet
where
    S: Into<String>,
{
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// Compose the permissions `access` is granted in `scope`.
///
/// | Scope | Granted |
/// |---|---|
/// | primary | baseline ∪ extra |
/// | linked, `full` | baseline ∪ extra |
/// | linked, `restricted` (default) | baseline |
///
/// Returns `None` for a scope the access does not touch.
pub fn compose(
    baseline: &[&str],
    access: &ScopedAccess,
    scope: &ScopeId,
) -> Option<PermissionSet> {
    let mut permissions: PermissionSet = baseline.iter().copied().collect();

    if scope == &access.primary_scope {
        permissions.extend(access.extra_permissions.iter().cloned());
        return Some(permissions);
    }

    let link = access.linked_scopes.get(scope)?;
    if link.access_level == AccessLevel::Full {
        permissions.extend(access.extra_permissions.iter().cloned());
    }
    Some(permissions)
}
