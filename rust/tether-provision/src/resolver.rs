use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tether_model::{
    LinkedAccess, Provider, RepositoryCatalog, RepositoryDescriptor, ScopeId, ScopeRegistry,
};
use tracing::warn;

/// A repository's validated access to one scoped provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedAccess {
    /// The repository.
    pub repository: String,
    /// The scope the repository's identity lives in.
    pub primary_scope: ScopeId,
    /// Effective region (the repository's override or the provider default).
    pub region: String,
    /// Permissions requested on top of the baseline.
    pub extra_permissions: IndexSet<String>,
    /// Secondary scopes, all registered.
    pub linked_scopes: IndexMap<ScopeId, LinkedAccess>,
}

impl ScopedAccess {
    /// Every scope the access touches: the primary scope first, then each
    /// linked scope that differs from it.
    pub fn scopes(&self) -> Vec<ScopeId> {
        let mut scopes = IndexSet::new();
        scopes.insert(self.primary_scope.clone());
        scopes.extend(self.linked_scopes.keys().cloned());
        scopes.into_iter().collect()
    }

    /// Whether the access touches `scope`.
    pub fn touches(&self, scope: &ScopeId) -> bool {
        &self.primary_scope == scope || self.linked_scopes.contains_key(scope)
    }
}

/// Why a repository was left out of a provider's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The repository asked for access without naming a scope.
    MissingScope,
    /// The repository named a scope that is not in the registry.
    UnregisteredScope,
    /// The provider is not configured for this stack.
    UnconfiguredProvider,
}

/// A repository excluded from one provider's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    /// The provider the repository was excluded from.
    pub provider: Provider,
    /// The excluded repository.
    pub repository: String,
    /// The offending scope, when there is one.
    pub scope: Option<ScopeId>,
    /// Why the repository was excluded.
    pub reason: ExclusionReason,
}

impl Exclusion {
    pub(crate) fn new(
        provider: Provider,
        repository: impl Into<String>,
        scope: Option<ScopeId>,
        reason: ExclusionReason,
    ) -> Self {
        let exclusion = Self {
            provider,
            repository: repository.into(),
            scope,
            reason,
        };
        match &exclusion.scope {
            Some(scope) => warn!(
                provider = %exclusion.provider,
                repository = %exclusion.repository,
                scope = %scope,
                reason = ?exclusion.reason,
                "the repository references an unconfigured scope"
            ),
            None => warn!(
                provider = %exclusion.provider,
                repository = %exclusion.repository,
                reason = ?exclusion.reason,
                "the repository was excluded"
            ),
        }
        exclusion
    }
}

/// The outcome of validating a catalog against one provider's registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Repositories eligible for provisioning, in catalog order.
    pub eligible: Vec<ScopedAccess>,
    /// Repositories left out, in catalog order.
    pub exclusions: Vec<Exclusion>,
}

/// Validate every repository's access intent for the registry's provider.
///
/// A repository is excluded (and a warning logged) when its primary scope is
/// missing or unregistered, or when any of its linked scopes is unregistered.
/// Exclusion only affects this provider: it never fails the batch.
pub fn resolve(registry: &ScopeRegistry, catalog: &RepositoryCatalog) -> Resolution {
    let mut resolution = Resolution::default();
    for repository in catalog {
        match resolve_repository(registry, repository) {
            Some(Ok(access)) => resolution.eligible.push(access),
            Some(Err(mut exclusions)) => resolution.exclusions.append(&mut exclusions),
            None => {}
        }
    }
    resolution
}

fn resolve_repository(
    registry: &ScopeRegistry,
    repository: &RepositoryDescriptor,
) -> Option<Result<ScopedAccess, Vec<Exclusion>>> {
    let provider = registry.provider();
    let intent = repository.cloud_intent(provider)?;

    let Some(primary_scope) = intent.primary_scope else {
        return Some(Err(vec![Exclusion::new(
            provider,
            &repository.name,
            None,
            ExclusionReason::MissingScope,
        )]));
    };

    let exclusions = std::iter::once(&primary_scope)
        .chain(intent.linked_scopes.keys())
        .filter(|scope| !registry.contains(scope))
        .collect::<IndexSet<_>>()
        .into_iter()
        .map(|scope| {
            Exclusion::new(
                provider,
                &repository.name,
                Some(scope.clone()),
                ExclusionReason::UnregisteredScope,
            )
        })
        .collect::<Vec<_>>();
    if !exclusions.is_empty() {
        return Some(Err(exclusions));
    }

    Some(Ok(ScopedAccess {
        repository: repository.name.clone(),
        region: intent
            .region
            .unwrap_or_else(|| registry.default_region().to_string()),
        primary_scope,
        extra_permissions: intent.extra_permissions,
        linked_scopes: intent.linked_scopes,
    }))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tether_model::{
        AccessLevel, AwsAccess, GoogleAccess, LinkedAccess, Provider, RepositoryCatalog,
        RepositoryDescriptor, ScopeId, ScopeRegistry,
    };
    use testresult::TestResult;

    use super::{ExclusionReason, resolve};

    fn aws(name: &str, account: Option<&str>) -> RepositoryDescriptor {
        let mut repository = RepositoryDescriptor::new(name);
        repository.access_permissions.aws = Some(AwsAccess {
            account: account.map(ScopeId::from),
            ..Default::default()
        });
        repository
    }

    #[test]
    fn it_excludes_missing_and_unregistered_scopes() -> TestResult {
        let registry = ScopeRegistry::new(Provider::Aws, "eu-west-1", [ScopeId::from("111")]);
        let catalog = RepositoryCatalog::new(vec![
            aws("svc-a", Some("111")),
            aws("svc-b", None),
            aws("svc-c", Some("999")),
            RepositoryDescriptor::new("svc-d"),
        ])?;

        let resolution = resolve(&registry, &catalog);

        assert_eq!(
            resolution
                .eligible
                .iter()
                .map(|access| access.repository.as_str())
                .collect::<Vec<_>>(),
            vec!["svc-a"]
        );
        assert_eq!(resolution.eligible[0].region, "eu-west-1");
        assert_eq!(
            resolution
                .exclusions
                .iter()
                .map(|exclusion| (
                    exclusion.repository.as_str(),
                    exclusion.scope.clone(),
                    exclusion.reason
                ))
                .collect::<Vec<_>>(),
            vec![
                ("svc-b", None, ExclusionReason::MissingScope),
                (
                    "svc-c",
                    Some(ScopeId::from("999")),
                    ExclusionReason::UnregisteredScope
                ),
            ]
        );
        Ok(())
    }

    #[test]
    fn it_excludes_a_repository_with_an_unregistered_linked_scope() -> TestResult {
        let registry = ScopeRegistry::new(
            Provider::Google,
            "europe-west4",
            [ScopeId::from("main"), ScopeId::from("shared")],
        );
        let mut repository = RepositoryDescriptor::new("svc-a");
        repository.access_permissions.google = Some(GoogleAccess {
            project: Some(ScopeId::from("main")),
            region: Some("us-east1".into()),
            linked_projects: [
                (ScopeId::from("shared"), LinkedAccess::new(AccessLevel::Full)),
                (ScopeId::from("rogue"), LinkedAccess::default()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        });
        let catalog = RepositoryCatalog::new(vec![repository.clone()])?;

        let resolution = resolve(&registry, &catalog);
        assert!(resolution.eligible.is_empty());
        assert_eq!(resolution.exclusions.len(), 1);
        assert_eq!(resolution.exclusions[0].scope, Some(ScopeId::from("rogue")));

        if let Some(google) = repository.access_permissions.google.as_mut() {
            google.linked_projects.shift_remove(&ScopeId::from("rogue"));
        }
        let catalog = RepositoryCatalog::new(vec![repository])?;

        let resolution = resolve(&registry, &catalog);
        assert_eq!(resolution.eligible.len(), 1);
        assert_eq!(resolution.eligible[0].region, "us-east1");
        assert_eq!(
            resolution.eligible[0].scopes(),
            vec![ScopeId::from("main"), ScopeId::from("shared")]
        );
        Ok(())
    }

    #[test]
    fn it_excludes_everything_when_the_provider_is_unconfigured() -> TestResult {
        let registry = ScopeRegistry::new(Provider::Aws, "", Vec::new());
        let catalog = RepositoryCatalog::new(vec![aws("svc-a", Some("111"))])?;

        let resolution = resolve(&registry, &catalog);

        assert!(resolution.eligible.is_empty());
        assert_eq!(resolution.exclusions.len(), 1);
        Ok(())
    }
}
