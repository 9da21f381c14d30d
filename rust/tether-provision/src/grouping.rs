use indexmap::{IndexMap, IndexSet};
use serde::{Serialize, Serializer, ser::SerializeMap};
use tether_model::ScopeId;

use crate::ScopedAccess;

/// The scopes that need one-time setup: every distinct primary scope, in
/// first-seen order.
pub fn unique_scopes(eligible: &[ScopedAccess]) -> Vec<ScopeId> {
    eligible
        .iter()
        .map(|access| access.primary_scope.clone())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// The reverse index `scope → repositories`.
///
/// Keys iterate in first-seen order. Values have set semantics: a repository
/// touching a scope more than once (say, linked to its own primary scope) is
/// listed once, so the membership of each scope is independent of the order
/// repositories were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeMembership {
    members: IndexMap<ScopeId, IndexSet<String>>,
}

impl ScopeMembership {
    /// Fold eligible accesses into a membership index, keyed by every scope
    /// each access touches (primary and linked).
    pub fn from_eligible(eligible: &[ScopedAccess]) -> Self {
        eligible
            .iter()
            .fold(ScopeMembership::default(), |mut membership, access| {
                for scope in access.scopes() {
                    membership.insert(scope, &access.repository);
                }
                membership
            })
    }

    /// Record that `repository` touches `scope`.
    pub fn insert(&mut self, scope: ScopeId, repository: impl Into<String>) {
        self.members
            .entry(scope)
            .or_default()
            .insert(repository.into());
    }

    /// Repositories touching `scope`, in first-seen order.
    pub fn get(&self, scope: &ScopeId) -> Vec<&str> {
        self.members
            .get(scope)
            .map(|repositories| repositories.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `repository` touches `scope`.
    pub fn contains(&self, scope: &ScopeId, repository: &str) -> bool {
        self.members
            .get(scope)
            .is_some_and(|repositories| repositories.contains(repository))
    }

    /// Scopes with at least one member, in first-seen order.
    pub fn scopes(&self) -> impl Iterator<Item = &ScopeId> {
        self.members.keys()
    }

    /// Every (scope, repository) pair.
    pub fn pairs(&self) -> impl Iterator<Item = (&ScopeId, &str)> {
        self.members.iter().flat_map(|(scope, repositories)| {
            repositories
                .iter()
                .map(move |repository| (scope, repository.as_str()))
        })
    }

    /// The number of scopes with at least one member.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no repository touches any scope.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Serialize for ScopeMembership {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.members.len()))?;
        for (scope, repositories) in &self.members {
            map.serialize_entry(scope, &repositories.iter().collect::<Vec<_>>())?;
        }
        map.end()
    }
}
