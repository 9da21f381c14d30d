use indexmap::IndexMap;
use serde::Serialize;
use tether_engine::{Rejection, Settlement};
use tether_model::{Destination, Provider, ScopeId};

use crate::{Exclusion, ScopeMembership, StageTracker, TetherProvisionError};

/// What a provisioning run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// The account-based cloud.
    pub aws: ScopeReport,
    /// The project-based cloud.
    pub google: ScopeReport,
    /// The token issuer integration.
    pub pulumi: IntegrationReport,
    /// The mesh integration.
    pub tailscale: IntegrationReport,
    /// Which providers and destinations were wired, per repository.
    pub repositories: IndexMap<String, Wiring>,
    /// Repositories left out of a provider's pipeline.
    pub exclusions: Vec<Exclusion>,
    /// Objects that could not be realized.
    pub failures: Vec<FailureReport>,
}

/// A scoped provider's allow-list and who uses what.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeReport {
    /// Allowed scopes.
    pub allowed: Vec<ScopeId>,
    /// Repositories per scope they touch.
    pub configured: ScopeMembership,
}

/// Repositories an unscoped integration was provisioned for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationReport {
    /// Repository names, in catalog order.
    pub repositories: Vec<String>,
}

/// One row of the wiring matrix. A flag is set only when every step of
/// the provider's or destination's pipeline completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Wiring {
    pub aws: bool,
    pub google: bool,
    pub gcs: bool,
    pub pulumi: bool,
    pub tailscale: bool,
    pub doppler: bool,
    pub vault: bool,
}

impl Wiring {
    /// Whether `provider` is wired.
    pub fn provider(&self, provider: Provider) -> bool {
        match provider {
            Provider::Aws => self.aws,
            Provider::Google => self.google,
            Provider::Pulumi => self.pulumi,
            Provider::Tailscale => self.tailscale,
        }
    }

    /// Whether `destination` is wired.
    pub fn destination(&self, destination: Destination) -> bool {
        match destination {
            Destination::Doppler => self.doppler,
            Destination::Vault => self.vault,
        }
    }
}

/// A (repository, provider) pair held up by a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Affected {
    /// The repository.
    pub repository: String,
    /// The provider.
    pub provider: Provider,
}

/// An object that could not be realized and everything it held up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// The object that failed.
    pub origin: String,
    /// The engine's failure report.
    pub reason: String,
    /// Declarations abandoned because of it.
    pub blocked: Vec<String>,
    /// Pairs that stopped short of distributing credentials because of it.
    pub affected: Vec<Affected>,
}

impl FailureReport {
    fn new(rejection: &Rejection) -> Self {
        Self {
            origin: rejection.origin.clone(),
            reason: rejection.reason.clone(),
            blocked: Vec::new(),
            affected: Vec::new(),
        }
    }
}

impl Report {
    /// Attribute every failure of `settlement` to the pairs it stopped.
    pub(crate) fn collect_failures(&mut self, settlement: &Settlement, stages: &StageTracker) {
        let mut failures: IndexMap<String, FailureReport> = settlement
            .failures
            .iter()
            .map(|failure| {
                let mut report = FailureReport::new(&failure.rejection);
                report.blocked = failure.blocked.clone();
                (failure.rejection.origin.clone(), report)
            })
            .collect();

        for (repository, provider, progress) in stages.entries() {
            if let Some(rejection) = progress.failure {
                failures
                    .entry(rejection.origin.clone())
                    .or_insert_with(|| FailureReport::new(&rejection))
                    .affected
                    .push(Affected {
                        repository,
                        provider,
                    });
            }
        }

        self.failures = failures.into_values().collect();
    }

    /// The report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, TetherProvisionError> {
        serde_json::to_string_pretty(self)
            .map_err(|error| TetherProvisionError::Report(error.to_string()))
    }
}
