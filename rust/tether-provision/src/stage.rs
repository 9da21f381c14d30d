use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tether_common::Deferred;
use tether_engine::Rejection;
use tether_model::Provider;
use tracing::info;

use crate::TetherProvisionError;

/// Where provisioning of one repository for one provider stands.
///
/// ```text
/// Unvalidated ─┬─> Validated ─> FederationReady ─> IdentityCreated ─> GrantsApplied ─> CredentialsDistributed
///              └─> Excluded
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Not looked at yet.
    #[default]
    Unvalidated,
    /// The access intent passed validation.
    Validated,
    /// The access intent failed validation. Terminal.
    Excluded,
    /// The scope's federation trust exists.
    FederationReady,
    /// The repository's identity exists.
    IdentityCreated,
    /// Every grant and binding of the identity exists.
    GrantsApplied,
    /// Credentials were written to every opted-in destination. Terminal.
    CredentialsDistributed,
}

impl Stage {
    /// Whether `next` directly follows this stage.
    pub fn precedes(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Unvalidated, Stage::Validated)
                | (Stage::Unvalidated, Stage::Excluded)
                | (Stage::Validated, Stage::FederationReady)
                | (Stage::FederationReady, Stage::IdentityCreated)
                | (Stage::IdentityCreated, Stage::GrantsApplied)
                | (Stage::GrantsApplied, Stage::CredentialsDistributed)
        )
    }

    /// The snake_case stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Unvalidated => "unvalidated",
            Stage::Validated => "validated",
            Stage::Excluded => "excluded",
            Stage::FederationReady => "federation_ready",
            Stage::IdentityCreated => "identity_created",
            Stage::GrantsApplied => "grants_applied",
            Stage::CredentialsDistributed => "credentials_distributed",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stage of one (repository, provider) pair, and the failure that
/// stopped it, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// The last stage reached.
    pub stage: Stage,
    /// The failure that kept the pair from reaching the next stage.
    pub failure: Option<Rejection>,
}

/// Tracks every (repository, provider) pair through the stages of
/// provisioning.
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    entries: Arc<Mutex<IndexMap<(String, Provider), Progress>>>,
}

impl StageTracker {
    /// Move a pair to `stage`, which must directly follow its current one.
    pub fn advance(
        &self,
        repository: &str,
        provider: Provider,
        stage: Stage,
    ) -> Result<(), TetherProvisionError> {
        let mut entries = self.entries.lock();
        let progress = entries
            .entry((repository.to_string(), provider))
            .or_default();

        if !progress.stage.precedes(stage) {
            return Err(TetherProvisionError::StageOrder {
                repository: repository.to_string(),
                provider,
                from: progress.stage,
                to: stage,
            });
        }
        progress.stage = stage;
        Ok(())
    }

    /// Record the failure that stopped a pair at its current stage.
    pub fn fail(&self, repository: &str, provider: Provider, rejection: Rejection) {
        self.entries
            .lock()
            .entry((repository.to_string(), provider))
            .or_default()
            .failure = Some(rejection);
    }

    /// The progress of a pair. Pairs never seen are unvalidated.
    pub fn progress(&self, repository: &str, provider: Provider) -> Progress {
        self.entries
            .lock()
            .get(&(repository.to_string(), provider))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a pair reached its final stage.
    pub fn completed(&self, repository: &str, provider: Provider) -> bool {
        self.progress(repository, provider).stage == Stage::CredentialsDistributed
    }

    /// Every tracked pair, in the order it was first seen.
    pub fn entries(&self) -> Vec<(String, Provider, Progress)> {
        self.entries
            .lock()
            .iter()
            .map(|((repository, provider), progress)| {
                (repository.clone(), *provider, progress.clone())
            })
            .collect()
    }
}

/// The deferred steps of one validated (repository, provider) pipeline,
/// grouped by the stage their completion reaches.
#[derive(Debug, Clone)]
pub struct Pipeline {
    repository: String,
    provider: Provider,
    federation: Vec<Deferred<(), Rejection>>,
    identity: Vec<Deferred<(), Rejection>>,
    grants: Vec<Deferred<(), Rejection>>,
    credentials: Vec<Deferred<(), Rejection>>,
}

impl Pipeline {
    /// An empty pipeline. Stages with no steps are reached as soon as the
    /// previous stage is.
    pub fn new(repository: impl Into<String>, provider: Provider) -> Self {
        Self {
            repository: repository.into(),
            provider,
            federation: Vec::new(),
            identity: Vec::new(),
            grants: Vec::new(),
            credentials: Vec::new(),
        }
    }

    /// The repository this pipeline provisions.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The provider this pipeline provisions.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// A step completing [Stage::FederationReady].
    pub fn federation(&mut self, step: Deferred<(), Rejection>) -> &mut Self {
        self.federation.push(step);
        self
    }

    /// A step completing [Stage::IdentityCreated].
    pub fn identity(&mut self, step: Deferred<(), Rejection>) -> &mut Self {
        self.identity.push(step);
        self
    }

    /// A step completing [Stage::GrantsApplied].
    pub fn grant(&mut self, step: Deferred<(), Rejection>) -> &mut Self {
        self.grants.push(step);
        self
    }

    /// A step completing [Stage::CredentialsDistributed].
    pub fn credential(&mut self, step: Deferred<(), Rejection>) -> &mut Self {
        self.credentials.push(step);
        self
    }

    /// Resolves once every federation, identity and grant step has been
    /// realized, and rejects with the first failure among them otherwise.
    /// Credentials of the pipeline are only written after it resolves.
    pub fn granted(&self) -> Deferred<(), Rejection> {
        Deferred::all(
            self.federation
                .iter()
                .chain(&self.identity)
                .chain(&self.grants)
                .cloned(),
        )
        .apply(|_| ())
    }

    /// Follow the pipeline's steps, advancing `tracker` as each stage
    /// completes. Returns the last stage reached; a failed step is recorded
    /// in `tracker` and stops the pipeline there.
    pub async fn track(self, tracker: StageTracker) -> Result<Stage, TetherProvisionError> {
        let Pipeline {
            repository,
            provider,
            federation,
            identity,
            grants,
            credentials,
        } = self;

        let mut reached = Stage::Validated;
        for (stage, steps) in [
            (Stage::FederationReady, federation),
            (Stage::IdentityCreated, identity),
            (Stage::GrantsApplied, grants),
            (Stage::CredentialsDistributed, credentials),
        ] {
            if let Err(rejection) = Deferred::all(steps).await {
                tracker.fail(&repository, provider, rejection);
                return Ok(reached);
            }
            tracker.advance(&repository, provider, stage)?;
            reached = stage;
        }

        info!(%repository, %provider, "credentials distributed");
        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tether_common::Deferred;
    use tether_engine::Rejection;
    use tether_model::Provider;
    use testresult::TestResult;

    use super::{Pipeline, Stage, StageTracker};
    use crate::TetherProvisionError;

    #[test]
    fn it_only_moves_forward_one_stage_at_a_time() -> TestResult {
        let tracker = StageTracker::default();

        tracker.advance("svc-a", Provider::Aws, Stage::Validated)?;
        let skipped = tracker.advance("svc-a", Provider::Aws, Stage::GrantsApplied);

        assert_eq!(
            skipped,
            Err(TetherProvisionError::StageOrder {
                repository: "svc-a".into(),
                provider: Provider::Aws,
                from: Stage::Validated,
                to: Stage::GrantsApplied,
            })
        );
        assert!(
            tracker
                .advance("svc-a", Provider::Aws, Stage::Excluded)
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn it_treats_exclusion_as_terminal() -> TestResult {
        let tracker = StageTracker::default();

        tracker.advance("svc-c", Provider::Aws, Stage::Excluded)?;

        assert!(
            tracker
                .advance("svc-c", Provider::Aws, Stage::Validated)
                .is_err()
        );
        assert_eq!(tracker.progress("svc-c", Provider::Google).stage, Stage::Unvalidated);
        Ok(())
    }

    #[tokio::test]
    async fn it_tracks_a_pipeline_to_completion() -> TestResult {
        let tracker = StageTracker::default();
        tracker.advance("svc-a", Provider::Aws, Stage::Validated)?;

        let mut pipeline = Pipeline::new("svc-a", Provider::Aws);
        pipeline
            .federation(Deferred::resolved(()))
            .identity(Deferred::resolved(()))
            .credential(Deferred::resolved(()));

        assert_eq!(
            pipeline.track(tracker.clone()).await?,
            Stage::CredentialsDistributed
        );
        assert!(tracker.completed("svc-a", Provider::Aws));
        Ok(())
    }

    #[tokio::test]
    async fn it_stops_at_the_first_failed_stage() -> TestResult {
        let tracker = StageTracker::default();
        tracker.advance("svc-a", Provider::Google, Stage::Validated)?;
        let rejection = Rejection::new("gcp-iam-role-ci-svc-a@main", "denied");

        let mut pipeline = Pipeline::new("svc-a", Provider::Google);
        pipeline
            .federation(Deferred::resolved(()))
            .identity(Deferred::resolved(()))
            .grant(Deferred::rejected(rejection.clone()))
            .credential(Deferred::resolved(()));

        assert_eq!(
            pipeline.track(tracker.clone()).await?,
            Stage::IdentityCreated
        );
        let progress = tracker.progress("svc-a", Provider::Google);
        assert_eq!(progress.stage, Stage::IdentityCreated);
        assert_eq!(progress.failure, Some(rejection));
        Ok(())
    }
}
