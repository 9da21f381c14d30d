//! Source host repositories and their rulesets.

use indexmap::IndexMap;
use serde_json::{Value, json};
use tether_engine::{Declaration, DeferredOutputs, ResourceKind};
use tether_model::{RepositoryDescriptor, RulesetConfig};
use tracing::warn;

use crate::{Context, naming};

/// Patterns every branch ruleset applies to.
pub const DEFAULT_BRANCH_PATTERNS: &[&str] = &["~DEFAULT_BRANCH"];

/// Patterns every tag ruleset applies to.
pub const DEFAULT_TAG_PATTERNS: &[&str] = &[""];

/// Integration id of the CI runner reporting required status checks.
pub const ACTIONS_INTEGRATION_ID: u64 = 15368;

const MAINTAINER_ROLE_ID: u64 = 2;
const ADMIN_ROLE_ID: u64 = 5;

/// Declare every repository of the catalog, with its rulesets.
///
/// Returns the deferred outputs of each repository object, keyed by
/// repository name.
pub fn declare_repositories(context: &Context) -> IndexMap<String, DeferredOutputs> {
    context
        .catalog
        .iter()
        .map(|repository| {
            (
                repository.name.clone(),
                declare_repository(context, repository),
            )
        })
        .collect()
}

fn declare_repository(context: &Context, repository: &RepositoryDescriptor) -> DeferredOutputs {
    let owner = context.owner();
    let name = naming::github::repository(owner, &repository.name);
    let protected = !context.config.allow_repository_deletion;

    let mut topics = repository.topics.clone();
    topics.sort();

    let pages = if repository.is_private() {
        Value::Null
    } else {
        json!({
            "build_type": "workflow",
            "source": { "branch": repository.pages_branch(), "path": "/" },
        })
    };

    let outputs = context.stack.declare(
        Declaration::new(ResourceKind::GithubRepository, &name)
            .input("name", repository.name.as_str())
            .input("description", repository.description.as_str())
            .input("visibility", repository.visibility.as_str())
            .input("homepage_url", repository.homepage.clone())
            .input("topics", topics)
            .input("has_wiki", repository.enable_wiki)
            .input("has_discussions", repository.enable_discussions)
            .input("has_issues", true)
            .input("has_projects", true)
            .input("has_downloads", true)
            .input("allow_auto_merge", false)
            .input("allow_merge_commit", false)
            .input("allow_rebase_merge", true)
            .input("allow_squash_merge", false)
            .input("allow_update_branch", true)
            .input("delete_branch_on_merge", true)
            .input("archive_on_destroy", repository.protected)
            .input("vulnerability_alerts", true)
            .input(
                "security_and_analysis",
                json!({
                    "secret_scanning": { "status": "enabled" },
                    "secret_scanning_push_protection": { "status": "enabled" },
                }),
            )
            .input("pages", pages)
            .input("protect", protected)
            .input("retain_on_delete", protected),
    );

    let rulesets_allowed =
        context.config.repositories.has_subscription() || !repository.is_private();
    if let (true, Some(rulesets)) = (rulesets_allowed, &repository.rulesets) {
        for (target, ruleset, defaults) in [
            ("branch", &rulesets.branch, DEFAULT_BRANCH_PATTERNS),
            ("tag", &rulesets.tag, DEFAULT_TAG_PATTERNS),
        ] {
            if let Some(ruleset) = ruleset.as_ref().filter(|ruleset| ruleset.enabled) {
                context.stack.declare(declare_ruleset(
                    owner,
                    &repository.name,
                    &name,
                    target,
                    ruleset,
                    defaults,
                ));
            }
        }
    }

    if repository.create_project {
        warn!(
            repository = %repository.name,
            "project boards cannot be created automatically; create one manually"
        );
    }

    outputs
}

fn declare_ruleset(
    owner: &str,
    repository: &str,
    repository_object: &str,
    target: &str,
    ruleset: &RulesetConfig,
    default_patterns: &[&str],
) -> Declaration {
    let patterns = default_patterns
        .iter()
        .map(|pattern| pattern.to_string())
        .chain(ruleset.patterns.iter().cloned())
        .collect::<Vec<_>>();

    let status_checks = match &ruleset.required_checks {
        Some(checks) => json!({
            "required_checks": checks
                .iter()
                .map(|check| json!({ "context": check, "integration_id": ACTIONS_INTEGRATION_ID }))
                .collect::<Vec<_>>(),
            "strict_required_status_checks_policy": ruleset.require_updated_branch_before_merge(),
        }),
        None => Value::Null,
    };

    let bypass_actors = if ruleset.allow_bypass() {
        [
            json!({ "actor_id": MAINTAINER_ROLE_ID, "actor_type": "RepositoryRole", "bypass_mode": "pull_request" }),
            json!({ "actor_id": ADMIN_ROLE_ID, "actor_type": "RepositoryRole", "bypass_mode": "always" }),
        ]
        .into_iter()
        .chain(ruleset.allow_bypass_integrations.iter().map(|integration| {
            json!({ "actor_id": integration, "actor_type": "Integration", "bypass_mode": "always" })
        }))
        .collect::<Vec<_>>()
    } else {
        Vec::new()
    };

    Declaration::new(
        ResourceKind::GithubRuleset,
        naming::github::ruleset(target, owner, repository),
    )
    .input("repository", repository)
    .input("target", target)
    .input("enforcement", "active")
    .input(
        "rules",
        json!({
            "creation": ruleset.restrict_creation(),
            "deletion": true,
            "non_fast_forward": !ruleset.allow_force_push(),
            "pull_request": {
                "dismiss_stale_reviews_on_push": true,
                "require_code_owner_review": ruleset.require_code_owner_review(),
                "required_approving_review_count": ruleset.approving_review_count(),
                "required_review_thread_resolution": ruleset.require_conversation_resolution(),
                "require_last_push_approval": ruleset.require_last_push_approval(),
            },
            "required_linear_history": true,
            "required_signatures": ruleset.require_signed_commits(),
            "required_status_checks": status_checks,
            "update": false,
        }),
    )
    .input("bypass_actors", bypass_actors)
    .input(
        "conditions",
        json!({ "ref_name": { "includes": patterns, "excludes": [] } }),
    )
    .depends_on(repository_object)
}
