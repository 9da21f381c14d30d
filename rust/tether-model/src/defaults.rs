//! Documented defaults for every optional configuration field.
//!
//! | Field | Default |
//! |---|---|
//! | `environment` | [ENVIRONMENT] |
//! | `repositories.subscription` | [SUBSCRIPTION] |
//! | `google.allow_hmac_keys` | [ALLOW_HMAC_KEYS] |
//! | `vault.enabled` (stack) | [VAULT_ENABLED] |
//! | `doppler.enabled` (stack) | [DOPPLER_ENABLED] |
//! | `allow_repository_deletion` | [ALLOW_REPOSITORY_DELETION] |
//! | repository `visibility` | [`Visibility::Public`](crate::Visibility::Public) |
//! | repository `pagesBranch` | [PAGES_BRANCH] |
//! | `aws.region` / `google.region` | the provider's `default_region` |
//! | `google.linkedProjects.<id>.accessLevel` | [`AccessLevel::Restricted`](crate::AccessLevel::Restricted) |
//! | `doppler` opt-in | [DOPPLER_OPT_IN] |
//! | `vault.enabled` opt-in | [VAULT_OPT_IN] |
//! | `pulumi`, `tailscale`, `google.hmacKey` | `false` |
//! | ruleset `restrictCreation` | [RESTRICT_CREATION] |
//! | ruleset `allowForcePush` | [ALLOW_FORCE_PUSH] |
//! | ruleset `requireConversationResolution` | [REQUIRE_CONVERSATION_RESOLUTION] |
//! | ruleset `requireCodeOwnerReview` | [REQUIRE_CODE_OWNER_REVIEW] |
//! | ruleset `approvingReviewCount` | [APPROVING_REVIEW_COUNT] |
//! | ruleset `requireLastPushApproval` | [REQUIRE_LAST_PUSH_APPROVAL] |
//! | ruleset `requireUpdatedBranchBeforeMerge` | [REQUIRE_UPDATED_BRANCH_BEFORE_MERGE] |
//! | ruleset `requireSignedCommits` | [REQUIRE_SIGNED_COMMITS] |
//! | ruleset `allowBypass` | [ALLOW_BYPASS] |

/// Stack environment name.
pub const ENVIRONMENT: &str = "prod";
/// Subscription tier of the repository owner.
pub const SUBSCRIPTION: &str = "none";
/// Whether object-storage keys may be issued at all.
pub const ALLOW_HMAC_KEYS: bool = false;
/// Whether the versioned KV store is in use for this stack.
pub const VAULT_ENABLED: bool = false;
/// Whether the team config store is in use for this stack.
pub const DOPPLER_ENABLED: bool = true;
/// Whether repositories may be deleted by a run.
pub const ALLOW_REPOSITORY_DELETION: bool = false;
/// Branch serving repository pages.
pub const PAGES_BRANCH: &str = "main";
/// Repository opt-in to the team config store.
pub const DOPPLER_OPT_IN: bool = true;
/// Repository opt-in to the versioned KV store.
pub const VAULT_OPT_IN: bool = true;

/// Ruleset: restrict ref creation.
pub const RESTRICT_CREATION: bool = true;
/// Ruleset: allow force pushes.
pub const ALLOW_FORCE_PUSH: bool = false;
/// Ruleset: require review threads to be resolved.
pub const REQUIRE_CONVERSATION_RESOLUTION: bool = true;
/// Ruleset: require a code owner review.
pub const REQUIRE_CODE_OWNER_REVIEW: bool = false;
/// Ruleset: required approving reviews.
pub const APPROVING_REVIEW_COUNT: u32 = 0;
/// Ruleset: require approval of the most recent push.
pub const REQUIRE_LAST_PUSH_APPROVAL: bool = true;
/// Ruleset: require the branch to be up to date before merging.
pub const REQUIRE_UPDATED_BRANCH_BEFORE_MERGE: bool = true;
/// Ruleset: require signed commits.
pub const REQUIRE_SIGNED_COMMITS: bool = false;
/// Ruleset: let maintainers and admins bypass.
pub const ALLOW_BYPASS: bool = true;

pub(crate) fn environment() -> String {
    ENVIRONMENT.to_string()
}

pub(crate) fn subscription() -> String {
    SUBSCRIPTION.to_string()
}

pub(crate) fn doppler_enabled() -> bool {
    DOPPLER_ENABLED
}

pub(crate) fn vault_opt_in() -> bool {
    VAULT_OPT_IN
}
