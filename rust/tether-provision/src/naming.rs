//! Deterministic names for every declared object.
//!
//! Logical names (the declaration names the engine tracks) are built from
//! what an object is for: its provider, repository, scope and purpose.
//! Physical names that the target system constrains in length (role names,
//! service account ids, pool ids) combine a truncated repository name with a
//! short postfix derived from the logical name, so two runs over the same
//! input always produce the same names.
//!
//! A repository and the scope it is provisioned in are joined with `@`.
//! Repository names, account ids and project ids may all contain dashes but
//! never `@`, and no purpose prefix is a prefix of another, so no two
//! (repository, scope, purpose) triples share a name.

/// Repository names are truncated to this many characters inside physical
/// names, keeping them within the target systems' length limits.
pub const TRUNCATED_REPOSITORY_LENGTH: usize = 18;

/// Length of the derived postfix.
pub const POSTFIX_LENGTH: usize = 8;

/// A short, lowercase postfix derived from a logical name.
pub fn postfix(logical_name: &str) -> String {
    let hash = blake3::hash(logical_name.as_bytes());
    let hex = hash.to_hex();
    hex.as_str()[..POSTFIX_LENGTH].to_string()
}

/// The first [TRUNCATED_REPOSITORY_LENGTH] characters of a repository name.
pub fn truncated(repository: &str) -> &str {
    match repository.char_indices().nth(TRUNCATED_REPOSITORY_LENGTH) {
        Some((index, _)) => &repository[..index],
        None => repository,
    }
}

/// The CI identity name for `repository`, e.g. `ci-svc-a-1f2e3d4c`.
pub fn ci_identity(repository: &str, logical_name: &str) -> String {
    format!(
        "ci-{}-{}",
        truncated(repository).to_lowercase(),
        postfix(logical_name)
    )
}

/// The custom role id for `repository`. Role ids may not contain dashes.
pub fn ci_role_id(repository: &str, logical_name: &str) -> String {
    format!(
        "ci.{}.{}",
        truncated(repository).replace('-', "_"),
        postfix(logical_name)
    )
}

fn pair(repository: &str, scope: &str) -> String {
    format!("{repository}@{scope}")
}

pub mod aws {
    //! Account-based cloud objects.

    /// Provider handle bound to an account.
    pub fn provider(account: &str) -> String {
        format!("aws-provider-{account}")
    }

    /// The account's OIDC identity provider.
    pub fn identity_provider(account: &str) -> String {
        format!("aws-iam-identity-provider-{account}")
    }

    /// The repository's CI role.
    pub fn role(repository: &str, account: &str) -> String {
        format!("aws-iam-role-ci-{}", super::pair(repository, account))
    }

    /// The repository's CI policy.
    pub fn policy(repository: &str, account: &str) -> String {
        format!("aws-iam-policy-ci-{}", super::pair(repository, account))
    }

    /// Attachment of the CI policy to the CI role.
    pub fn policy_attachment(repository: &str, account: &str) -> String {
        format!("aws-iam-policy-attachment-ci-{}", super::pair(repository, account))
    }
}

pub mod google {
    //! Project-based cloud objects.

    /// Provider handle bound to a project.
    pub fn provider(project: &str) -> String {
        format!("gcp-provider-{project}")
    }

    /// Enablement of one service in a project.
    pub fn service(project: &str, service: &str) -> String {
        format!("gcp-project-service-{project}@{service}")
    }

    /// The project's workload identity pool.
    pub fn pool(project: &str) -> String {
        format!("gcp-iam-identity-pool-{project}")
    }

    /// The project's workload identity pool provider.
    pub fn pool_provider(project: &str) -> String {
        format!("gcp-iam-identity-provider-{project}")
    }

    /// The repository's custom role in `project`.
    pub fn role(repository: &str, project: &str) -> String {
        format!("gcp-iam-role-ci-{}", super::pair(repository, project))
    }

    /// The repository's service account, living in its primary project.
    pub fn service_account(repository: &str, project: &str) -> String {
        format!("gcp-iam-serviceaccount-ci-{}", super::pair(repository, project))
    }

    /// Membership of the service account in the custom role of `project`.
    pub fn role_member(repository: &str, project: &str) -> String {
        format!("gcp-iam-member-ci-{}", super::pair(repository, project))
    }

    /// Binding of the service account to the project's pool.
    pub fn identity_binding(repository: &str, project: &str) -> String {
        format!("gcp-iam-identity-member-ci-{}", super::pair(repository, project))
    }

    /// Object-storage access key of the service account.
    pub fn hmac_key(repository: &str, project: &str) -> String {
        format!("gcp-hmac-{}", super::pair(repository, project))
    }
}

pub mod github {
    //! Source host objects.

    /// The repository itself.
    pub fn repository(owner: &str, repository: &str) -> String {
        format!("github-repo-{owner}-{repository}")
    }

    /// A branch or tag ruleset.
    pub fn ruleset(target: &str, owner: &str, repository: &str) -> String {
        format!("github-repository-ruleset-{target}-{owner}-{repository}")
    }

    /// A CI secret of the repository.
    pub fn actions_secret(repository: &str, key: &str) -> String {
        format!("github-actions-secret-{repository}-{key}")
    }
}

pub mod doppler {
    //! Team config store objects.

    /// The repository's project.
    pub fn project(repository: &str) -> String {
        format!("doppler-project-{repository}")
    }

    /// The repository project's environment.
    pub fn environment(environment: &str, repository: &str) -> String {
        format!("doppler-environment-{environment}-{repository}")
    }

    /// A secret in a project.
    pub fn secret(project: &str, key: &str) -> String {
        format!("doppler-{project}-{key}")
    }
}

pub mod vault {
    //! Versioned KV store objects.

    /// Mount path, access policy name and auth role name of a repository.
    pub fn path(repository: &str) -> String {
        format!("github-{repository}")
    }

    /// A KV mount.
    pub fn store(name: &str) -> String {
        format!("vault-store-{name}")
    }

    /// The repository's access policy.
    pub fn policy(repository: &str) -> String {
        format!("vault-policy-github-{repository}")
    }

    /// The repository's JWT auth role.
    pub fn role(repository: &str) -> String {
        format!("vault-jwt-github-role-{repository}")
    }

    /// A secret in a mount.
    pub fn secret(path: &str, key: &str) -> String {
        format!("vault-secret-{path}-{key}")
    }
}

pub mod pulumi {
    //! Token issuer objects.

    /// The repository's access token.
    pub fn access_token(repository: &str) -> String {
        format!("pulumi-access-token-{repository}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_derives_stable_postfixes() {
        let role = aws::role("svc-a", "111");

        assert_eq!(postfix(&role), postfix(&aws::role("svc-a", "111")));
        assert_ne!(postfix(&role), postfix(&aws::role("svc-b", "111")));
        assert_eq!(postfix(&role).len(), POSTFIX_LENGTH);
    }

    #[test]
    fn it_truncates_long_repository_names() {
        let name = ci_identity("a-very-long-repository-name", "logical");

        assert!(name.starts_with("ci-a-very-long-reposi-"));
        assert_eq!(name.len(), 3 + TRUNCATED_REPOSITORY_LENGTH + 1 + POSTFIX_LENGTH);
        assert_eq!(truncated("short"), "short");
    }

    #[test]
    fn it_keeps_dashed_repositories_and_scopes_apart() {
        let names = |repository: &str, project: &str| {
            [
                google::role(repository, project),
                google::service_account(repository, project),
                google::role_member(repository, project),
                google::identity_binding(repository, project),
                google::hmac_key(repository, project),
                aws::role(repository, project),
                aws::policy(repository, project),
                aws::policy_attachment(repository, project),
            ]
        };

        let first = names("api", "web-prod");
        let second = names("api-web", "prod");
        for (first, second) in first.iter().zip(&second) {
            assert_ne!(first, second);
        }
        assert_ne!(aws::role("policy-x", "111"), aws::policy("x", "111"));
        assert_ne!(
            google::service_account("member-x", "a"),
            google::role_member("x", "a")
        );
        assert_ne!(
            google::service("a-b", "c.googleapis.com"),
            google::service("a", "b-c.googleapis.com")
        );
    }

    #[test]
    fn it_builds_role_ids_without_dashes() {
        let id = ci_role_id("svc-a", "gcp-iam-role-ci-svc-a-main");

        assert!(id.starts_with("ci.svc_a."));
        assert!(!id.contains('-'));
    }
}
