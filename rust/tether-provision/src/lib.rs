//! Federated CI identities for a fleet of repositories.
//!
//! A provisioning run takes a [StackConfig](tether_model::StackConfig) and a
//! [RepositoryCatalog](tether_model::RepositoryCatalog) and, for every cloud
//! and integration a repository asks for:
//!
//! 1. validates the repository's scopes against the provider's allow-list
//!    ([resolve]), excluding it from that provider when they do not check out;
//! 2. establishes one federation trust per scope ([Federations]), however
//!    many repositories share it;
//! 3. creates a machine identity bound to the trust for that repository only,
//!    granted the [composed](compose) permissions in every scope it touches;
//! 4. distributes the identity's credentials to every secret destination the
//!    repository opted into ([Destinations]).
//!
//! Everything is declared into a [Stack](tether_engine::Stack). Values that
//! only exist once an object is realized (ARNs, emails, keys) flow between
//! steps as deferred values, so a failure stops only the steps that depend
//! on it. The run ends with a [Report].
//!
//! ```rust
//! use tether_engine::MemoryEngine;
//! use tether_model::{AwsAccess, RepositoryCatalog, RepositoryDescriptor, StackConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StackConfig::from_toml_str(
//!     r#"
//! [repositories]
//! owner = "acme"
//!
//! [aws]
//! default_region = "eu-central-1"
//!
//! [aws.accounts.111]
//! role_arn = "arn:aws:iam::111:role/provisioner"
//! external_id = "tether"
//! "#,
//! )?;
//!
//! let mut repository = RepositoryDescriptor::new("svc-a");
//! repository.access_permissions.aws = Some(AwsAccess {
//!     account: Some("111".into()),
//!     ..Default::default()
//! });
//!
//! let report = tether_provision::provision(
//!     config,
//!     RepositoryCatalog::new(vec![repository])?,
//!     MemoryEngine::default(),
//! )
//! .await?;
//!
//! assert!(report.repositories["svc-a"].aws);
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

pub mod naming;

mod permissions;
pub use permissions::*;

mod resolver;
pub use resolver::*;

mod grouping;
pub use grouping::*;

mod federation;
pub use federation::*;

mod stage;
pub use stage::*;

mod context;
pub use context::*;

mod destinations;
pub use destinations::*;

pub mod aws;
pub mod github;
pub mod google;
pub mod pulumi;
pub mod tailscale;

mod report;
pub use report::*;

mod orchestrator;
pub use orchestrator::*;
