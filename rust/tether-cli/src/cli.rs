use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tether_engine::MemoryEngine;
use tether_model::{RepositoryCatalog, StackConfig};
use tether_provision::Report;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line arguments of the `tether` binary.
#[derive(Debug, Parser)]
#[command(name = "tether")]
#[command(bin_name = "tether")]
#[command(about = "Provision federated CI identities for a fleet of repositories", long_about = None)]
pub struct TetherCli {
    /// Stack configuration file
    #[arg(short, long, default_value = "tether.toml")]
    pub config: PathBuf,

    /// Directory holding one YAML file per repository
    #[arg(short, long, default_value = "repositories")]
    pub repositories: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl TetherCli {
    /// Install the global log subscriber, writing to stderr.
    pub fn init_logging(&self) -> Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.log_level)
                .with_context(|| format!("Invalid log level '{}'", self.log_level))?,
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| anyhow::anyhow!(error))
    }

    /// Load the configuration and catalog, and run a provisioning pass.
    pub async fn run(&self) -> Result<Report> {
        let config = StackConfig::load(&self.config)?.with_environment(|key| std::env::var(key).ok());
        let catalog = RepositoryCatalog::load(&self.repositories)?;
        info!(
            owner = %config.repositories.owner,
            repositories = catalog.len(),
            "starting provisioning run"
        );

        Ok(tether_provision::provision(config, catalog, MemoryEngine::default()).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    use super::TetherCli;

    #[test]
    fn it_parses_paths_and_defaults() -> TestResult {
        let cli = TetherCli::try_parse_from(["tether", "--config", "stack.toml"])?;

        assert_eq!(cli.config.to_str(), Some("stack.toml"));
        assert_eq!(cli.repositories.to_str(), Some("repositories"));
        assert_eq!(cli.log_level, "info");
        Ok(())
    }

    #[tokio::test]
    async fn it_runs_a_pass_over_files_on_disk() -> TestResult {
        let directory = tempfile::tempdir()?;
        let config = directory.path().join("tether.toml");
        let repositories = directory.path().join("repositories");
        fs::create_dir(&repositories)?;
        fs::write(
            &config,
            "[repositories]\nowner = \"acme\"\n\n[aws]\ndefault_region = \"eu-central-1\"\n\n[aws.accounts.111]\nrole_arn = \"arn:aws:iam::111:role/provisioner\"\nexternal_id = \"tether\"\n",
        )?;
        fs::write(
            repositories.join("svc-a.yaml"),
            "name: svc-a\naccessPermissions:\n  aws:\n    account: 111\n",
        )?;

        let cli = TetherCli::try_parse_from([
            "tether",
            "--config",
            config.to_str().ok_or("path")?,
            "--repositories",
            repositories.to_str().ok_or("path")?,
        ])?;
        let report = cli.run().await?;

        assert!(report.repositories["svc-a"].aws);
        assert!(report.failures.is_empty());
        Ok(())
    }
}
