use anyhow::{Result, bail};
use clap::Parser;
use tether_cli::TetherCli;

#[tokio::main]
pub async fn main() -> Result<()> {
    let cli = TetherCli::parse();
    cli.init_logging()?;

    let report = cli.run().await?;
    println!("{}", report.to_json()?);

    if !report.failures.is_empty() {
        bail!("{} object(s) could not be realized", report.failures.len());
    }
    Ok(())
}
