//! rtransfer command-line entry point.

mod app;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Transfer(args) => {
            let config = config::Config::load(args.config.as_deref())?;

            let rt = tokio::runtime::Runtime::new()?;
            let summary = rt.block_on(app::run_transfer(args, config))?;

            for outcome in summary.failed() {
                tracing::error!(repo = %outcome.repo, result = ?outcome.result, "repository failed");
            }
            let failed = summary.failed().count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} repositories failed", summary.repositories.len());
            }
            tracing::info!(
                repositories = summary.repositories.len(),
                files = summary.files.succeeded,
                "transfer complete"
            );
        }
    }
    Ok(())
}
