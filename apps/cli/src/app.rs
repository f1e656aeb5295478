//! Wires the configured servers into a transfer run.

use std::sync::Arc;
use std::time::Duration;

use rtransfer_client::{RestClient, SrcPluginClient};
use rtransfer_engine::{
    EngineConfig, TransferEvent, TransferOrchestrator, TransferServices, TransferSummary,
};
use rtransfer_state::StateStore;

use crate::cli::TransferArgs;
use crate::config::Config;

/// Runs one transfer and returns its summary.
pub async fn run_transfer(args: TransferArgs, config: Config) -> anyhow::Result<TransferSummary> {
    let source = config.server(&args.source_server)?.clone();
    let target = config.server(&args.target_server)?.clone();
    tracing::info!(
        source = %source.url,
        target = %target.url,
        filter = %args.repo_filter,
        "starting transfer"
    );

    let services = TransferServices {
        source: Arc::new(SrcPluginClient::new(
            source.clone(),
            &config.transfer.plugin_path,
        )?),
        source_meta: Arc::new(RestClient::new(source)?),
        target_meta: Arc::new(RestClient::new(target.clone())?),
        target_auth: target.target_auth(),
    };
    let state_dir = config.state_dir()?;
    tracing::debug!(state_dir = %state_dir.display(), "using state directory");

    let mut orchestrator = TransferOrchestrator::new(
        engine_config(&args, &config),
        services,
        StateStore::new(&state_dir),
    )?;
    if let Some(mut events) = orchestrator.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&event);
            }
        });
    }

    Ok(orchestrator.run(&args.repo_filter).await?)
}

fn engine_config(args: &TransferArgs, config: &Config) -> EngineConfig {
    EngineConfig {
        threads: args.threads,
        retries: args.retries,
        retry_wait: Duration::from_millis(args.retry_wait_time),
        properties_diff_enabled: config.transfer.properties_diff_enabled,
        check_existence_in_filestore: args.filestore,
        ..Default::default()
    }
}

fn log_event(event: &TransferEvent) {
    match event {
        TransferEvent::ChunkCompleted {
            repo,
            phase,
            succeeded,
            failed,
            skipped,
        } => tracing::debug!(%repo, %phase, succeeded, failed, skipped, "chunk completed"),
        TransferEvent::PropertiesProgress {
            repo,
            node,
            delivered,
            total,
        } => tracing::info!(%repo, %node, delivered, total, "properties progress"),
        other => tracing::trace!(event = ?other, "transfer event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Command};

    fn args(extra: &[&str]) -> TransferArgs {
        let argv = ["rtransfer", "transfer", "src", "tgt", "*"]
            .into_iter()
            .chain(extra.iter().copied());
        match Cli::parse_from(argv).command {
            Command::Transfer(args) => args,
        }
    }

    #[test]
    fn flags_reach_engine_config() {
        let mut config = Config::default();
        config.transfer.properties_diff_enabled = false;
        let engine = engine_config(
            &args(&["--threads", "8", "--retries", "5", "--retry-wait-time", "100", "--filestore"]),
            &config,
        );
        assert_eq!(engine.threads, 8);
        assert_eq!(engine.retries, 5);
        assert_eq!(engine.retry_wait, Duration::from_millis(100));
        assert!(engine.check_existence_in_filestore);
        assert!(!engine.properties_diff_enabled);
        assert_eq!(engine.chunk_size, 10);
    }

    #[tokio::test]
    async fn unknown_server_fails_before_any_request() {
        let err = run_transfer(args(&[]), Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("'src'"));
    }
}
