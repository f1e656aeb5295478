//! Transfer orchestrator: runs the phase sequence for every selected
//! repository.
//!
//! Setup failures (state file, node detection, repository listing) abort
//! the whole run. A failing repository is logged and reported in the
//! summary; the remaining repositories still run.

use std::collections::HashSet;

use globset::Glob;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use rtransfer_state::StateStore;

use crate::TransferError;
use crate::config::EngineConfig;
use crate::context::{TransferContext, TransferServices};
use crate::events::{EVENT_CHANNEL_CAPACITY, EventSink, TransferEvent};
use crate::nodes::detect_nodes;
use crate::phase::Phase;
use crate::progress::FileCountersSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RepositoryResult {
    Completed,
    Skipped { reason: String },
    Failed { phase: Phase, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryOutcome {
    pub repo: String,
    #[serde(flatten)]
    pub result: RepositoryResult,
}

/// What a transfer run did, per repository.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferSummary {
    pub repositories: Vec<RepositoryOutcome>,
    pub files: FileCountersSnapshot,
}

impl TransferSummary {
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RepositoryOutcome> {
        self.repositories
            .iter()
            .filter(|r| matches!(r.result, RepositoryResult::Failed { .. }))
    }

    pub fn completed_count(&self) -> usize {
        self.repositories
            .iter()
            .filter(|r| r.result == RepositoryResult::Completed)
            .count()
    }
}

/// Drives a transfer from a source server to a target server.
pub struct TransferOrchestrator {
    ctx: TransferContext,
    events_rx: Option<mpsc::Receiver<TransferEvent>>,
}

impl TransferOrchestrator {
    pub fn new(
        config: EngineConfig,
        services: TransferServices,
        state: StateStore,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            ctx: TransferContext::new(config, services, state, EventSink::new(events_tx)),
            events_rx: Some(events_rx),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.take()
    }

    /// Transfers every local repository matching `repo_filter` (`*` and `?`
    /// wildcards) that also exists in the target.
    pub async fn run(&self, repo_filter: &str) -> Result<TransferSummary, TransferError> {
        let matcher = Glob::new(repo_filter)?.compile_matcher();
        self.prepare_state().await?;

        let source_repos = self.ctx.services.source_meta.local_repositories().await?;
        let target_repos: HashSet<String> = self
            .ctx
            .services
            .target_meta
            .local_repositories()
            .await?
            .into_iter()
            .map(|r| r.key)
            .collect();

        let mut summary = TransferSummary::default();
        for repo in source_repos.iter().filter(|r| matcher.is_match(&r.key)) {
            let repo = repo.key.as_str();
            if !target_repos.contains(repo) {
                let reason = "repository does not exist in the target".to_string();
                warn!(repo, "{reason}, skipping");
                self.ctx.events.emit(TransferEvent::RepositorySkipped {
                    repo: repo.to_string(),
                    reason: reason.clone(),
                });
                summary.repositories.push(RepositoryOutcome {
                    repo: repo.to_string(),
                    result: RepositoryResult::Skipped { reason },
                });
                continue;
            }

            let result = self.transfer_repository(repo).await;
            summary.repositories.push(RepositoryOutcome {
                repo: repo.to_string(),
                result,
            });
        }

        summary.files = self.ctx.counters.snapshot();
        info!(
            repositories = summary.repositories.len(),
            completed = summary.completed_count(),
            succeeded = summary.files.succeeded,
            failed = summary.files.failed,
            skipped = summary.files.skipped,
            "transfer finished"
        );
        Ok(summary)
    }

    /// Loads the state file, or detects nodes and creates it on a clean
    /// start.
    async fn prepare_state(&self) -> Result<(), TransferError> {
        if self.ctx.state.exists().await? {
            let state = self.ctx.state.load().await?;
            info!(
                path = %self.ctx.state.path().display(),
                repositories = state.repositories.len(),
                nodes = state.node_ids.len(),
                "resuming transfer"
            );
            return Ok(());
        }

        info!("clean start, detecting source nodes");
        let nodes = detect_nodes(
            self.ctx.services.source.as_ref(),
            self.ctx.config.node_probes,
        )
        .await?;
        self.ctx.state.init_clean_start(nodes).await?;
        Ok(())
    }

    async fn transfer_repository(&self, repo: &str) -> RepositoryResult {
        info!(repo, "transferring repository");
        self.ctx.events.emit(TransferEvent::RepositoryStarted {
            repo: repo.to_string(),
        });

        let mut next = Some(Phase::first());
        while let Some(phase) = next {
            if let Err(e) = self.run_phase(phase, repo).await {
                let error = e.to_string();
                error!(repo, phase = %phase, error = %error, "phase failed");
                self.ctx.events.emit(TransferEvent::PhaseFailed {
                    repo: repo.to_string(),
                    phase,
                    error: error.clone(),
                });
                self.ctx.events.emit(TransferEvent::RepositoryFailed {
                    repo: repo.to_string(),
                    error: error.clone(),
                });
                return RepositoryResult::Failed { phase, error };
            }
            next = phase.next();
        }

        info!(repo, "repository transferred");
        self.ctx.events.emit(TransferEvent::RepositoryCompleted {
            repo: repo.to_string(),
        });
        RepositoryResult::Completed
    }

    async fn run_phase(&self, phase: Phase, repo: &str) -> Result<(), TransferError> {
        if let Some(reason) = phase.should_skip(&self.ctx, repo).await? {
            info!(repo, phase = %phase, reason, "skipping phase");
            self.ctx.events.emit(TransferEvent::PhaseSkipped {
                repo: repo.to_string(),
                phase,
            });
            return Ok(());
        }

        info!(repo, phase = %phase, number = phase.number(), "phase started");
        self.ctx.events.emit(TransferEvent::PhaseStarted {
            repo: repo.to_string(),
            phase,
        });
        phase.started(&self.ctx, repo).await?;
        phase.run(&self.ctx, repo).await?;
        phase.done(&self.ctx, repo).await?;

        info!(repo, phase = %phase, "phase done");
        self.ctx.events.emit(TransferEvent::PhaseCompleted {
            repo: repo.to_string(),
            phase,
        });
        Ok(())
    }
}
