//! The three transfer phases and their handlers.
//!
//! Every phase follows the same contract: `should_skip` may opt out,
//! `started` records the start before any work, `run` does the work and
//! `done` records completion. A failed `run` never reaches `done`, so the
//! phase stays open in the state file and is picked up again on the next
//! run.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use rtransfer_client::MetadataService;
use rtransfer_state::{StateError, now_utc};

use crate::TransferError;
use crate::chunk::UploadGateway;
use crate::context::TransferContext;
use crate::files_diff::{seed_slices, time_slices};
use crate::migration::{ROOT_PATH, folder_task};
use crate::poller::UploadPoller;
use crate::pool::TaskPool;
use crate::properties::poll_properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Migration,
    FilesDiff,
    PropertiesDiff,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Migration, Phase::FilesDiff, Phase::PropertiesDiff];

    pub fn first() -> Self {
        Phase::Migration
    }

    /// Transition table. `None` after the last phase.
    pub fn next(self) -> Option<Self> {
        match self {
            Phase::Migration => Some(Phase::FilesDiff),
            Phase::FilesDiff => Some(Phase::PropertiesDiff),
            Phase::PropertiesDiff => None,
        }
    }

    /// 1-based position in the sequence.
    pub fn number(self) -> u8 {
        match self {
            Phase::Migration => 1,
            Phase::FilesDiff => 2,
            Phase::PropertiesDiff => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Migration => "migration",
            Phase::FilesDiff => "files_diff",
            Phase::PropertiesDiff => "properties_diff",
        }
    }

    /// Returns why the phase has nothing to do for `repo`, if so.
    pub(crate) async fn should_skip(
        self,
        ctx: &TransferContext,
        repo: &str,
    ) -> Result<Option<&'static str>, TransferError> {
        let record = ctx.state.repository(repo).await?;
        let reason = match self {
            Phase::Migration => record.is_migrated().then_some("already migrated"),
            Phase::FilesDiff => {
                let waiting = record.pending_properties_diff().is_some();
                (ctx.config.properties_diff_enabled && waiting).then_some("files already replayed")
            }
            Phase::PropertiesDiff => {
                if !ctx.config.properties_diff_enabled {
                    Some("properties diff disabled")
                } else {
                    match record.last_diff() {
                        None => Some("no diff to replay"),
                        Some(diff) if diff.completed || diff.properties_diff.is_done() => {
                            Some("properties already replayed")
                        }
                        Some(_) => None,
                    }
                }
            }
        };
        Ok(reason)
    }

    pub(crate) async fn started(self, ctx: &TransferContext, repo: &str) -> Result<(), TransferError> {
        let now = now_utc();
        match self {
            Phase::Migration => {
                ctx.state.set_migration_started(repo, now).await?;
                ctx.services.source.store_properties(repo).await?;
            }
            Phase::FilesDiff => {
                let range = ctx
                    .state
                    .begin_diff(repo, now, ctx.config.properties_diff_enabled)
                    .await?;
                debug!(repo, from = %range.started, to = %range.ended, "diff window opened");
                ctx.state.set_files_diff_started(repo, now).await?;
            }
            Phase::PropertiesDiff => {
                ctx.state.set_properties_diff_started(repo, now).await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn run(self, ctx: &TransferContext, repo: &str) -> Result<(), TransferError> {
        match self {
            Phase::Migration => {
                run_upload_phase(ctx, repo, self, |run| async move {
                    let root = folder_task(Arc::clone(&run), ROOT_PATH.to_string());
                    run.pool.add_task(root).await
                })
                .await
            }
            Phase::FilesDiff => {
                let range = current_range(ctx, repo).await?;
                let slices = time_slices(&range, ctx.config.diff_window)?;
                info!(repo, slices = slices.len(), "replaying changed files");
                run_upload_phase(ctx, repo, self, move |run| seed_slices(run, slices)).await
            }
            Phase::PropertiesDiff => {
                let range = current_range(ctx, repo).await?;
                poll_properties(ctx, repo, &range).await
            }
        }
    }

    pub(crate) async fn done(self, ctx: &TransferContext, repo: &str) -> Result<(), TransferError> {
        let now = now_utc();
        match self {
            Phase::Migration => ctx.state.set_migration_completed(repo, now).await?,
            Phase::FilesDiff => {
                ctx.state
                    .set_files_diff_completed(repo, now, ctx.config.properties_diff_enabled)
                    .await?
            }
            Phase::PropertiesDiff => ctx.state.set_properties_diff_completed(repo, now).await?,
        }
        Ok(())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

async fn current_range(
    ctx: &TransferContext,
    repo: &str,
) -> Result<rtransfer_state::TimeRange, TransferError> {
    let record = ctx.state.repository(repo).await?;
    record
        .last_diff()
        .map(|d| d.handled_range)
        .ok_or_else(|| StateError::NoDiff(repo.to_string()).into())
}

/// Shared resources of one upload phase, handed to every task.
pub(crate) struct UploadRun {
    pub repo: String,
    pub pool: TaskPool,
    pub gateway: UploadGateway,
    pub search: Arc<dyn MetadataService>,
    pub chunk_size: usize,
}

/// Runs a traversal or diff phase: `seed` queues the first tasks, the pool
/// runs until idle, then the upload poller drains the remaining tokens.
async fn run_upload_phase<F, Fut>(
    ctx: &TransferContext,
    repo: &str,
    phase: Phase,
    seed: F,
) -> Result<(), TransferError>
where
    F: FnOnce(Arc<UploadRun>) -> Fut,
    Fut: Future<Output = Result<(), TransferError>>,
{
    let config = &ctx.config;
    // Every token holds an upload slot, so `threads` bounds the backlog.
    let (tokens_tx, tokens_rx) = mpsc::channel(config.threads.max(1));
    let abort = CancellationToken::new();

    let poller = UploadPoller {
        repo: repo.to_string(),
        phase,
        source: Arc::clone(&ctx.services.source),
        tokens: tokens_rx,
        limiter: Arc::clone(&ctx.limiter),
        counters: Arc::clone(&ctx.counters),
        failures: Arc::clone(&ctx.failures),
        events: ctx.events.clone(),
        abort: abort.clone(),
        batch_size: config.chunk_size,
        interval: config.upload_poll_interval,
        retries: config.retries,
        retry_wait: config.retry_wait,
    };
    let poller = tokio::spawn(poller.run());

    let pool = TaskPool::new(config.threads, config.task_queue_capacity);
    let run = Arc::new(UploadRun {
        repo: repo.to_string(),
        pool: pool.clone(),
        gateway: UploadGateway::new(
            Arc::clone(&ctx.services.source),
            ctx.services.target_auth.clone(),
            config.check_existence_in_filestore,
            Arc::clone(&ctx.limiter),
            tokens_tx,
            config.acquire_retry_interval,
            abort,
            Arc::clone(&ctx.counters),
        ),
        search: Arc::clone(&ctx.services.source_meta),
        chunk_size: config.chunk_size,
    });

    let producer = pool.producer();
    let seeding = async move {
        let result = seed(run).await;
        drop(producer);
        result
    };
    let (pool_result, seed_result) = tokio::join!(pool.run(), seeding);
    debug!(repo, phase = %phase, "task pool idle, waiting for uploads to drain");

    let poll_result = match poller.await {
        Ok(result) => result,
        Err(e) => Err(TransferError::Pool(e.to_string())),
    };
    poll_result?;
    pool_result?;
    seed_result
}
