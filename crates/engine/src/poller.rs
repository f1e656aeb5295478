//! Status poller for chunks the source plugin processes asynchronously.
//!
//! The poller runs beside the task pool for the whole upload phase. Tokens
//! arrive over a channel from the upload gateways. While the channel is
//! open the poller is `Polling`; once every gateway is gone it switches to
//! `Draining` and exits as soon as no token is left to track.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rtransfer_client::{
    ChunkFileStatus, ChunkStatusType, SourcePlugin, UploadChunksStatusBody,
    UploadChunksStatusResponse,
};

use crate::TransferError;
use crate::events::{EventSink, TransferEvent};
use crate::failures::{FailureKind, FailureLog, FailureRecord};
use crate::limiter::UploadLimiter;
use crate::phase::Phase;
use crate::progress::FileCounters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerState {
    /// Gateways may still send tokens.
    Polling,
    /// No more tokens will arrive; finish the tracked ones.
    Draining,
}

pub(crate) struct UploadPoller {
    pub repo: String,
    pub phase: Phase,
    pub source: Arc<dyn SourcePlugin>,
    pub tokens: mpsc::Receiver<String>,
    pub limiter: Arc<UploadLimiter>,
    pub counters: Arc<FileCounters>,
    pub failures: Arc<FailureLog>,
    pub events: EventSink,
    pub abort: CancellationToken,
    /// Maximum tokens per status request.
    pub batch_size: usize,
    pub interval: Duration,
    pub retries: u32,
    pub retry_wait: Duration,
}

impl UploadPoller {
    pub async fn run(mut self) -> Result<(), TransferError> {
        let mut state = PollerState::Polling;
        let mut tracked: Vec<String> = Vec::new();
        let mut consecutive_failures = 0u32;
        let mut wait = self.interval;

        loop {
            if tracked.is_empty() && state == PollerState::Polling {
                match self.tokens.recv().await {
                    Some(token) => tracked.push(token),
                    None => state = PollerState::Draining,
                }
            }
            if tracked.is_empty() && state == PollerState::Draining {
                break;
            }

            tokio::time::sleep(wait).await;
            state = self.refill(&mut tracked, state);

            let body = UploadChunksStatusBody {
                uuid_tokens: tracked.clone(),
            };
            match self.source.upload_chunks_status(&body).await {
                Ok(resp) => {
                    consecutive_failures = 0;
                    wait = self.interval;
                    self.handle_response(resp, &mut tracked).await;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        repo = %self.repo,
                        attempt = consecutive_failures,
                        error = %e,
                        "chunk status request failed"
                    );
                    if consecutive_failures > self.retries {
                        self.abort.cancel();
                        self.release_all(tracked);
                        return Err(TransferError::Poller {
                            attempts: consecutive_failures,
                            last: e.to_string(),
                        });
                    }
                    wait = self.retry_wait;
                }
            }
        }

        debug!(repo = %self.repo, phase = %self.phase, "upload poller drained");
        Ok(())
    }

    /// Moves queued tokens into `tracked` up to the batch size.
    fn refill(&mut self, tracked: &mut Vec<String>, mut state: PollerState) -> PollerState {
        while tracked.len() < self.batch_size {
            match self.tokens.try_recv() {
                Ok(token) => tracked.push(token),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    state = PollerState::Draining;
                    break;
                }
            }
        }
        state
    }

    /// Gives back the slots of every token the poller will no longer track.
    fn release_all(&mut self, tracked: Vec<String>) {
        self.tokens.close();
        let mut released = tracked.len();
        while self.tokens.try_recv().is_ok() {
            released += 1;
        }
        for _ in 0..released {
            self.limiter.release();
        }
        warn!(repo = %self.repo, released, "abandoned outstanding chunks");
    }

    async fn handle_response(&self, resp: UploadChunksStatusResponse, tracked: &mut Vec<String>) {
        for chunk in resp.chunks_status {
            if chunk.status != ChunkStatusType::Done {
                continue;
            }
            let Some(pos) = tracked.iter().position(|t| *t == chunk.uuid_token) else {
                continue;
            };
            tracked.swap_remove(pos);
            self.limiter.release();
            self.counters.add_chunk();

            let (mut succeeded, mut failed, mut skipped) = (0u64, 0u64, 0u64);
            for file in &chunk.files {
                let kind = match file.status {
                    ChunkFileStatus::Success => {
                        succeeded += 1;
                        continue;
                    }
                    ChunkFileStatus::Fail => {
                        failed += 1;
                        FailureKind::Fail
                    }
                    ChunkFileStatus::SkippedLargeProps => {
                        skipped += 1;
                        FailureKind::SkippedLargeProperties
                    }
                    ChunkFileStatus::Unknown => {
                        warn!(repo = %self.repo, file = %file.file.name, "unknown file status");
                        continue;
                    }
                };
                warn!(
                    repo = %file.file.repo,
                    path = %file.file.path,
                    name = %file.file.name,
                    status_code = %file.status_code,
                    reason = %file.reason,
                    "file not transferred"
                );
                let record = FailureRecord::from_file(kind, file, self.phase);
                if let Err(e) = self.failures.append(&record).await {
                    warn!(error = %e, "failed to record file failure");
                }
            }

            self.counters.add_succeeded(succeeded);
            self.counters.add_failed(failed);
            self.counters.add_skipped(skipped);
            info!(
                repo = %self.repo,
                node = %resp.node_id,
                token = %chunk.uuid_token,
                chunk_files = chunk.files.len(),
                "chunk done"
            );
            self.events.emit(TransferEvent::ChunkCompleted {
                repo: self.repo.clone(),
                phase: self.phase,
                succeeded,
                failed,
                skipped,
            });
        }
    }
}
