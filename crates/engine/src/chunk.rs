//! Upload chunk assembly and submission.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use rtransfer_client::{FileRepresentation, SourcePlugin, TargetAuth, UploadChunk};

use crate::TransferError;
use crate::limiter::UploadLimiter;
use crate::progress::FileCounters;

/// Collects files into chunks of at most `capacity` candidates.
#[derive(Debug)]
pub(crate) struct ChunkBuilder {
    capacity: usize,
    files: Vec<FileRepresentation>,
}

impl ChunkBuilder {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            files: Vec::with_capacity(capacity),
        }
    }

    /// Adds a file. Returns the full chunk once capacity is reached.
    pub fn push(&mut self, file: FileRepresentation) -> Option<Vec<FileRepresentation>> {
        self.files.push(file);
        if self.files.len() >= self.capacity {
            Some(std::mem::replace(
                &mut self.files,
                Vec::with_capacity(self.capacity),
            ))
        } else {
            None
        }
    }

    /// Returns what is left, if anything.
    pub fn finish(self) -> Option<Vec<FileRepresentation>> {
        if self.files.is_empty() {
            None
        } else {
            Some(self.files)
        }
    }
}

/// Submits chunks to the source plugin under the upload limit.
///
/// Tokens of chunks the plugin processes asynchronously are forwarded to the
/// upload poller, which releases their slot once they are done. The poller
/// stops waiting for tokens when every gateway clone is dropped.
#[derive(Clone)]
pub(crate) struct UploadGateway {
    source: Arc<dyn SourcePlugin>,
    target_auth: TargetAuth,
    check_existence_in_filestore: bool,
    limiter: Arc<UploadLimiter>,
    tokens: mpsc::Sender<String>,
    retry_interval: Duration,
    abort: CancellationToken,
    counters: Arc<FileCounters>,
}

impl UploadGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn SourcePlugin>,
        target_auth: TargetAuth,
        check_existence_in_filestore: bool,
        limiter: Arc<UploadLimiter>,
        tokens: mpsc::Sender<String>,
        retry_interval: Duration,
        abort: CancellationToken,
        counters: Arc<FileCounters>,
    ) -> Self {
        Self {
            source,
            target_auth,
            check_existence_in_filestore,
            limiter,
            tokens,
            retry_interval,
            abort,
            counters,
        }
    }

    pub async fn submit(&self, files: Vec<FileRepresentation>) -> Result<(), TransferError> {
        self.acquire().await?;

        let count = files.len() as u64;
        let chunk = UploadChunk {
            target_auth: self.target_auth.clone(),
            upload_candidates: files,
            check_existence_in_filestore: self.check_existence_in_filestore,
        };

        match self.source.upload_chunk(&chunk).await {
            Ok(None) => {
                // Every file was deployed by checksum; nothing to track.
                self.limiter.release();
                self.counters.add_succeeded(count);
                self.counters.add_chunk();
                trace!(chunk_files = count, "chunk deployed synchronously");
                Ok(())
            }
            Ok(Some(token)) => {
                trace!(token = %token, chunk_files = count, "chunk accepted");
                if self.tokens.send(token).await.is_err() {
                    self.limiter.release();
                    return Err(TransferError::Aborted);
                }
                Ok(())
            }
            Err(e) => {
                self.limiter.release();
                Err(e.into())
            }
        }
    }

    /// Waits for a free upload slot, retrying at a fixed interval.
    async fn acquire(&self) -> Result<(), TransferError> {
        loop {
            if self.limiter.try_acquire() {
                return Ok(());
            }
            debug!(
                in_flight = self.limiter.in_flight(),
                "upload limit reached, waiting"
            );
            tokio::select! {
                _ = self.abort.cancelled() => return Err(TransferError::Aborted),
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }
}
