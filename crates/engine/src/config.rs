//! Engine tuning.

use std::time::Duration;

use crate::TransferError;

pub const DEFAULT_THREADS: usize = 16;
pub const DEFAULT_CHUNK_SIZE: usize = 10;
pub const DEFAULT_DIFF_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PROPERTIES_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_NODE_PROBES: usize = 50;
pub const DEFAULT_TASK_QUEUE_CAPACITY: usize = 500_000;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(5);

/// Tuning knobs for a transfer run.
///
/// Every interval is a [`Duration`] so tests can shrink them to
/// milliseconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker count of the task pool and maximum chunks in flight.
    pub threads: usize,
    /// Maximum files per upload chunk.
    pub chunk_size: usize,
    /// Length of one files-diff query slice.
    pub diff_window: Duration,
    pub upload_poll_interval: Duration,
    pub properties_poll_interval: Duration,
    /// Wait between attempts to acquire an upload slot.
    pub acquire_retry_interval: Duration,
    /// `cleanStart` probes sent to discover cluster nodes.
    pub node_probes: usize,
    /// Bound of the task queue. A full queue blocks the producer.
    pub task_queue_capacity: usize,
    /// Consecutive failed status requests tolerated by a poller.
    pub retries: u32,
    /// Wait before retrying a failed status request.
    pub retry_wait: Duration,
    pub properties_diff_enabled: bool,
    /// Ask the plugin to skip files whose checksum already exists in the
    /// target filestore.
    pub check_existence_in_filestore: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            diff_window: DEFAULT_DIFF_WINDOW,
            upload_poll_interval: DEFAULT_UPLOAD_POLL_INTERVAL,
            properties_poll_interval: DEFAULT_PROPERTIES_POLL_INTERVAL,
            acquire_retry_interval: DEFAULT_ACQUIRE_RETRY_INTERVAL,
            node_probes: DEFAULT_NODE_PROBES,
            task_queue_capacity: DEFAULT_TASK_QUEUE_CAPACITY,
            retries: DEFAULT_RETRIES,
            retry_wait: DEFAULT_RETRY_WAIT,
            properties_diff_enabled: true,
            check_existence_in_filestore: false,
        }
    }
}

impl EngineConfig {
    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.threads == 0 {
            return Err(TransferError::InvalidConfig("threads must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig(
                "chunk size must be at least 1".into(),
            ));
        }
        if self.diff_window.is_zero() {
            return Err(TransferError::InvalidConfig(
                "diff window must be longer than zero".into(),
            ));
        }
        if self.node_probes == 0 {
            return Err(TransferError::InvalidConfig(
                "node probes must be at least 1".into(),
            ));
        }
        if self.task_queue_capacity == 0 {
            return Err(TransferError::InvalidConfig(
                "task queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
