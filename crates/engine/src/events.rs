//! Progress events emitted during a transfer.

use tokio::sync::mpsc;

use crate::phase::Phase;

/// Capacity of the event channel handed out by the orchestrator.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    RepositoryStarted { repo: String },
    /// Matched the filter but does not exist in the target.
    RepositorySkipped { repo: String, reason: String },
    RepositoryCompleted { repo: String },
    RepositoryFailed { repo: String, error: String },
    PhaseStarted { repo: String, phase: Phase },
    PhaseSkipped { repo: String, phase: Phase },
    PhaseCompleted { repo: String, phase: Phase },
    PhaseFailed { repo: String, phase: Phase, error: String },
    /// The source plugin finished a chunk.
    ChunkCompleted {
        repo: String,
        phase: Phase,
        succeeded: u64,
        failed: u64,
        skipped: u64,
    },
    /// A node delivered more properties.
    PropertiesProgress {
        repo: String,
        node: String,
        delivered: u64,
        total: u64,
    },
}

/// Non-blocking sender for [`TransferEvent`]s.
///
/// Events are dropped when the channel is full or nobody listens.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<TransferEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<TransferEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: TransferEvent) {
        let _ = self.tx.try_send(event);
    }
}
