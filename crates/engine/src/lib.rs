//! Repository transfer engine.
//!
//! Moves the contents of local repositories from a source server to a target
//! server in three sequential phases per repository:
//!
//! 1. **Migration**: recursive folder traversal, every file uploaded once
//! 2. **Files diff**: replays files changed since the previous window,
//!    queried in fixed-size time slices
//! 3. **Properties diff**: a server-side job, polled per cluster node
//!
//! Uploads go through the source plugin in bounded chunks. A chunk the
//! plugin cannot finish synchronously yields a token that the upload poller
//! tracks until the plugin reports it done. The number of chunks in flight
//! is bounded by the thread count, which throttles traversal to the plugin's
//! pace. Progress is checkpointed in the state store so an interrupted run
//! resumes from the last completed phase.

mod chunk;
pub mod config;
mod context;
pub mod error;
pub mod events;
pub mod failures;
mod files_diff;
mod limiter;
mod migration;
mod nodes;
pub mod orchestrator;
pub mod phase;
mod poller;
mod pool;
pub mod progress;
mod properties;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use context::TransferServices;
pub use error::TransferError;
pub use events::TransferEvent;
pub use failures::{FailureKind, FailureLog, FailureRecord};
pub use orchestrator::{RepositoryOutcome, RepositoryResult, TransferOrchestrator, TransferSummary};
pub use phase::Phase;
pub use progress::{FileCounters, FileCountersSnapshot};
