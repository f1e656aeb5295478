//! Persisted transfer state with resume support.
//!
//! The state file records, per repository, when the bulk migration ran and
//! every diff window replayed after it, plus the cluster node ids found on a
//! clean start. The document is loaded whole, mutated and rewritten on every
//! change under one process-local lock. Only one transfer process may use a
//! state directory at a time.

mod store;
mod time;
mod types;

use std::path::PathBuf;

pub use store::{STATE_FILE_NAME, StateStore};
pub use time::{format_rfc3339, now_utc, to_epoch_millis};
pub use types::{DiffDetails, PhaseWindow, Repository, TimeRange, TransferState};

/// Errors produced by the state store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt state file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no transfer state at {0}")]
    NotInitialized(PathBuf),

    #[error("repository '{0}' has not completed its migration phase")]
    NotMigrated(String),

    #[error("repository '{0}' has no diff in progress")]
    NoDiff(String),
}
