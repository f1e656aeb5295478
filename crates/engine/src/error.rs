//! Transfer error types.

use rtransfer_client::ClientError;
use rtransfer_state::StateError;

/// Errors produced while transferring repositories.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("status polling failed {attempts} times in a row: {last}")]
    Poller { attempts: u32, last: String },

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error("aborted")]
    Aborted,

    #[error("no cluster nodes detected on the source server")]
    NoNodes,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid repository filter: {0}")]
    Filter(#[from] globset::Error),
}
