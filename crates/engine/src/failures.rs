//! Per-repository log of files the target did not receive.
//!
//! Each record is one JSON line in `<state_dir>/errors/<repo>.jsonl`. The
//! log is append-only; a later retry run can read it back with
//! [`FailureLog::read`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use rtransfer_client::FileUploadStatus;

use crate::TransferError;
use crate::phase::Phase;

/// Directory under the state dir holding the failure logs.
pub const ERRORS_DIR_NAME: &str = "errors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Fail,
    SkippedLargeProperties,
    PropertiesError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub repo: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    pub status: FailureKind,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub reason: String,
    pub phase: Phase,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Record for a file the plugin reported as failed or skipped.
    pub fn from_file(kind: FailureKind, file: &FileUploadStatus, phase: Phase) -> Self {
        Self {
            repo: file.file.repo.clone(),
            path: file.file.path.clone(),
            name: file.file.name.clone(),
            status: kind,
            status_code: file.status_code.clone(),
            reason: file.reason.clone(),
            phase,
            recorded_at: rtransfer_state::now_utc(),
        }
    }

    /// Record for errors a node reported during the properties diff.
    pub fn properties_error(repo: &str, node: &str, errors: &str) -> Self {
        Self {
            repo: repo.to_string(),
            path: String::new(),
            name: String::new(),
            status: FailureKind::PropertiesError,
            status_code: String::new(),
            reason: format!("node {node}: {errors}"),
            phase: Phase::PropertiesDiff,
            recorded_at: rtransfer_state::now_utc(),
        }
    }
}

/// Appends [`FailureRecord`]s to per-repository JSONL files.
#[derive(Debug)]
pub struct FailureLog {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FailureLog {
    /// Creates a log rooted at `<state_dir>/errors`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join(ERRORS_DIR_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path_for(&self, repo: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", repo.replace(['/', '\\'], "_")))
    }

    pub async fn append(&self, record: &FailureRecord) -> Result<(), TransferError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(&record.repo))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads back every record of a repository. A missing file is empty.
    pub async fn read(&self, repo: &str) -> Result<Vec<FailureRecord>, TransferError> {
        let content = match tokio::fs::read_to_string(self.path_for(repo)).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(TransferError::from))
            .collect()
    }
}
