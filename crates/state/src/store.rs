use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{Repository, TimeRange, TransferState};
use crate::StateError;

/// File name of the state document inside the state directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Read-modify-write access to the persisted [`TransferState`].
///
/// Every mutation loads the whole document, applies the change and rewrites
/// the file through a temporary sibling, all while holding `lock`.
pub struct StateStore {
    dir: PathBuf,
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    /// Creates a store rooted at `state_dir`. Nothing is touched on disk.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.to_path_buf(),
            path: state_dir.join(STATE_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a previous run left a state file behind.
    pub async fn exists(&self) -> Result<bool, StateError> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }

    /// Loads the full state document.
    pub async fn load(&self) -> Result<TransferState, StateError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Starts a fresh state file holding only the discovered nodes.
    pub async fn init_clean_start(&self, node_ids: Vec<String>) -> Result<(), StateError> {
        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let state = TransferState {
            repositories: Vec::new(),
            node_ids,
        };
        self.write(&state).await
    }

    pub async fn node_ids(&self) -> Result<Vec<String>, StateError> {
        Ok(self.load().await?.node_ids)
    }

    /// Returns a snapshot of the repository record (empty if never seen).
    pub async fn repository(&self, name: &str) -> Result<Repository, StateError> {
        let state = self.load().await?;
        Ok(state
            .repository(name)
            .cloned()
            .unwrap_or_else(|| Repository::new(name)))
    }

    pub async fn set_migration_started(
        &self,
        repo: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.update(|state| {
            state.repository_mut(repo).migration.start(at);
            Ok(())
        })
        .await
    }

    pub async fn set_migration_completed(
        &self,
        repo: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.update(|state| {
            state.repository_mut(repo).migration.finish(at);
            Ok(())
        })
        .await
    }

    /// Resumes the unfinished trailing diff, or appends one ending at `now`.
    pub async fn begin_diff(
        &self,
        repo: &str,
        now: DateTime<Utc>,
        properties_pending: bool,
    ) -> Result<TimeRange, StateError> {
        self.update(|state| state.repository_mut(repo).begin_diff(now, properties_pending))
            .await
    }

    pub async fn set_files_diff_started(
        &self,
        repo: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.update(|state| {
            state.repository_mut(repo).current_diff_mut()?.files_diff.start(at);
            Ok(())
        })
        .await
    }

    /// Closes the files-diff sub-phase. Without a pending properties diff the
    /// whole diff is marked completed.
    pub async fn set_files_diff_completed(
        &self,
        repo: &str,
        at: DateTime<Utc>,
        properties_pending: bool,
    ) -> Result<(), StateError> {
        self.update(|state| {
            let diff = state.repository_mut(repo).current_diff_mut()?;
            diff.files_diff.finish(at);
            if !properties_pending {
                diff.completed = true;
            }
            Ok(())
        })
        .await
    }

    pub async fn set_properties_diff_started(
        &self,
        repo: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.update(|state| {
            state
                .repository_mut(repo)
                .current_diff_mut()?
                .properties_diff
                .start(at);
            Ok(())
        })
        .await
    }

    pub async fn set_properties_diff_completed(
        &self,
        repo: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.update(|state| {
            let diff = state.repository_mut(repo).current_diff_mut()?;
            diff.properties_diff.finish(at);
            diff.completed = diff.files_diff.is_done();
            Ok(())
        })
        .await
    }

    /// Applies `action` to the loaded state and persists the result.
    ///
    /// Nothing is written when `action` fails.
    async fn update<T>(
        &self,
        action: impl FnOnce(&mut TransferState) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let _guard = self.lock.lock().await;
        let mut state = self.read().await?;
        let out = action(&mut state)?;
        self.write(&state).await?;
        Ok(out)
    }

    async fn read(&self) -> Result<TransferState, StateError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotInitialized(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    async fn write(&self, state: &TransferState) -> Result<(), StateError> {
        let content = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &content).await?;
        set_permissions_0600(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "transfer state saved");
        Ok(())
    }
}

async fn set_permissions_0600(path: &Path) -> Result<(), StateError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
