use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StateError;

/// Root of the persisted state document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<Repository>,
    /// Backend node ids discovered on the clean start.
    #[serde(default, rename = "nodes", skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<String>,
}

impl TransferState {
    /// Returns the repository record, if one exists.
    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Returns the repository record, creating an empty one on first use.
    pub fn repository_mut(&mut self, name: &str) -> &mut Repository {
        let index = match self.repositories.iter().position(|r| r.name == name) {
            Some(index) => index,
            None => {
                self.repositories.push(Repository::new(name));
                self.repositories.len() - 1
            }
        };
        &mut self.repositories[index]
    }
}

/// Start and end of one phase execution. Both empty means it never ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
}

impl PhaseWindow {
    /// Records a (re)start; a previous end is cleared.
    pub fn start(&mut self, at: DateTime<Utc>) {
        self.started = Some(at);
        self.ended = None;
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.ended = Some(at);
    }

    pub fn is_done(&self) -> bool {
        self.ended.is_some()
    }
}

/// Half-open time range `[started, ended)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
}

/// One incremental replay of source changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffDetails {
    /// Source changes covered by this diff.
    pub handled_range: TimeRange,
    #[serde(default)]
    pub files_diff: PhaseWindow,
    #[serde(default)]
    pub properties_diff: PhaseWindow,
    #[serde(default)]
    pub completed: bool,
}

impl DiffDetails {
    fn new(handled_range: TimeRange) -> Self {
        Self {
            handled_range,
            files_diff: PhaseWindow::default(),
            properties_diff: PhaseWindow::default(),
            completed: false,
        }
    }
}

/// Per-repository transfer history. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub migration: PhaseWindow,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<DiffDetails>,
}

impl Repository {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_migrated(&self) -> bool {
        self.migration.is_done()
    }

    pub fn last_diff(&self) -> Option<&DiffDetails> {
        self.diffs.last()
    }

    /// Returns the diff window to replay, appending a new one ending at
    /// `now` when the trailing diff is completed.
    ///
    /// A new range starts where the previous diff ended, or at the end of
    /// the migration for the first diff. An unfinished trailing diff is
    /// resumed as recorded: its range and ended sub-phases are never
    /// rewritten. Without a pending properties diff, a trailing diff whose
    /// files diff already ended is marked completed before appending.
    pub fn begin_diff(
        &mut self,
        now: DateTime<Utc>,
        properties_pending: bool,
    ) -> Result<TimeRange, StateError> {
        let migrated_at = self
            .migration
            .ended
            .ok_or_else(|| StateError::NotMigrated(self.name.clone()))?;

        let started = match self.diffs.last_mut() {
            Some(diff) if !diff.completed && diff.files_diff.is_done() && !properties_pending => {
                diff.completed = true;
                diff.handled_range.ended
            }
            Some(diff) if !diff.completed => return Ok(diff.handled_range),
            Some(diff) => diff.handled_range.ended,
            None => migrated_at,
        };

        let range = TimeRange {
            started,
            ended: now.max(started),
        };
        self.diffs.push(DiffDetails::new(range));
        Ok(range)
    }

    /// The trailing diff, if its files diff ended but the diff as a whole is
    /// still waiting on its properties diff.
    pub fn pending_properties_diff(&self) -> Option<&DiffDetails> {
        self.last_diff()
            .filter(|d| !d.completed && d.files_diff.is_done())
    }

    /// Mutable access to the diff currently being handled.
    pub fn current_diff_mut(&mut self) -> Result<&mut DiffDetails, StateError> {
        let name = self.name.clone();
        self.diffs.last_mut().ok_or(StateError::NoDiff(name))
    }

    /// Whether every diff starts exactly where its predecessor ended, the
    /// first one at the migration end.
    pub fn diffs_are_contiguous(&self) -> bool {
        let mut expected = match (self.migration.ended, self.diffs.is_empty()) {
            (_, true) => return true,
            (None, false) => return false,
            (Some(ended), false) => ended,
        };
        for diff in &self.diffs {
            if diff.handled_range.started != expected {
                return false;
            }
            expected = diff.handled_range.ended;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    fn migrated(name: &str, at: DateTime<Utc>) -> Repository {
        let mut repo = Repository::new(name);
        repo.migration.start(at - Duration::minutes(5));
        repo.migration.finish(at);
        repo
    }

    #[test]
    fn repository_mut_creates_once() {
        let mut state = TransferState::default();
        state.repository_mut("lib-local").migration.start(t(0));
        state.repository_mut("lib-local").migration.finish(t(1));
        assert_eq!(state.repositories.len(), 1);
        assert!(state.repository("lib-local").unwrap().is_migrated());
        assert!(state.repository("other").is_none());
    }

    #[test]
    fn begin_diff_requires_migration() {
        let mut repo = Repository::new("lib-local");
        assert!(matches!(
            repo.begin_diff(t(10), true),
            Err(StateError::NotMigrated(_))
        ));
    }

    #[test]
    fn first_diff_starts_at_migration_end() {
        let mut repo = migrated("lib-local", t(5));
        let range = repo.begin_diff(t(20), true).unwrap();
        assert_eq!(range.started, t(5));
        assert_eq!(range.ended, t(20));
    }

    #[test]
    fn completed_diffs_chain() {
        let mut repo = migrated("lib-local", t(5));
        repo.begin_diff(t(20), true).unwrap();
        repo.current_diff_mut().unwrap().completed = true;
        let second = repo.begin_diff(t(40), true).unwrap();
        assert_eq!(second.started, t(20));
        assert_eq!(repo.diffs.len(), 2);
        assert!(repo.diffs_are_contiguous());
    }

    #[test]
    fn unfinished_files_diff_is_resumed_unchanged() {
        let mut repo = migrated("lib-local", t(5));
        repo.begin_diff(t(20), true).unwrap();
        repo.current_diff_mut().unwrap().files_diff.start(t(20));
        let before = repo.clone();

        let range = repo.begin_diff(t(45), true).unwrap();
        assert_eq!(range.started, t(5));
        assert_eq!(range.ended, t(20));
        assert_eq!(repo, before);
    }

    #[test]
    fn ended_files_diff_waits_for_properties() {
        let mut repo = migrated("lib-local", t(5));
        repo.begin_diff(t(20), true).unwrap();
        let diff = repo.current_diff_mut().unwrap();
        diff.files_diff.start(t(20));
        diff.files_diff.finish(t(25));
        diff.properties_diff.start(t(25));
        let before = repo.clone();

        let range = repo.begin_diff(t(50), true).unwrap();
        assert_eq!(range.ended, t(20));
        assert_eq!(repo, before);
        assert_eq!(repo.pending_properties_diff(), repo.diffs.first());
    }

    #[test]
    fn ended_files_diff_completes_when_properties_are_off() {
        let mut repo = migrated("lib-local", t(5));
        repo.begin_diff(t(20), true).unwrap();
        let diff = repo.current_diff_mut().unwrap();
        diff.files_diff.start(t(20));
        diff.files_diff.finish(t(25));

        let range = repo.begin_diff(t(50), false).unwrap();
        assert_eq!(range.started, t(20));
        assert_eq!(range.ended, t(50));
        assert_eq!(repo.diffs.len(), 2);
        assert!(repo.diffs[0].completed);
        assert_eq!(repo.diffs[0].files_diff.ended, Some(t(25)));
        assert!(repo.pending_properties_diff().is_none());
        assert!(repo.diffs_are_contiguous());
    }

    #[test]
    fn contiguity_detects_gaps() {
        let mut repo = migrated("lib-local", t(5));
        repo.begin_diff(t(20), true).unwrap();
        repo.current_diff_mut().unwrap().completed = true;
        repo.begin_diff(t(30), true).unwrap();
        repo.diffs[1].handled_range.started = t(21);
        assert!(!repo.diffs_are_contiguous());
    }

    #[test]
    fn phase_window_restart_clears_end() {
        let mut window = PhaseWindow::default();
        window.start(t(0));
        window.finish(t(1));
        assert!(window.is_done());
        window.start(t(2));
        assert!(!window.is_done());
    }

    #[test]
    fn state_json_field_names() {
        let mut state = TransferState {
            node_ids: vec!["node-a".into()],
            ..Default::default()
        };
        state.repository_mut("lib-local").migration.start(t(0));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""nodes":["node-a"]"#));
        assert!(json.contains(r#""started":"2024-05-01T10:00:00Z""#));
        assert!(!json.contains("ended"));
        assert!(!json.contains("diffs"));

        let parsed: TransferState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
