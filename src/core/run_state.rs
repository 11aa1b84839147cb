//! Persisted sweep progress (`status.json`) and the single-writer `Monitor` that owns it.
//!
//! Every mutation goes straight to the backing [`StatusStore`]; there is no write
//! buffering, so a poller never sees state more than one update old.

use crate::types::MatchSummary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

pub const MAX_LOG_LINES: usize = 20;
pub const MAX_RECENT_MATCHES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunStatus {
    #[default]
    Ready,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub total_combinations: usize,
    pub current_combination_index: usize,
    pub current_role: String,
    pub current_location: String,
    pub jobs_in_current_batch: usize,
    pub current_job_index: usize,
    pub total_matches: usize,
    pub recent_matches: Vec<MatchSummary>,
    pub logs: Vec<String>,
    pub status: RunStatus,
    pub last_updated: f64,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            total_combinations: 0,
            current_combination_index: 0,
            current_role: "Initializing...".to_string(),
            current_location: "...".to_string(),
            jobs_in_current_batch: 0,
            current_job_index: 0,
            total_matches: 0,
            recent_matches: Vec::new(),
            logs: Vec::new(),
            status: RunStatus::Ready,
            last_updated: 0.0,
        }
    }
}

impl RunState {
    /// Prepend a timestamped line, keeping the newest [`MAX_LOG_LINES`].
    pub fn push_log(&mut self, line: String) {
        self.logs.insert(0, line);
        self.logs.truncate(MAX_LOG_LINES);
    }

    /// Prepend a match, keeping the newest [`MAX_RECENT_MATCHES`].
    pub fn push_match(&mut self, entry: MatchSummary) {
        self.recent_matches.insert(0, entry);
        self.recent_matches.truncate(MAX_RECENT_MATCHES);
        self.total_matches += 1;
    }

    /// Advance `last_updated` to now without ever moving it backwards.
    pub fn touch(&mut self) {
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        self.last_updated = self.last_updated.max(now);
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("status store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status store json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence backend for [`RunState`]. Writes replace the whole document.
pub trait StatusStore: Send + Sync {
    fn save(&self, state: &RunState) -> Result<(), StoreError>;
    fn load(&self) -> Result<Option<RunState>, StoreError>;
}

/// `status.json` on disk, rewritten through a temp file + rename.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    path: PathBuf,
}

impl FileStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusStore for FileStatusStore {
    fn save(&self, state: &RunState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<RunState>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    inner: Mutex<Option<RunState>>,
    writes: Mutex<usize>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls observed so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }
}

impl StatusStore for MemoryStatusStore {
    fn save(&self, state: &RunState) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(state.clone());
        }
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<RunState>, StoreError> {
        Ok(self.inner.lock().ok().and_then(|g| g.clone()))
    }
}

/// Read-modify-write helper for processes that do not own a [`Monitor`]
/// (the control plane flipping `status`).
pub fn rewrite_status(store: &dyn StatusStore, status: RunStatus) -> Result<RunState, StoreError> {
    let mut state = store.load()?.unwrap_or_default();
    state.status = status;
    state.touch();
    store.save(&state)?;
    Ok(state)
}

/// Single writer of [`RunState`] for one run.
pub struct Monitor {
    state: RunState,
    store: Arc<dyn StatusStore>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("status", &self.state.status)
            .field("total_matches", &self.state.total_matches)
            .finish()
    }
}

impl Monitor {
    /// Fresh state with `status=Ready`, persisted immediately.
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        let mut monitor = Self {
            state: RunState::default(),
            store,
        };
        monitor.save();
        monitor
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn update(&mut self, f: impl FnOnce(&mut RunState)) {
        f(&mut self.state);
        self.save();
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.update(|s| s.status = status);
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.state.push_log(format!("[{}] {}", stamp, message));
        self.save();
    }

    pub fn add_match(&mut self, entry: MatchSummary) {
        self.state.push_match(entry);
        self.save();
    }

    fn save(&mut self) {
        self.state.touch();
        if let Err(e) = self.store.save(&self.state) {
            warn!("monitor: failed to persist run state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(i: usize) -> MatchSummary {
        MatchSummary {
            role: format!("Role {}", i),
            company: "Acme".into(),
            location: "Bogotá".into(),
            score: 50,
            url: format!("https://www.linkedin.com/jobs/view/{}/", i),
            work_mode: "Remote".into(),
            date: "1 day ago".into(),
        }
    }

    #[test]
    fn log_ring_keeps_newest_twenty() {
        let store = Arc::new(MemoryStatusStore::new());
        let mut monitor = Monitor::new(store.clone());
        for i in 0..27 {
            monitor.log(format!("line {}", i));
        }
        let persisted = store.load().unwrap().unwrap();
        assert_eq!(persisted.logs.len(), MAX_LOG_LINES);
        assert!(persisted.logs[0].ends_with("line 26"));
        assert!(persisted.logs[19].ends_with("line 7"));
        for pair in persisted.logs.windows(2) {
            let a: usize = pair[0].rsplit(' ').next().unwrap().parse().unwrap();
            let b: usize = pair[1].rsplit(' ').next().unwrap().parse().unwrap();
            assert_eq!(a, b + 1);
        }
    }

    #[test]
    fn match_ring_keeps_newest_ten_and_counts_all() {
        let store = Arc::new(MemoryStatusStore::new());
        let mut monitor = Monitor::new(store.clone());
        for i in 0..14 {
            monitor.add_match(summary(i));
        }
        let persisted = store.load().unwrap().unwrap();
        assert_eq!(persisted.recent_matches.len(), MAX_RECENT_MATCHES);
        assert_eq!(persisted.recent_matches[0].role, "Role 13");
        assert_eq!(persisted.recent_matches[9].role, "Role 4");
        assert_eq!(persisted.total_matches, 14);
    }

    #[test]
    fn every_mutation_is_persisted() {
        let store = Arc::new(MemoryStatusStore::new());
        let mut monitor = Monitor::new(store.clone());
        assert_eq!(store.write_count(), 1);
        monitor.update(|s| s.current_role = "Tech Lead".into());
        monitor.log("hello");
        monitor.set_status(RunStatus::Running);
        assert_eq!(store.write_count(), 4);
        let persisted = store.load().unwrap().unwrap();
        assert_eq!(persisted.status, RunStatus::Running);
        assert_eq!(persisted.current_role, "Tech Lead");
    }

    #[test]
    fn last_updated_never_moves_backwards() {
        let mut state = RunState {
            last_updated: f64::MAX,
            ..RunState::default()
        };
        state.touch();
        assert_eq!(state.last_updated, f64::MAX);
    }

    #[test]
    fn file_store_round_trips_and_rewrites_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::new(dir.path().join("dashboard").join("status.json"));
        assert!(store.load().unwrap().is_none());

        let mut state = RunState::default();
        state.status = RunStatus::Running;
        store.save(&state).unwrap();

        let healed = rewrite_status(&store, RunStatus::Ready).unwrap();
        assert_eq!(healed.status, RunStatus::Ready);
        assert_eq!(store.load().unwrap().unwrap().status, RunStatus::Ready);
        assert!(!store.path().with_extension("json.tmp").exists());
    }
}
