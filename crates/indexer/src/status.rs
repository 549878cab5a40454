//! Process-wide indexing status.

use crate::error::{IndexerError, Result};
use schemars::JsonSchema;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Indexing lifecycle state.
///
/// ```text
/// Initializing ──► IdleInitialScanRequired ──► Scanning ──► Watching ◄──► Scanning
///      │                                          │                        │
///      └───► Error ◄──────────────────────────────┴────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub enum IndexState {
    Initializing,
    IdleInitialScanRequired,
    Scanning,
    Watching,
    Error,
}

/// Snapshot of the project's indexing status.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ProjectStatus {
    pub project_path: String,
    pub state: IndexState,
    pub last_scan_start_time: Option<f64>,
    pub last_scan_end_time: Option<f64>,
    pub indexed_chunk_count: Option<u64>,
    pub error_message: Option<String>,
}

/// Process-wide status record behind a short-held lock. The indexer is the
/// sole writer; readers take consistent snapshots.
pub struct StatusRegistry {
    inner: Mutex<ProjectStatus>,
}

impl StatusRegistry {
    pub fn new(project_path: &Path) -> Self {
        Self {
            inner: Mutex::new(ProjectStatus {
                project_path: project_path.display().to_string(),
                state: IndexState::Initializing,
                last_scan_start_time: None,
                last_scan_end_time: None,
                indexed_chunk_count: None,
                error_message: None,
            }),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ProjectStatus {
        self.inner.lock().unwrap().clone()
    }

    #[must_use]
    pub fn state(&self) -> IndexState {
        self.inner.lock().unwrap().state
    }

    /// Startup complete; an initial scan has not run yet.
    pub fn mark_ready(&self) {
        let mut status = self.inner.lock().unwrap();
        if status.state == IndexState::Initializing {
            status.state = IndexState::IdleInitialScanRequired;
        }
    }

    /// Atomically move to `Scanning`, refusing when a scan is in flight.
    pub fn begin_scan(&self) -> Result<()> {
        let mut status = self.inner.lock().unwrap();
        if status.state == IndexState::Scanning {
            return Err(IndexerError::AlreadyScanning);
        }
        status.state = IndexState::Scanning;
        status.last_scan_start_time = Some(now_epoch_secs());
        status.last_scan_end_time = None;
        status.error_message = None;
        Ok(())
    }

    /// Scan finished; back to watching with a fresh chunk count.
    pub fn finish_scan(&self, indexed_chunk_count: u64) {
        let mut status = self.inner.lock().unwrap();
        status.state = IndexState::Watching;
        status.last_scan_end_time = Some(now_epoch_secs());
        status.indexed_chunk_count = Some(indexed_chunk_count);
    }

    /// Record a failure. Counters are preserved.
    pub fn set_error(&self, message: impl Into<String>) {
        let mut status = self.inner.lock().unwrap();
        status.state = IndexState::Error;
        status.error_message = Some(message.into());
    }

    /// Resume watching after a recovered fault.
    pub fn set_watching(&self) {
        self.inner.lock().unwrap().state = IndexState::Watching;
    }

    pub fn update_chunk_count(&self, count: u64) {
        self.inner.lock().unwrap().indexed_chunk_count = Some(count);
    }
}

pub(crate) fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn registry() -> StatusRegistry {
        StatusRegistry::new(&PathBuf::from("/project"))
    }

    #[test]
    fn starts_initializing() {
        let status = registry();
        let snapshot = status.snapshot();
        assert_eq!(snapshot.state, IndexState::Initializing);
        assert_eq!(snapshot.project_path, "/project");
        assert!(snapshot.last_scan_start_time.is_none());
    }

    #[test]
    fn mark_ready_moves_to_idle_once() {
        let status = registry();
        status.mark_ready();
        assert_eq!(status.state(), IndexState::IdleInitialScanRequired);

        status.begin_scan().unwrap();
        status.mark_ready();
        assert_eq!(status.state(), IndexState::Scanning);
    }

    #[test]
    fn begin_scan_refuses_reentry() {
        let status = registry();
        status.mark_ready();
        status.begin_scan().unwrap();
        assert!(matches!(
            status.begin_scan(),
            Err(IndexerError::AlreadyScanning)
        ));
    }

    #[test]
    fn scan_cycle_updates_times_and_count() {
        let status = registry();
        status.mark_ready();
        status.begin_scan().unwrap();

        let mid = status.snapshot();
        assert!(mid.last_scan_start_time.is_some());
        assert!(mid.last_scan_end_time.is_none());

        status.finish_scan(42);
        let done = status.snapshot();
        assert_eq!(done.state, IndexState::Watching);
        assert_eq!(done.indexed_chunk_count, Some(42));
        assert!(done.last_scan_end_time.is_some());
    }

    #[test]
    fn begin_scan_clears_a_previous_error() {
        let status = registry();
        status.set_error("boom");
        assert_eq!(status.state(), IndexState::Error);

        status.begin_scan().unwrap();
        let snapshot = status.snapshot();
        assert_eq!(snapshot.state, IndexState::Scanning);
        assert!(snapshot.error_message.is_none());
    }

    #[test]
    fn error_preserves_counts() {
        let status = registry();
        status.begin_scan().unwrap();
        status.finish_scan(7);
        status.set_error("store write failed");

        let snapshot = status.snapshot();
        assert_eq!(snapshot.state, IndexState::Error);
        assert_eq!(snapshot.indexed_chunk_count, Some(7));
        assert_eq!(snapshot.error_message.as_deref(), Some("store write failed"));
    }
}
