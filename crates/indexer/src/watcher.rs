//! Filesystem watcher: debounces and coalesces events into index work.

use crate::error::{IndexerError, Result};
use crate::indexer::Indexer;
use crate::status::{now_epoch_secs, IndexState};
use notify::event::{ModifyKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Debounce window for coalescing repeated events on one path.
pub const DEBOUNCE_MS: u64 = 500;
/// Maximum number of distinct paths pending at once.
const PENDING_CAPACITY: usize = 1024;
/// How often a missing project root is re-polled.
const ROOT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Normalized filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Index,
    Remove,
}

enum WatcherCommand {
    Shutdown,
}

/// Per-path debounce map with a bounded pending set. Repeated events for
/// one path collapse into a single work item; the timer resets per event.
struct DebounceMap {
    window: Duration,
    capacity: usize,
    pending: HashMap<PathBuf, (PendingKind, Instant)>,
}

impl DebounceMap {
    fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            pending: HashMap::new(),
        }
    }

    /// Record an event. Returns `false` when the map is full and the path
    /// is not already pending.
    fn record(&mut self, path: PathBuf, kind: PendingKind) -> bool {
        let deadline = Instant::now() + self.window;
        if let Some(entry) = self.pending.get_mut(&path) {
            *entry = (kind, deadline);
            return true;
        }
        if self.pending.len() >= self.capacity {
            return false;
        }
        self.pending.insert(path, (kind, deadline));
        true
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(_, deadline)| *deadline).min()
    }

    /// Remove and return every entry whose timer has expired, in a stable
    /// path order.
    fn take_due(&mut self, now: Instant) -> Vec<(PathBuf, PendingKind)> {
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|path| self.pending.remove(&path).map(|(kind, _)| (path, kind)))
            .collect()
    }

    fn clear(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Watches the project root recursively and feeds debounced work items to
/// the indexer through a single background worker.
pub struct FileWatcher {
    command_tx: mpsc::Sender<WatcherCommand>,
    worker: JoinHandle<()>,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
}

impl FileWatcher {
    /// Subscribe to events under the project root and start the coalescing
    /// worker.
    pub fn start(indexer: Arc<Indexer>) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(PENDING_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(4);

        let watcher = create_fs_watcher(indexer.project_root(), event_tx)?;
        let worker = tokio::spawn(event_loop(indexer, event_rx, command_rx));

        Ok(Self {
            command_tx,
            worker,
            watcher: std::sync::Mutex::new(Some(watcher)),
        })
    }

    /// Stop the event subscription and wait for the worker to exit.
    pub async fn shutdown(self) {
        // Dropping the notify watcher ends the subscription and closes the
        // event channel.
        drop(self.watcher.lock().unwrap().take());
        let _ = self.command_tx.send(WatcherCommand::Shutdown).await;
        let _ = self.worker.await;
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default(),
    )
    .map_err(|e| IndexerError::Watcher(format!("watcher init failed: {e}")))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| IndexerError::Watcher(format!("failed to watch {}: {e}", root.display())))?;
    Ok(watcher)
}

async fn event_loop(
    indexer: Arc<Indexer>,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<WatcherCommand>,
) {
    let mut debounce = DebounceMap::new(Duration::from_millis(DEBOUNCE_MS), PENDING_CAPACITY);
    // Epoch seconds of the overflow, if the backlog overflowed.
    let mut overflowed_at: Option<f64> = None;
    let mut root_missing = false;
    let mut root_poll = time::interval(ROOT_POLL_INTERVAL);
    root_poll.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        let next_deadline = debounce.next_deadline();

        tokio::select! {
            Some(command) = command_rx.recv() => match command {
                WatcherCommand::Shutdown => break,
            },
            maybe_event = event_rx.recv() => {
                let Some(event) = maybe_event else {
                    break; // subscription dropped
                };
                if root_missing {
                    continue;
                }
                if let Some(since) = overflowed_at {
                    if scan_completed_since(&indexer, since) {
                        overflowed_at = None;
                        debounce.clear();
                        log::info!("Watcher backlog drained by completed scan; resuming");
                    } else {
                        continue; // dropping events until a full scan drains the backlog
                    }
                }
                handle_event(&indexer, event, &mut debounce, &mut overflowed_at);
            }
            _ = root_poll.tick() => {
                let root_exists = indexer.project_root().exists();
                if root_missing && root_exists {
                    log::info!("Project root reappeared; resuming watch");
                    root_missing = false;
                    indexer.status().set_watching();
                } else if !root_missing && !root_exists {
                    log::error!("Project root {} unavailable", indexer.project_root().display());
                    root_missing = true;
                    debounce.clear();
                    indexer.status().set_error("project root unavailable");
                }
            }
            () = async {
                if let Some(deadline) = next_deadline {
                    time::sleep_until(deadline).await;
                }
            }, if next_deadline.is_some() => {
                for (path, kind) in debounce.take_due(Instant::now()) {
                    process_item(&indexer, &path, kind).await;
                }
            }
        }
    }

    log::debug!("Watcher event loop stopped");
}

fn handle_event(
    indexer: &Arc<Indexer>,
    event: notify::Result<Event>,
    debounce: &mut DebounceMap,
    overflowed_at: &mut Option<f64>,
) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            log::warn!("Watcher error: {err}");
            return;
        }
    };

    for fs_event in normalize_event(event) {
        for (path, kind) in work_items(indexer, fs_event) {
            if !debounce.record(path, kind) {
                log::error!("Watcher backlog overflow; dropping events until the next full scan");
                indexer.status().set_error("watcher backlog overflow");
                *overflowed_at = Some(now_epoch_secs());
                return;
            }
        }
    }
}

/// Translate one normalized event into pending work. Non-deletion events
/// the filter rejects are dropped here; deletions always propagate so
/// stale rows can be removed.
fn work_items(indexer: &Indexer, event: FsEvent) -> Vec<(PathBuf, PendingKind)> {
    match event {
        FsEvent::Created(path) | FsEvent::Modified(path) => {
            match indexer.filter().is_eligible(&path) {
                Ok(true) => vec![(path, PendingKind::Index)],
                Ok(false) => Vec::new(),
                Err(err) => {
                    log::debug!("Eligibility check failed for {}: {err}", path.display());
                    Vec::new()
                }
            }
        }
        FsEvent::Deleted(path) => {
            if indexer.filter().relative(&path).is_some() {
                vec![(path, PendingKind::Remove)]
            } else {
                Vec::new()
            }
        }
        FsEvent::Moved { from, to } => {
            let mut items = work_items(indexer, FsEvent::Deleted(from));
            items.extend(work_items(indexer, FsEvent::Created(to)));
            items
        }
    }
}

/// Collapse notify's platform event kinds into the small set the indexer
/// cares about. Moves become delete(src) + create(dst).
fn normalize_event(event: Event) -> Vec<FsEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(FsEvent::Created).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(FsEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FsEvent::Moved { from, to }],
                (Some(single), None) => vec![FsEvent::Modified(single)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(FsEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(FsEvent::Created).collect()
        }
        EventKind::Modify(_) | EventKind::Any => {
            event.paths.into_iter().map(FsEvent::Modified).collect()
        }
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

async fn process_item(indexer: &Arc<Indexer>, path: &Path, kind: PendingKind) {
    match kind {
        PendingKind::Index => {
            if let Err(err) = indexer.index_file(path).await {
                log::warn!("Failed to index {}: {err}", path.display());
            }
        }
        PendingKind::Remove => {
            let Some(relative) = indexer.filter().relative(path) else {
                return;
            };
            if let Err(err) = indexer.remove_file(&relative).await {
                log::warn!("Failed to remove {relative}: {err}");
            }
        }
    }
}

fn scan_completed_since(indexer: &Indexer, since: f64) -> bool {
    let snapshot = indexer.status().snapshot();
    snapshot.state == IndexState::Watching
        && snapshot
            .last_scan_end_time
            .map(|end| end > since)
            .unwrap_or(false)
}
