//! Watch mode: re-run test files as they change.
//!
//! notify delivers raw filesystem events on its own thread; they are forwarded
//! into a tokio task that filters them by glob, debounces per path (trailing
//! edge, so an editor's burst of writes fires once after it settles) and hands
//! each settled change to the caller's handler.

use crate::discovery::{compile_patterns, matches_any};
use crate::result::{EnsayoError, EnsayoResult};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Configuration for watch mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory watched recursively; patterns are relative to it
    pub root: PathBuf,
    /// Files that trigger a re-run
    pub patterns: Vec<String>,
    /// Paths that never trigger
    pub ignore_patterns: Vec<String>,
    /// Quiet period per path before firing
    pub debounce_ms: u64,
}

impl WatchConfig {
    /// Watch `root` with no patterns yet
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: Vec::new(),
            ignore_patterns: Vec::new(),
            debounce_ms: 300,
        }
    }

    /// Add a pattern to watch
    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.patterns.push(pattern.to_string());
        self
    }

    /// Add a pattern to ignore
    #[must_use]
    pub fn with_ignore(mut self, pattern: &str) -> Self {
        self.ignore_patterns.push(pattern.to_string());
        self
    }

    /// Set debounce duration
    #[must_use]
    pub const fn with_debounce(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }
}

/// Compiled include/ignore globs
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    include: Vec<glob::Pattern>,
    ignore: Vec<glob::Pattern>,
}

impl WatchFilter {
    /// Compile the patterns in `config`
    pub fn new(config: &WatchConfig) -> EnsayoResult<Self> {
        Ok(Self {
            // notify reports canonical paths
            root: std::fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone()),
            include: compile_patterns(&config.patterns)?,
            ignore: compile_patterns(&config.ignore_patterns)?,
        })
    }

    /// Whether a change to `path` should trigger
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        !matches_any(&self.root, path, &self.ignore) && matches_any(&self.root, path, &self.include)
    }
}

/// Kind of file change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    /// File was created
    Created,
    /// File was modified
    Modified,
    /// File was deleted
    Deleted,
    /// Unknown change type
    Other,
}

impl FileChangeKind {
    /// Created or modified: something to re-run
    #[must_use]
    pub const fn is_content_change(self) -> bool {
        matches!(self, Self::Created | Self::Modified)
    }
}

impl From<EventKind> for FileChangeKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Created,
            EventKind::Modify(_) => Self::Modified,
            EventKind::Remove(_) => Self::Deleted,
            EventKind::Any | EventKind::Access(_) | EventKind::Other => Self::Other,
        }
    }
}

/// A settled change to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// The changed file
    pub path: PathBuf,
    /// Last kind of change seen during the debounce window
    pub kind: FileChangeKind,
}

/// Watch session statistics
#[derive(Debug, Clone, Default)]
pub struct WatchStats {
    /// Handler invocations
    pub trigger_count: u64,
    /// Raw filesystem events that matched the filter
    pub change_count: u64,
    /// Time of the last trigger
    pub last_trigger: Option<std::time::Instant>,
}

/// Per-path trailing-edge debounce
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, (Instant, FileChangeKind)>,
}

impl Debouncer {
    /// Debouncer with a quiet `window`
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record a change; pushes that path's deadline out
    pub fn touch(&mut self, path: PathBuf, kind: FileChangeKind, now: Instant) {
        self.pending.insert(path, (now + self.window, kind));
    }

    /// Earliest pending deadline
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(deadline, _)| *deadline).min()
    }

    /// Remove and return every change whose window has passed
    pub fn take_due(&mut self, now: Instant) -> Vec<FileChange> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut changes: Vec<FileChange> = due
            .into_iter()
            .filter_map(|path| {
                self.pending
                    .remove(&path)
                    .map(|(_, kind)| FileChange { path, kind })
            })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }

    /// Nothing pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// A running filesystem watch
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WatchStats>>,
    root: PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .field("is_running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

impl FileWatcher {
    /// Start watching; `on_change` runs on the watch task for every settled
    /// change and must not block
    pub fn start<F>(config: &WatchConfig, on_change: F) -> EnsayoResult<Self>
    where
        F: Fn(FileChange) + Send + Sync + 'static,
    {
        let filter = WatchFilter::new(config)?;
        // events carry paths under the root as it was registered
        let root = std::fs::canonicalize(&config.root).map_err(|e| {
            EnsayoError::watch(format!("cannot watch {}: {e}", config.root.display()))
        })?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Event, notify::Error>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                // Receiver gone means the watch is shutting down.
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| EnsayoError::watch(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| EnsayoError::watch(format!("failed to watch {}: {e}", root.display())))?;

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let stats = Arc::new(Mutex::new(WatchStats::default()));
        let task_stats = Arc::clone(&stats);
        let window = Duration::from_millis(config.debounce_ms);

        let task = tokio::spawn(async move {
            let mut debouncer = Debouncer::new(window);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    () = sleep_until(debouncer.next_deadline()) => {
                        for change in debouncer.take_due(Instant::now()) {
                            if !change.path.is_file() {
                                continue;
                            }
                            {
                                let mut stats = task_stats.lock().unwrap_or_else(PoisonError::into_inner);
                                stats.trigger_count += 1;
                                stats.last_trigger = Some(std::time::Instant::now());
                            }
                            tracing::debug!(path = %change.path.display(), kind = ?change.kind, "file changed");
                            on_change(change);
                        }
                    }
                    event = rx.recv() => match event {
                        None => break,
                        Some(Err(e)) => tracing::warn!(error = %e, "watch error"),
                        Some(Ok(event)) => {
                            let kind = FileChangeKind::from(event.kind);
                            if !kind.is_content_change() {
                                continue;
                            }
                            for path in event.paths {
                                if filter.matches(&path) {
                                    task_stats.lock().unwrap_or_else(PoisonError::into_inner).change_count += 1;
                                    debouncer.touch(path, kind, Instant::now());
                                }
                            }
                        }
                    },
                }
            }
            tracing::debug!("watch loop ended");
        });

        tracing::info!(root = %root.display(), patterns = ?config.patterns, "watching");
        Ok(Self {
            watcher: Some(watcher),
            stop: Some(stop_tx),
            task: Some(task),
            stats,
            root,
        })
    }

    /// Stop watching and wait for the watch task; calling twice is a no-op
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.watcher = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "watch task ended abnormally");
            }
        }
    }

    /// Check if watcher is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Snapshot of the statistics
    #[must_use]
    pub fn stats(&self) -> WatchStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
