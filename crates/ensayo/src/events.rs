//! Session lifecycle events.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers miss older events
pub const EVENT_CAPACITY: usize = 256;

/// Something that happened during a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// Test dependencies installed
    DependenciesInstalled,
    /// Clean + build started for a variant
    BuildStarted {
        /// Build variant
        variant: String,
    },
    /// Build finished
    BuildFinished {
        /// Build variant
        variant: String,
    },
    /// Static server accepting connections
    ServerStarted {
        /// Base URL
        url: String,
    },
    /// Test files are about to run
    TestsStarted {
        /// Files in the run
        files: Vec<PathBuf>,
    },
    /// A run finished
    TestsFinished {
        /// Passed tests
        passed: usize,
        /// Failed tests
        failed: usize,
    },
    /// Static server stopped
    ServerStopped,
    /// A watched test file changed
    FileChanged {
        /// Changed file
        path: PathBuf,
    },
    /// Watch mode ended
    WatchStopped,
}

/// Broadcasts [`SessionEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with [`EVENT_CAPACITY`]
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribe to events emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Emit an event; having no subscribers is fine
    pub fn emit(&self, event: SessionEvent) {
        tracing::trace!(?event, "session event");
        let _ = self.sender.send(event);
    }
}
