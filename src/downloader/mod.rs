//! Core downloader implementation split into focused submodules.
//!
//! The `StreamDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Submission, FIFO waiting list, startup restore
//! - [`control`] - Stop, retry, remove, temp cleanup
//! - [`queue_processor`] - Admission loop bounded by the concurrency setting
//! - [`download_task`] - Supervision of one downloader process
//! - [`post_process`] - Remote push, upload and deletion policy after completion
//! - [`remote_monitor`] - Polls the remote downloader before deleting a pushed file
//! - [`lifecycle`] - Shutdown coordination

mod control;
mod download_task;
mod lifecycle;
mod post_process;
mod queue;
mod queue_processor;
mod remote_monitor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::settings::Settings;
use crate::transfer::{DefaultTransferProvider, TransferProvider};
use crate::types::{Event, TaskId};

/// Entry of the FIFO waiting list
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) url: String,
    pub(crate) name: Option<String>,
}

/// Active registry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActiveSlot {
    /// Admitted, process not spawned yet
    Reserved,
    /// Downloader running in its own process group
    Running {
        /// Process (and process group) ID
        pid: u32,
    },
}

impl ActiveSlot {
    pub(crate) fn pid(&self) -> Option<u32> {
        match self {
            ActiveSlot::Reserved => None,
            ActiveSlot::Running { pid } => Some(*pid),
        }
    }
}

/// All shared admission state, guarded by one mutex
///
/// Keys of `active` define "currently running". `stopping` holds tasks removed
/// from `active` by a stop whose process has not exited yet, so a resubmission
/// cannot start a second process for the same ID.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) waiting: VecDeque<QueuedTask>,
    pub(crate) active: HashMap<TaskId, ActiveSlot>,
    pub(crate) tokens: HashMap<TaskId, CancellationToken>,
    pub(crate) stopping: HashSet<TaskId>,
}

impl Registry {
    /// Whether a process exists (or is about to) for this ID
    pub(crate) fn is_busy(&self, id: TaskId) -> bool {
        self.active.contains_key(&id) || self.stopping.contains(&id)
    }

    /// Whether the ID still has an entry in the waiting list
    pub(crate) fn is_waiting(&self, id: TaskId) -> bool {
        self.waiting.iter().any(|t| t.id == id)
    }

    /// Drop the token unless the ID is still waiting or running
    pub(crate) fn release_token(&mut self, id: TaskId) {
        if !self.is_waiting(id) && !self.is_busy(id) {
            self.tokens.remove(&id);
        }
    }
}

/// Queue and task state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Waiting list, active registry and cancellation tokens
    pub(crate) registry: Arc<tokio::sync::Mutex<Registry>>,
    /// Flag to indicate whether new submissions are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every task token; cancelled on shutdown
    pub(crate) shutdown: CancellationToken,
}

impl QueueState {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(tokio::sync::Mutex::new(Registry::default())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct StreamDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query task status
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Queue and task state management
    pub(crate) queue_state: QueueState,
    /// Builds remote push and upload backends from current settings
    pub(crate) transfers: Arc<dyn TransferProvider>,
}

impl StreamDownloader {
    /// Create a new StreamDownloader instance
    ///
    /// This initializes all core components:
    /// - Opens/creates the SQLite database
    /// - Runs migrations and seeds default settings
    /// - Sets up the event broadcast channel
    /// - Restores pending tasks into the waiting list
    ///
    /// The admission loop is not started; call
    /// [`start_queue_processor`](Self::start_queue_processor).
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_transfers(config, Arc::new(DefaultTransferProvider)).await
    }

    /// Create an instance with custom transfer backends
    pub async fn with_transfers(
        config: Config,
        transfers: Arc<dyn TransferProvider>,
    ) -> Result<Self> {
        let db = Database::new(&config.persistence.database_path).await?;
        let downloader = Self::from_parts(Arc::new(db), config, transfers);

        // Restore tasks left pending or interrupted by the previous session
        downloader.restore_queue().await?;

        Ok(downloader)
    }

    pub(crate) fn from_parts(
        db: Arc<Database>,
        config: Config,
        transfers: Arc<dyn TransferProvider>,
    ) -> Self {
        // Create broadcast channel with buffer size of 1000 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        Self {
            db,
            event_tx,
            config: Arc::new(config),
            queue_state: QueueState::new(),
            transfers,
        }
    }

    /// Subscribe to task events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use stream_dl::{Config, StreamDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = StreamDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "task event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Load a fresh settings snapshot from the store
    pub async fn settings(&self) -> Result<Settings> {
        self.db.load_settings().await
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Append a line to the task's log, logging (not propagating) store failures
    pub(crate) async fn task_log(&self, id: TaskId, message: &str) {
        if let Err(e) = self.db.append_log(id, message).await {
            tracing::warn!(task_id = id.0, error = %e, "failed to append task log");
        }
    }
}
