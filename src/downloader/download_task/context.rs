//! Download task context: per-task state and active-registry bookkeeping.

use tokio_util::sync::CancellationToken;

use crate::db::TaskUpdate;
use crate::types::{Event, TaskId};

use super::super::{ActiveSlot, StreamDownloader};

/// How the task left the active registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Removal {
    /// `stop()` had already moved the task out of the active map
    pub(crate) was_stopped: bool,
}

/// Shared context for a single download task, reducing parameter passing between helpers.
pub(crate) struct TaskContext {
    pub(crate) id: TaskId,
    pub(crate) url: String,
    pub(crate) name: Option<String>,
    pub(crate) token: CancellationToken,
    pub(crate) downloader: StreamDownloader,
}

impl TaskContext {
    /// Record the spawned process ID in the reserved slot.
    ///
    /// Returns false when the slot vanished or the token fired in the meantime;
    /// the caller must then kill the fresh process.
    pub(super) async fn record_pid(&self, pid: u32) -> bool {
        let mut registry = self.downloader.queue_state.registry.lock().await;
        if self.token.is_cancelled() {
            return false;
        }
        match registry.active.get_mut(&self.id) {
            Some(slot) => {
                *slot = ActiveSlot::Running { pid };
                true
            }
            None => false,
        }
    }

    /// Remove this task from the active registry and drop its token.
    pub(super) async fn remove_from_active(&self) -> Removal {
        let mut registry = self.downloader.queue_state.registry.lock().await;
        registry.active.remove(&self.id);
        let was_stopped = registry.stopping.remove(&self.id);
        registry.release_token(self.id);
        Removal { was_stopped }
    }

    /// Whether the process group was ended by a user stop rather than shutdown
    pub(super) fn stopped_by_user(&self, removal: Removal) -> bool {
        removal.was_stopped
            || (self.token.is_cancelled() && !self.downloader.queue_state.shutdown.is_cancelled())
    }

    /// Append a line to this task's log
    pub(super) async fn log(&self, message: &str) {
        self.downloader.task_log(self.id, message).await;
    }

    /// Mark the task as failed with an error message and emit the failure event.
    pub(super) async fn mark_failed(&self, error: &str) {
        tracing::error!(task_id = self.id.0, error, "download failed");

        let update = TaskUpdate {
            speed: Some(String::new()),
            eta: Some(String::new()),
            ..TaskUpdate::failed(error)
        };
        if let Err(e) = self.downloader.db.update_task(self.id, &update).await {
            tracing::error!(task_id = self.id.0, error = %e, "failed to persist failure");
        }
        self.log(&format!("failed: {}", error)).await;
        self.downloader.emit_event(Event::Failed {
            id: self.id,
            error: error.to_string(),
        });
    }
}
