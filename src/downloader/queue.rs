//! Submission and the FIFO waiting list.

use std::sync::atomic::Ordering;

use crate::db::TaskUpdate;
use crate::error::{Error, Result, TaskError};
use crate::types::{Event, QueueStats, TaskId, TaskStatus};
use crate::utils::{log_step, parse_batch_entries};

use super::{QueuedTask, StreamDownloader};

/// Error message recorded for tasks found `downloading` at startup
pub(crate) const INTERRUPTED_ERROR: &str = "interrupted: engine restarted while downloading";

impl StreamDownloader {
    /// Submit a task for download
    ///
    /// Resets the task's progress and error fields, marks it pending and appends
    /// it to the FIFO waiting list with a fresh cancellation token. Never waits
    /// for the download itself.
    ///
    /// # Errors
    ///
    /// - [`TaskError::AlreadyRunning`] if a process exists for `id` (nothing is changed)
    /// - [`Error::ShuttingDown`] once shutdown started
    pub async fn submit(&self, id: TaskId, url: &str, name: Option<&str>) -> Result<()> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        if self.queue_state.registry.lock().await.is_busy(id) {
            return Err(Error::Task(TaskError::AlreadyRunning { id: id.0 }));
        }

        // Store failures are logged; the submission itself still goes through
        log_step(self.db.reset_for_submission(id).await, id, "reset task");

        {
            let mut registry = self.queue_state.registry.lock().await;
            if registry.is_busy(id) {
                return Err(Error::Task(TaskError::AlreadyRunning { id: id.0 }));
            }

            let token = match registry.tokens.get(&id) {
                Some(token) if !token.is_cancelled() => token.clone(),
                _ => self.queue_state.shutdown.child_token(),
            };
            registry.tokens.insert(id, token);

            registry.waiting.retain(|t| t.id != id);
            registry.waiting.push_back(QueuedTask {
                id,
                url: url.to_string(),
                name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            });
        }

        tracing::info!(task_id = id.0, url, "task queued");
        self.task_log(id, "queued").await;
        self.emit_event(Event::Queued {
            id,
            url: url.to_string(),
        });

        Ok(())
    }

    /// Create a task record and submit it
    pub async fn add_task(&self, url: &str, name: Option<&str>) -> Result<TaskId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let id = self.db.create_task(url.trim(), name).await?;
        self.submit(id, url.trim(), name).await?;
        Ok(id)
    }

    /// Create and submit one task per line of `text` (`url` or `url|name`)
    ///
    /// Returns the IDs in input order. Stops at the first failing entry.
    pub async fn add_batch(&self, text: &str) -> Result<Vec<TaskId>> {
        let entries = parse_batch_entries(text);
        let mut ids = Vec::with_capacity(entries.len());

        for entry in entries {
            ids.push(self.add_task(&entry.url, entry.name.as_deref()).await?);
        }

        tracing::info!(count = ids.len(), "batch submitted");
        Ok(ids)
    }

    /// IDs with a live (or reserved) process, sorted
    pub async fn active_tasks(&self) -> Vec<TaskId> {
        let registry = self.queue_state.registry.lock().await;
        let mut ids: Vec<TaskId> = registry.active.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Counts per persisted status plus the live registry view
    pub async fn stats(&self) -> Result<QueueStats> {
        let counts = self.db.count_by_status().await?;

        let mut stats = QueueStats::default();
        for (status, count) in counts {
            stats.total += count;
            match status {
                TaskStatus::Pending => stats.pending += count,
                TaskStatus::Downloading => stats.downloading += count,
                TaskStatus::Completed => stats.completed += count,
                TaskStatus::Failed => stats.failed += count,
                TaskStatus::Cancelled => stats.cancelled += count,
            }
        }

        stats.active = self.active_tasks().await;
        stats.waiting = self.queue_state.registry.lock().await.waiting.len();
        Ok(stats)
    }

    /// Restore tasks from the previous session
    ///
    /// Pending tasks go back on the waiting list in ID order. Tasks still marked
    /// downloading lost their process with the previous session and are failed.
    pub(crate) async fn restore_queue(&self) -> Result<()> {
        tracing::info!("Restoring queue from database");

        let interrupted = self.db.list_tasks_by_status(TaskStatus::Downloading).await?;
        for task in &interrupted {
            tracing::warn!(task_id = task.id.0, "marking interrupted download as failed");
            self.db
                .update_task(task.id, &TaskUpdate::failed(INTERRUPTED_ERROR))
                .await?;
            self.task_log(task.id, INTERRUPTED_ERROR).await;
        }

        let pending = self.db.list_tasks_by_status(TaskStatus::Pending).await?;
        if pending.is_empty() {
            tracing::info!("No pending tasks to restore");
            return Ok(());
        }

        {
            let mut registry = self.queue_state.registry.lock().await;
            for task in &pending {
                registry
                    .tokens
                    .insert(task.id, self.queue_state.shutdown.child_token());
                registry.waiting.push_back(QueuedTask {
                    id: task.id,
                    url: task.url.clone(),
                    name: task.custom_name().map(str::to_string),
                });
            }
        }

        tracing::info!(
            restored_count = pending.len(),
            interrupted_count = interrupted.len(),
            "Queue restoration complete"
        );
        Ok(())
    }
}
