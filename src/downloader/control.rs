//! Task control: stop, retry, remove and temp cleanup.

use std::path::PathBuf;

use crate::db::TaskUpdate;
use crate::error::{Error, Result, TaskError, TransferError};
use crate::types::{Event, TaskId, TaskStatus};
use crate::utils::{is_task_temp_entry, log_step};

use super::StreamDownloader;
use super::download_task::{TERMINATE, signal_group};

impl StreamDownloader {
    /// Stop a running or waiting task
    ///
    /// Sets the task's cancellation token first. A running task leaves the active
    /// registry at once and its process group gets a graceful terminate signal;
    /// the worker escalates to a kill after `process.terminate_grace` on its own.
    /// A waiting task is marked cancelled and dropped by the queue processor.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotActive`] if the task is neither running nor pending.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use stream_dl::*;
    /// # async fn example(downloader: StreamDownloader, id: TaskId) -> Result<()> {
    /// downloader.stop(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn stop(&self, id: TaskId) -> Result<()> {
        let running = {
            let mut registry = self.queue_state.registry.lock().await;
            match registry.active.remove(&id) {
                Some(slot) => {
                    registry
                        .tokens
                        .entry(id)
                        .or_insert_with(|| self.queue_state.shutdown.child_token())
                        .cancel();
                    // Blocks resubmission until the worker has reaped the process
                    registry.stopping.insert(id);
                    Some(slot.pid())
                }
                None => None,
            }
        };

        if let Some(pid) = running {
            match pid {
                Some(pid) => {
                    let delivered = signal_group(pid, TERMINATE);
                    tracing::info!(task_id = id.0, pid, delivered, "sent terminate to downloader");
                }
                None => tracing::info!(task_id = id.0, "stopped before the downloader spawned"),
            }
            self.persist_cancelled(id, "stopped by user").await;
            return Ok(());
        }

        let status = self.db.get_task(id).await?.map(|t| t.status());
        if status != Some(TaskStatus::Pending) {
            return Err(Error::Task(TaskError::NotActive { id: id.0 }));
        }

        self.queue_state
            .registry
            .lock()
            .await
            .tokens
            .entry(id)
            .or_insert_with(|| self.queue_state.shutdown.child_token())
            .cancel();
        self.persist_cancelled(id, "cancelled while waiting").await;
        Ok(())
    }

    async fn persist_cancelled(&self, id: TaskId, message: &str) {
        let update = TaskUpdate {
            speed: Some(String::new()),
            eta: Some(String::new()),
            ..TaskUpdate::status(TaskStatus::Cancelled)
        };
        log_step(self.db.update_task(id, &update).await, id, "persist cancellation");
        self.task_log(id, message).await;
        self.emit_event(Event::Cancelled { id });
    }

    /// Resubmit a finished, failed or cancelled task with its stored URL and name
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task doesn't exist
    /// - [`TaskError::InvalidState`] if the task is pending or downloading
    pub async fn retry(&self, id: TaskId) -> Result<()> {
        let task = self
            .db
            .get_task(id)
            .await?
            .ok_or(Error::Task(TaskError::NotFound { id: id.0 }))?;

        let status = task.status();
        if matches!(status, TaskStatus::Pending | TaskStatus::Downloading) {
            return Err(Error::Task(TaskError::InvalidState {
                id: id.0,
                operation: "retry".to_string(),
                current_state: status.to_string(),
            }));
        }

        tracing::info!(task_id = id.0, previous = %status, "retrying task");
        self.submit(id, &task.url, task.custom_name()).await
    }

    /// Remove a task record and its logs
    ///
    /// A running task is stopped first and a waiting one leaves the waiting list.
    /// With `delete_files`, the output file and the task's temp entries are deleted too.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if the task doesn't exist.
    pub async fn remove(&self, id: TaskId, delete_files: bool) -> Result<()> {
        let task = self
            .db
            .get_task(id)
            .await?
            .ok_or(Error::Task(TaskError::NotFound { id: id.0 }))?;

        let active = self.queue_state.registry.lock().await.active.contains_key(&id);
        if active {
            log_step(self.stop(id).await, id, "stop before removal");
        }

        {
            let mut registry = self.queue_state.registry.lock().await;
            if let Some(token) = registry.tokens.get(&id) {
                token.cancel();
            }
            registry.waiting.retain(|t| t.id != id);
            registry.release_token(id);
        }

        if delete_files {
            if let Some(path) = task.file_path() {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => tracing::info!(task_id = id.0, path = %path.display(), "deleted output file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(task_id = id.0, path = %path.display(), error = %e, "failed to delete output file")
                    }
                }
            }
            log_step(
                self.clean_temp_files(id, task.custom_name()).await,
                id,
                "clean temp files",
            );
        }

        self.db.delete_task(id).await?;

        tracing::info!(task_id = id.0, delete_files, "task removed");
        self.emit_event(Event::Removed { id });
        Ok(())
    }

    /// Remove several tasks, reporting the outcome for each ID in input order
    ///
    /// A failing ID does not stop the remaining removals.
    pub async fn remove_batch(
        &self,
        ids: &[TaskId],
        delete_files: bool,
    ) -> Vec<(TaskId, Result<()>)> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = self.remove(id, delete_files).await;
            if let Err(e) = &result {
                tracing::warn!(task_id = id.0, error = %e, "batch removal failed");
            }
            results.push((id, result));
        }

        tracing::info!(count = ids.len(), "batch removal finished");
        results
    }

    /// Best-effort removal of temp-dir entries belonging to a task
    ///
    /// Matches entries whose name starts with `name` or with the task's generated
    /// `video_<id>_` prefix.
    /// Individual removal failures are logged and skipped. Returns how many
    /// entries were removed.
    pub async fn clean_temp_files(&self, id: TaskId, name: Option<&str>) -> Result<usize> {
        let temp_dir = self.settings().await?.temp_dir;
        let save_name = name.map(str::trim).unwrap_or_default().to_string();

        let removed = tokio::task::spawn_blocking(move || -> std::io::Result<usize> {
            let entries = match std::fs::read_dir(&temp_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
                Err(e) => return Err(e),
            };

            let mut removed = 0;
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                if !is_task_temp_entry(&file_name.to_string_lossy(), &save_name, id) {
                    continue;
                }

                let path: PathBuf = entry.path();
                let result = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                match result {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(task_id = id.0, path = %path.display(), error = %e, "failed to remove temp entry")
                    }
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| Error::Other(format!("temp cleanup task failed: {}", e)))??;

        tracing::debug!(task_id = id.0, removed, "temp files cleaned");
        Ok(removed)
    }

    /// Connect and log in to the file server with the current settings, and
    /// make sure the remote directory exists
    ///
    /// # Errors
    ///
    /// - [`TransferError::IncompleteConfig`] if host or user is missing
    /// - [`TransferError::Upload`] if the connection, login or directory setup fails
    pub async fn test_upload_connection(&self) -> Result<()> {
        let settings = self.settings().await?;
        if !settings.ftp.is_complete() {
            return Err(Error::Transfer(TransferError::IncompleteConfig(
                "ftp host and username are required".to_string(),
            )));
        }

        let uploader = self.transfers.uploader(&settings.ftp, &self.config.upload)?;
        uploader.check_connection().await?;

        tracing::info!(host = %settings.ftp.host, "upload connection check passed");
        Ok(())
    }
}
