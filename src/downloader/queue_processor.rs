//! Queue processor: admits waiting tasks up to the concurrency ceiling and spawns workers.

use tokio_util::sync::CancellationToken;

use crate::db::TaskUpdate;
use crate::error::Result;
use crate::types::TaskStatus;

use super::download_task::{TaskContext, run_download_task};
use super::{ActiveSlot, QueuedTask, StreamDownloader};

/// What happened to one popped waiting-list entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Worker spawned
    Started,
    /// Cancelled while waiting; persisted as cancelled and dropped
    Cancelled,
    /// Record missing or no longer pending; dropped
    Skipped,
}

impl StreamDownloader {
    /// Start the queue processor task
    ///
    /// This method spawns a background task that, every `queue.poll_interval`:
    /// 1. Reads the concurrency ceiling from the settings table
    /// 2. Pops waiting tasks in FIFO order while running tasks are below the ceiling
    /// 3. Discards entries cancelled while waiting or no longer pending in the store
    /// 4. Reserves an active slot and spawns a worker for the rest
    ///
    /// Errors are logged and followed by `queue.error_backoff`; the loop only ends on shutdown.
    pub fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();

        tokio::spawn(async move {
            let shutdown = downloader.queue_state.shutdown.clone();
            let poll_interval = downloader.config.queue.poll_interval;
            let error_backoff = downloader.config.queue.error_backoff;

            loop {
                let delay = match downloader.admit_ready_tasks().await {
                    Ok(started) => {
                        if started > 0 {
                            tracing::debug!(started, "admitted tasks");
                        }
                        poll_interval
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "queue processor error");
                        error_backoff
                    }
                };

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            tracing::info!("queue processor stopped");
        })
    }

    /// One admission pass. Returns the number of workers started.
    pub(crate) async fn admit_ready_tasks(&self) -> Result<usize> {
        let ceiling = self.settings().await?.max_concurrent_downloads;
        let mut started = 0;

        loop {
            if self.queue_state.shutdown.is_cancelled() {
                break;
            }

            let next = {
                let mut registry = self.queue_state.registry.lock().await;
                if registry.active.len() >= ceiling {
                    None
                } else {
                    registry.waiting.pop_front().map(|task| {
                        let token = registry
                            .tokens
                            .entry(task.id)
                            .or_insert_with(|| self.queue_state.shutdown.child_token())
                            .clone();
                        (task, token)
                    })
                }
            };

            let Some((task, token)) = next else {
                break;
            };

            match self.admit(task.clone(), token).await {
                Ok(Admission::Started) => started += 1,
                Ok(Admission::Cancelled | Admission::Skipped) => {}
                Err(e) => {
                    // Put the entry back so a store hiccup doesn't lose it
                    let mut registry = self.queue_state.registry.lock().await;
                    if !registry.is_waiting(task.id) {
                        registry.waiting.push_front(task);
                    }
                    return Err(e);
                }
            }
        }

        Ok(started)
    }

    /// Re-check one popped entry and start its worker
    async fn admit(&self, task: QueuedTask, token: CancellationToken) -> Result<Admission> {
        let id = task.id;

        if token.is_cancelled() {
            return self.discard_cancelled(task).await;
        }

        let status = self.db.get_task(id).await?.map(|t| t.status());
        if status != Some(TaskStatus::Pending) {
            let reason = match status {
                Some(status) => format!("skipped: status is {}", status),
                None => "skipped: task record missing".to_string(),
            };
            tracing::info!(task_id = id.0, %reason, "not admitting task");
            self.task_log(id, &reason).await;
            self.queue_state.registry.lock().await.release_token(id);
            return Ok(Admission::Skipped);
        }

        {
            let mut registry = self.queue_state.registry.lock().await;
            if token.is_cancelled() {
                drop(registry);
                return self.discard_cancelled(task).await;
            }
            if registry.is_busy(id) {
                drop(registry);
                tracing::warn!(task_id = id.0, "task already has a process, not admitting");
                return Ok(Admission::Skipped);
            }
            registry.active.insert(id, ActiveSlot::Reserved);
        }

        tracing::info!(task_id = id.0, url = %task.url, "admitting task");

        let ctx = TaskContext {
            id,
            url: task.url,
            name: task.name,
            token,
            downloader: self.clone(),
        };
        tokio::spawn(run_download_task(ctx));

        Ok(Admission::Started)
    }

    /// Drop an entry whose token fired while it waited.
    ///
    /// Tokens also fire on shutdown; such entries stay pending and go back on the list.
    async fn discard_cancelled(&self, task: QueuedTask) -> Result<Admission> {
        let id = task.id;
        if self.queue_state.shutdown.is_cancelled() {
            let mut registry = self.queue_state.registry.lock().await;
            if !registry.is_waiting(id) {
                registry.waiting.push_front(task);
            }
            return Ok(Admission::Skipped);
        }

        self.db
            .update_task(id, &TaskUpdate::status(TaskStatus::Cancelled))
            .await?;
        self.task_log(id, "cancelled while waiting").await;
        tracing::info!(task_id = id.0, "discarded task cancelled while waiting");
        self.queue_state.registry.lock().await.release_token(id);
        Ok(Admission::Cancelled)
    }
}
