//! Remote monitor: waits for the remote downloader before deleting a pushed file.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::TransferError;
use crate::transfer::{RemoteDownloader, RemoteJobState};
use crate::types::{Event, TaskId};

use super::StreamDownloader;

/// How a monitor run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MonitorOutcome {
    /// Remote copy finished, local file deleted
    Deleted,
    /// Remote job ended in `error` or `removed`
    RemoteFailed(RemoteJobState),
    /// Poll budget exhausted
    TimedOut,
    /// Shutdown interrupted the wait
    Interrupted,
}

impl StreamDownloader {
    /// Spawn a task that polls the remote job and deletes `file` once it completes
    pub(crate) fn spawn_remote_monitor(
        &self,
        id: TaskId,
        gid: String,
        file: PathBuf,
        remote: Arc<dyn RemoteDownloader>,
    ) -> tokio::task::JoinHandle<MonitorOutcome> {
        let downloader = self.clone();
        tokio::spawn(async move { downloader.monitor_remote_job(id, &gid, file, remote).await })
    }

    /// Poll `gid` every `remote.monitor_poll_interval`, at most `remote.monitor_max_polls` times.
    ///
    /// Failed status requests back off `remote.monitor_error_backoff` and count
    /// against the budget. Shutdown ends the wait without deleting anything.
    pub(crate) async fn monitor_remote_job(
        &self,
        id: TaskId,
        gid: &str,
        file: PathBuf,
        remote: Arc<dyn RemoteDownloader>,
    ) -> MonitorOutcome {
        let config = &self.config.remote;
        let shutdown = self.queue_state.shutdown.clone();

        tracing::info!(task_id = id.0, gid, "monitoring remote job before deletion");

        for poll in 1..=config.monitor_max_polls {
            let delay = match remote.tell_status(gid).await {
                Ok(RemoteJobState::Complete) => {
                    tracing::info!(task_id = id.0, gid, poll, "remote job complete");
                    self.task_log(id, "remote download complete, deleting local file")
                        .await;
                    self.delete_output(id, &file).await;
                    return MonitorOutcome::Deleted;
                }
                Ok(state @ (RemoteJobState::Error | RemoteJobState::Removed)) => {
                    tracing::warn!(task_id = id.0, gid, ?state, "remote job ended without completing");
                    self.task_log(
                        id,
                        &format!("remote job ended as {:?}, local file kept", state),
                    )
                    .await;
                    self.emit_event(Event::TransferFailed {
                        id,
                        step: "remote_monitor".to_string(),
                        error: format!("remote job {} ended as {:?}", gid, state),
                    });
                    return MonitorOutcome::RemoteFailed(state);
                }
                Ok(state) => {
                    tracing::debug!(task_id = id.0, gid, poll, ?state, "remote job still running");
                    config.monitor_poll_interval
                }
                Err(e) => {
                    tracing::warn!(task_id = id.0, gid, poll, error = %e, "remote status check failed");
                    config.monitor_error_backoff
                }
            };

            if poll == config.monitor_max_polls {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(task_id = id.0, gid, "remote monitor stopped by shutdown");
                    return MonitorOutcome::Interrupted;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let error = TransferError::MonitorTimeout {
            gid: gid.to_string(),
            polls: config.monitor_max_polls,
        };
        tracing::warn!(task_id = id.0, error = %error, "remote monitor timed out");
        self.task_log(id, "remote monitor timed out, local file kept")
            .await;
        self.emit_event(Event::TransferFailed {
            id,
            step: "remote_monitor".to_string(),
            error: error.to_string(),
        });
        MonitorOutcome::TimedOut
    }
}
