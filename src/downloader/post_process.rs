//! Post-completion pipeline: remote push, upload and the local deletion policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::TaskUpdate;
use crate::error::{Error, Result, TransferError};
use crate::settings::Settings;
use crate::transfer::{PushOptions, RemoteDownloader, remote_file_url};
use crate::types::{Event, TaskId};

use super::StreamDownloader;

/// What the remote push produced
struct Pushed {
    gid: String,
    remote: Arc<dyn RemoteDownloader>,
}

impl StreamDownloader {
    /// Run the transfers configured for a completed task, then apply the deletion policy
    ///
    /// Settings are read once, fresh, at the start. Every step isolates its own
    /// failure: the task stays `completed` whatever happens here.
    ///
    /// Deletion precedence:
    /// 1. Upload succeeded and `ftp_delete_after_upload` is set: delete now
    /// 2. `delete_after_download` with a remote job: delete once the remote side reports completion
    /// 3. `delete_after_download` without a remote job: delete now
    pub(crate) async fn run_post_completion(&self, id: TaskId, file: PathBuf) {
        let settings = match self.settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(task_id = id.0, error = %e, "cannot load settings, skipping post-completion steps");
                return;
            }
        };

        let pushed = if settings.aria2.enabled {
            self.push_remote(id, &file, &settings).await
        } else {
            None
        };

        let uploaded = settings.ftp.enabled && self.upload(id, &file, &settings).await;

        if uploaded && settings.ftp.delete_after_upload {
            self.task_log(id, "upload finished, deleting local file").await;
            self.delete_output(id, &file).await;
        } else if settings.delete_after_download {
            match pushed {
                Some(Pushed { gid, remote }) => {
                    self.task_log(
                        id,
                        "waiting for the remote download before deleting the local file",
                    )
                    .await;
                    self.spawn_remote_monitor(id, gid, file, remote);
                }
                None => {
                    self.task_log(id, "deleting local file (delete after download)")
                        .await;
                    self.delete_output(id, &file).await;
                }
            }
        }
    }

    /// Hand the file to the remote downloader. Returns the job on success.
    async fn push_remote(&self, id: TaskId, file: &Path, settings: &Settings) -> Option<Pushed> {
        match self.try_push_remote(id, file, settings).await {
            Ok(pushed) => Some(pushed),
            Err(e) => {
                tracing::warn!(task_id = id.0, error = %e, "remote push failed");
                self.task_log(id, &format!("remote push failed: {}", e)).await;
                self.emit_event(Event::TransferFailed {
                    id,
                    step: "remote_push".to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn try_push_remote(&self, id: TaskId, file: &Path, settings: &Settings) -> Result<Pushed> {
        let basename = basename(file)?;
        let remote = self
            .transfers
            .remote_downloader(&settings.aria2, &self.config.remote)?;

        let uri = remote_file_url(&settings.aria2.public_host, &basename);
        self.task_log(id, &format!("pushing to {}: {}", remote.name(), uri))
            .await;

        let options = PushOptions {
            out: basename,
            dir: settings.aria2.out_dir.clone(),
        };
        let gid = remote.add_uri(&uri, &options).await?;

        let update = TaskUpdate {
            aria2_gid: Some(gid.clone()),
            ..Default::default()
        };
        if let Err(e) = self.db.update_task(id, &update).await {
            tracing::warn!(task_id = id.0, error = %e, "failed to persist remote job id");
        }

        tracing::info!(task_id = id.0, gid = %gid, "file pushed to remote downloader");
        self.task_log(id, &format!("remote push accepted, job {}", gid))
            .await;
        self.emit_event(Event::RemotePushed {
            id,
            gid: gid.clone(),
        });

        Ok(Pushed { gid, remote })
    }

    /// Upload the file to the file server. Returns whether it succeeded.
    async fn upload(&self, id: TaskId, file: &Path, settings: &Settings) -> bool {
        if !settings.ftp.is_complete() {
            tracing::warn!(task_id = id.0, "upload enabled but host or user missing, skipping");
            self.task_log(id, "upload skipped: host or user not configured")
                .await;
            return false;
        }

        let uploader = match self.transfers.uploader(&settings.ftp, &self.config.upload) {
            Ok(uploader) => uploader,
            Err(e) => {
                self.upload_failed(id, &e).await;
                return false;
            }
        };

        self.task_log(id, &format!("uploading via {}", uploader.name()))
            .await;

        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        let downloader = self.clone();
        let progress_logger = tokio::spawn(async move {
            while let Some(percent) = progress_rx.recv().await {
                downloader
                    .task_log(id, &format!("upload progress {}%", percent))
                    .await;
            }
        });

        let result = uploader.upload(file, Some(progress_tx)).await;
        // The uploader dropped its sender, so the logger drains and ends
        let _ = progress_logger.await;

        match result {
            Ok(remote_path) => {
                tracing::info!(task_id = id.0, remote_path = %remote_path, "upload finished");
                self.task_log(id, &format!("uploaded to {}", remote_path))
                    .await;
                self.emit_event(Event::Uploaded { id, remote_path });
                true
            }
            Err(e) => {
                self.upload_failed(id, &e).await;
                false
            }
        }
    }

    async fn upload_failed(&self, id: TaskId, error: &Error) {
        tracing::warn!(task_id = id.0, error = %error, "upload failed");
        self.task_log(id, &format!("upload failed: {}", error)).await;
        self.emit_event(Event::TransferFailed {
            id,
            step: "upload".to_string(),
            error: error.to_string(),
        });
    }

    /// Delete the local output file and clear `file_path`
    ///
    /// The basename is kept as `custom_name` first, so clients can still show a
    /// filename. A file that is already gone counts as deleted.
    pub(crate) async fn delete_output(&self, id: TaskId, file: &Path) {
        if let Err(e) = self.backfill_custom_name(id, file).await {
            tracing::warn!(task_id = id.0, error = %e, "failed to keep file name before deletion");
        }

        match tokio::fs::remove_file(file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(task_id = id.0, path = %file.display(), "output file already gone");
            }
            Err(e) => {
                tracing::warn!(task_id = id.0, path = %file.display(), error = %e, "failed to delete output file");
                self.task_log(id, &format!("failed to delete local file: {}", e))
                    .await;
                return;
            }
        }

        let update = TaskUpdate {
            file_path: Some(String::new()),
            ..Default::default()
        };
        if let Err(e) = self.db.update_task(id, &update).await {
            tracing::warn!(task_id = id.0, error = %e, "failed to clear file path");
        }

        tracing::info!(task_id = id.0, path = %file.display(), "local file deleted");
        self.task_log(id, "local file deleted").await;
        self.emit_event(Event::FileDeleted {
            id,
            path: file.to_path_buf(),
        });
    }

    async fn backfill_custom_name(&self, id: TaskId, file: &Path) -> Result<()> {
        let Some(task) = self.db.get_task(id).await? else {
            return Ok(());
        };
        if task.custom_name().is_some() {
            return Ok(());
        }

        let update = TaskUpdate {
            custom_name: Some(basename(file)?),
            ..Default::default()
        };
        self.db.update_task(id, &update).await?;
        Ok(())
    }
}

fn basename(file: &Path) -> Result<String> {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::Transfer(TransferError::Upload(format!(
                "output path has no file name: {}",
                file.display()
            )))
        })
}
