//! Task finalization: classify the process exit and set the final status.

use std::path::Path;

use crate::db::TaskUpdate;
use crate::error::{Error, ProcessError, Result};
use crate::types::{Event, TaskStatus};
use crate::utils::{find_output_file, now_ts, probe_duration, resolve_binary};

use super::context::{Removal, TaskContext};
use super::orchestration::RunOutcome;
use super::process::exit_error;

/// Evaluate the supervision outcome and persist the final status.
///
/// Precedence: shutdown interruption, then user stop, then the exit itself.
/// A clean exit with an output file completes the task and hands it to the
/// post-completion pipeline.
pub(super) async fn finalize_task(ctx: TaskContext, outcome: Result<RunOutcome>, removal: Removal) {
    let id = ctx.id;
    let shutdown = ctx.downloader.queue_state.shutdown.is_cancelled();

    if shutdown && !removal.was_stopped {
        // Leave it pending so the next start picks it up again
        tracing::info!(task_id = id.0, "download interrupted by shutdown");
        let update = TaskUpdate {
            status: Some(TaskStatus::Pending),
            speed: Some(String::new()),
            eta: Some(String::new()),
            ..Default::default()
        };
        if let Err(e) = ctx.downloader.db.update_task(id, &update).await {
            tracing::error!(task_id = id.0, error = %e, "failed to persist interrupted task");
        }
        ctx.log("interrupted by shutdown").await;
        return;
    }

    if ctx.stopped_by_user(removal) || matches!(outcome, Ok(RunOutcome::Cancelled)) {
        // stop() already persisted cancelled; repeat it in case the worker's
        // `downloading` write landed after it
        let update = TaskUpdate {
            status: Some(TaskStatus::Cancelled),
            speed: Some(String::new()),
            eta: Some(String::new()),
            ..Default::default()
        };
        if let Err(e) = ctx.downloader.db.update_task(id, &update).await {
            tracing::error!(task_id = id.0, error = %e, "failed to persist cancellation");
        }
        tracing::info!(task_id = id.0, "download stopped");
        ctx.log("download stopped").await;
        return;
    }

    let (status, save_name, settings) = match outcome {
        Ok(RunOutcome::Exited {
            status,
            save_name,
            settings,
        }) => (status, save_name, settings),
        Ok(RunOutcome::Cancelled) => return,
        Err(e) => {
            ctx.mark_failed(&e.to_string()).await;
            return;
        }
    };

    if !status.success() {
        ctx.mark_failed(&exit_error(status).to_string()).await;
        return;
    }

    let extensions = ctx.downloader.config.process.output_extensions.clone();
    let dir = settings.download_dir.clone();
    let lookup_name = save_name.clone();
    let found = tokio::task::spawn_blocking(move || {
        find_output_file(&dir, &lookup_name, &extensions)
    })
    .await
    .ok()
    .flatten();

    let Some(file) = found else {
        tracing::warn!(task_id = id.0, save_name, "downloader exited cleanly without an output file");
        ctx.mark_failed(&ProcessError::OutputMissing.to_string()).await;
        return;
    };

    match complete(&ctx, &file, &resolve_binary(&settings.ffmpeg_path)).await {
        Ok(()) => {
            let downloader = ctx.downloader.clone();
            tokio::spawn(async move {
                downloader.run_post_completion(id, file).await;
            });
        }
        Err(e) => ctx.mark_failed(&e.to_string()).await,
    }
}

/// Persist the completed state for `file`
async fn complete(ctx: &TaskContext, file: &Path, ffmpeg: &Path) -> Result<()> {
    let id = ctx.id;
    let size = tokio::fs::metadata(file).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot stat output file {}: {}", file.display(), e),
        ))
    })?;
    let file_size = size.len();
    let duration = probe_duration(ffmpeg, file).await;

    let update = TaskUpdate {
        status: Some(TaskStatus::Completed),
        progress: Some(100.0),
        completed_at: Some(now_ts()),
        file_path: Some(file.to_string_lossy().into_owned()),
        file_size: Some(i64::try_from(file_size).unwrap_or(i64::MAX)),
        duration: duration.clone(),
        error_message: Some(String::new()),
        speed: Some(String::new()),
        eta: Some(String::new()),
        ..Default::default()
    };
    ctx.downloader.db.update_task(id, &update).await?;

    tracing::info!(
        task_id = id.0,
        path = %file.display(),
        file_size,
        duration = duration.as_deref().unwrap_or("unknown"),
        "download completed"
    );
    ctx.log(&format!("completed: {} ({} bytes)", file.display(), file_size))
        .await;
    ctx.downloader.emit_event(Event::Completed {
        id,
        file_path: file.to_path_buf(),
        file_size,
    });
    Ok(())
}
