//! Download task orchestration: top-level lifecycle for a single download.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::TaskUpdate;
use crate::error::{Error, Result};
use crate::progress::{ProgressThrottle, parse_progress};
use crate::settings::Settings;
use crate::types::{Event, TaskId, TaskStatus};
use crate::utils::{now_ts, resolve_binary, save_name};

use super::super::StreamDownloader;
use super::context::TaskContext;
use super::finalization::finalize_task;
use super::process::{
    build_downloader_args, command_line, kill_now, spawn_downloader, spawn_reader, terminate,
};

/// What the supervised process did
pub(super) enum RunOutcome {
    /// The process exited (on its own or after termination)
    Exited {
        status: ExitStatus,
        save_name: String,
        settings: Settings,
    },
    /// A stop raced the spawn; the process was killed before doing any work
    Cancelled,
}

/// Core download task -- supervises one downloader process from reservation to final status.
///
/// Phases:
/// 1. Persist `downloading` and prepare directories
/// 2. Spawn the downloader in its own process group
/// 3. Stream its output into the log and the progress fields
/// 4. Wait for exit, terminating the group on cancellation
/// 5. Leave the active registry, classify the exit and run the post-completion pipeline
pub(crate) async fn run_download_task(ctx: TaskContext) {
    let outcome = supervise(&ctx).await;

    // Registry cleanup happens on every path so no ghost entries remain
    let removal = ctx.remove_from_active().await;

    finalize_task(ctx, outcome, removal).await;
}

async fn supervise(ctx: &TaskContext) -> Result<RunOutcome> {
    let id = ctx.id;
    let downloader = &ctx.downloader;
    let process_config = &downloader.config.process;

    if ctx.token.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    let settings = downloader.settings().await?;
    let save_name = save_name(id, ctx.name.as_deref());

    downloader
        .db
        .update_task(
            id,
            &TaskUpdate {
                status: Some(TaskStatus::Downloading),
                started_at: Some(now_ts()),
                error_message: Some(String::new()),
                ..Default::default()
            },
        )
        .await?;
    ctx.log(&format!("starting download as '{}'", save_name)).await;

    create_dir(&settings.download_dir, "download").await?;
    create_dir(&settings.temp_dir, "temp").await?;

    let args = build_downloader_args(
        &ctx.url,
        &settings.download_dir,
        &save_name,
        &settings.temp_dir,
        process_config,
    );
    let binary = resolve_binary(&settings.downloader_path);
    let mut child = spawn_downloader(&binary, &args)?;

    let Some(pid) = child.id() else {
        // Already reaped: it exited before we could look at it
        let status = child.wait().await?;
        return Ok(RunOutcome::Exited {
            status,
            save_name,
            settings,
        });
    };

    if !ctx.record_pid(pid).await {
        tracing::info!(task_id = id.0, pid, "stop raced the spawn, killing downloader");
        kill_now(&mut child, pid).await;
        return Ok(RunOutcome::Cancelled);
    }

    let cmdline = command_line(&binary, &args);
    tracing::info!(task_id = id.0, pid, command = %cmdline, "downloader started");
    ctx.log(&format!("command: {}", cmdline)).await;
    downloader.emit_event(Event::Started { id, pid: Some(pid) });

    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, line_tx.clone()));
    }
    drop(line_tx);

    let consumer = tokio::spawn(consume_output(
        downloader.clone(),
        id,
        line_rx,
        ProgressThrottle::new(
            process_config.progress_write_interval,
            process_config.progress_delta_threshold,
        ),
    ));

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = ctx.token.cancelled() => {
            tracing::info!(task_id = id.0, pid, "terminating downloader process group");
            terminate(&mut child, Some(pid), process_config.terminate_grace).await?
        }
    };

    join_output(readers, consumer, process_config.reader_join_timeout, id).await;

    tracing::info!(task_id = id.0, pid, ?status, "downloader exited");
    Ok(RunOutcome::Exited {
        status,
        save_name,
        settings,
    })
}

async fn create_dir(path: &std::path::Path, what: &str) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create {} directory '{}': {}",
                what,
                path.display(),
                e
            ),
        ))
    })
}

/// Log every line, parse progress and persist throttled updates
async fn consume_output(
    downloader: StreamDownloader,
    id: TaskId,
    mut lines: mpsc::UnboundedReceiver<String>,
    mut throttle: ProgressThrottle,
) {
    while let Some(line) = lines.recv().await {
        tracing::debug!(task_id = id.0, line = %line, "downloader output");
        downloader.task_log(id, &line).await;

        let Some(update) = parse_progress(&line) else {
            continue;
        };
        if !throttle.should_write(update.progress) {
            continue;
        }

        let write = TaskUpdate {
            progress: Some(update.progress),
            speed: update.speed.clone(),
            eta: update.eta.clone(),
            downloaded_size: update.downloaded_size.clone(),
            total_size: update.total_size.clone(),
            ..Default::default()
        };
        if let Err(e) = downloader.db.update_task(id, &write).await {
            tracing::warn!(task_id = id.0, error = %e, "failed to persist progress");
            continue;
        }

        downloader.emit_event(Event::Progress {
            id,
            percent: update.progress,
            speed: update.speed,
            eta: update.eta,
        });
    }
}

/// Wait for the readers and the consumer, abandoning readers held open by orphans
async fn join_output(
    readers: Vec<JoinHandle<()>>,
    consumer: JoinHandle<()>,
    limit: Duration,
    id: TaskId,
) {
    let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
    let joined = tokio::time::timeout(limit, futures::future::join_all(readers)).await;
    if joined.is_err() {
        tracing::warn!(task_id = id.0, "output readers still open after exit, abandoning them");
        for handle in aborts {
            handle.abort();
        }
    }

    // Senders are gone once the readers ended, so the consumer drains and stops
    if tokio::time::timeout(limit, consumer).await.is_err() {
        tracing::warn!(task_id = id.0, "output consumer did not finish in time");
    }
}
