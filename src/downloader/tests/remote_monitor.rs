use super::*;
use crate::downloader::remote_monitor::MonitorOutcome;
use crate::error::TransferError;
use crate::transfer::RemoteJobState;
use std::sync::Arc;

async fn output_file(temp_dir: &tempfile::TempDir) -> std::path::PathBuf {
    let file = temp_dir.path().join("downloads").join("pushed.mp4");
    tokio::fs::write(&file, b"bytes").await.unwrap();
    file
}

#[tokio::test]
async fn test_remote_error_keeps_file() {
    let (downloader, transfers, temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://cdn/x.m3u8", None).await.unwrap();
    let file = output_file(&temp_dir).await;
    transfers.remote.script(vec![Ok(RemoteJobState::Active), Ok(RemoteJobState::Error)]);

    let outcome = downloader
        .monitor_remote_job(id, "gid-1", file.clone(), transfers.remote.clone())
        .await;

    assert_eq!(outcome, MonitorOutcome::RemoteFailed(RemoteJobState::Error));
    assert!(file.exists());
}

#[tokio::test]
async fn test_removed_remote_job_keeps_file() {
    let (downloader, transfers, temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://cdn/x.m3u8", None).await.unwrap();
    let file = output_file(&temp_dir).await;
    transfers.remote.script(vec![Ok(RemoteJobState::Removed)]);

    let outcome = downloader
        .monitor_remote_job(id, "gid-1", file.clone(), transfers.remote.clone())
        .await;

    assert_eq!(outcome, MonitorOutcome::RemoteFailed(RemoteJobState::Removed));
    assert!(file.exists());
}

#[tokio::test]
async fn test_poll_budget_exhaustion_keeps_file() {
    let (downloader, transfers, temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://cdn/x.m3u8", None).await.unwrap();
    let file = output_file(&temp_dir).await;

    let outcome = downloader
        .monitor_remote_job(id, "gid-1", file.clone(), transfers.remote.clone())
        .await;

    assert_eq!(outcome, MonitorOutcome::TimedOut);
    assert_eq!(
        *transfers.remote.status_calls.lock().unwrap(),
        downloader.config.remote.monitor_max_polls
    );
    assert!(file.exists());
    let logs = downloader.db.get_logs(id).await.unwrap();
    assert!(logs.iter().any(|l| l.message.contains("timed out")));
}

#[tokio::test]
async fn test_status_errors_count_against_budget() {
    let (downloader, transfers, temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://cdn/x.m3u8", None).await.unwrap();
    let file = output_file(&temp_dir).await;
    let errors = (0..10)
        .map(|_| Err(TransferError::RemotePush("connection refused".into()).into()))
        .collect();
    transfers.remote.script(errors);

    let outcome = downloader
        .monitor_remote_job(id, "gid-1", file.clone(), transfers.remote.clone())
        .await;

    assert_eq!(outcome, MonitorOutcome::TimedOut);
    assert_eq!(*transfers.remote.status_calls.lock().unwrap(), 5);
}

#[tokio::test]
async fn test_error_then_complete_deletes() {
    let (downloader, transfers, temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://cdn/x.m3u8", None).await.unwrap();
    let file = output_file(&temp_dir).await;
    transfers.remote.script(vec![
        Err(TransferError::RemotePush("timeout".into()).into()),
        Ok(RemoteJobState::Complete),
    ]);

    let outcome = downloader
        .spawn_remote_monitor(id, "gid-1".into(), file.clone(), transfers.remote.clone())
        .await
        .unwrap();

    assert_eq!(outcome, MonitorOutcome::Deleted);
    assert!(!file.exists());
}

#[tokio::test]
async fn test_shutdown_interrupts_monitor() {
    let (downloader, transfers, temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://cdn/x.m3u8", None).await.unwrap();
    let file = output_file(&temp_dir).await;
    downloader.queue_state.shutdown.cancel();

    let remote: Arc<dyn crate::transfer::RemoteDownloader> = transfers.remote.clone();
    let outcome = downloader
        .monitor_remote_job(id, "gid-1", file.clone(), remote)
        .await;

    assert_eq!(outcome, MonitorOutcome::Interrupted);
    assert_eq!(*transfers.remote.status_calls.lock().unwrap(), 1);
    assert!(file.exists());
}
