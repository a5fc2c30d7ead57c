//! Shared test helpers for creating StreamDownloader instances in tests.

use crate::config::{Config, RemoteConfig, UploadConfig};
use crate::db::Database;
use crate::downloader::StreamDownloader;
use crate::error::{Result, TransferError};
use crate::settings::{Aria2Settings, FtpSettings, keys};
use crate::transfer::{
    FileUploader, PushOptions, RemoteDownloader, RemoteJobState, TransferProvider,
};
use crate::types::{TaskId, TaskStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedSender;

/// Config with intervals short enough for tests
pub(crate) fn fast_config(db_path: PathBuf) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = db_path;
    config.queue.poll_interval = Duration::from_millis(20);
    config.queue.error_backoff = Duration::from_millis(50);
    config.queue.shutdown_timeout = Duration::from_secs(5);
    config.process.terminate_grace = Duration::from_millis(500);
    config.process.reader_join_timeout = Duration::from_millis(500);
    config.process.progress_write_interval = Duration::ZERO;
    config.remote.monitor_poll_interval = Duration::from_millis(10);
    config.remote.monitor_error_backoff = Duration::from_millis(10);
    config.remote.monitor_max_polls = 5;
    config
}

/// Helper to create a test StreamDownloader with fake transfer backends.
/// Returns the downloader, the fakes and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (StreamDownloader, Arc<FakeTransfers>, tempfile::TempDir)
{
    let temp_dir = tempdir().unwrap();
    let transfers = Arc::new(FakeTransfers::default());
    let downloader = create_test_downloader_in(temp_dir.path(), transfers.clone()).await;
    (downloader, transfers, temp_dir)
}

/// Build a downloader whose store and directories live under `root`
pub(crate) async fn create_test_downloader_in(
    root: &Path,
    transfers: Arc<FakeTransfers>,
) -> StreamDownloader {
    let config = fast_config(root.join("test.db"));

    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();
    db.set_setting(keys::DOWNLOAD_DIR, &root.join("downloads").to_string_lossy())
        .await
        .unwrap();
    db.set_setting(keys::TEMP_DIR, &root.join("temp").to_string_lossy())
        .await
        .unwrap();
    db.set_setting(keys::FFMPEG_PATH, &root.join("no-ffmpeg").to_string_lossy())
        .await
        .unwrap();
    std::fs::create_dir_all(root.join("downloads")).unwrap();
    std::fs::create_dir_all(root.join("temp")).unwrap();

    StreamDownloader::from_parts(Arc::new(db), config, transfers)
}

/// Write an executable shell script
#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Install a fake downloader script as the downloader path setting.
///
/// The script sees the real argument list: `$1` url, `$3` save dir, `$5` save name.
#[cfg(unix)]
pub(crate) async fn install_fake_downloader(downloader: &StreamDownloader, dir: &Path, body: &str) {
    let script = write_script(dir, "fake-downloader", body);
    downloader
        .db
        .set_setting(keys::DOWNLOADER_PATH, &script.to_string_lossy())
        .await
        .unwrap();
}

/// Downloader script that reports progress and writes `<save_dir>/<save_name>.mp4`
pub(crate) const SUCCESS_SCRIPT: &str = r#"echo "Downloading... 45.2% 12.5MB/s 602.51MB/1.71GB ETA: 00:02:10"
printf 'video bytes' > "$3/$5.mp4"
echo "Merging segments..."
exit 0"#;

/// Downloader script that runs until it is signalled
pub(crate) const LONG_RUNNING_SCRIPT: &str = r#"echo "Downloading... 1.0% 1MB/s 1MB/100MB ETA: 00:10:00"
sleep 30
exit 0"#;

/// Set one setting
pub(crate) async fn set(downloader: &StreamDownloader, key: &str, value: &str) {
    downloader.db.set_setting(key, value).await.unwrap();
}

/// Poll the store until the task reaches `status`, panicking after `timeout`
pub(crate) async fn wait_for_status(
    downloader: &StreamDownloader,
    id: TaskId,
    status: TaskStatus,
    timeout: Duration,
) -> crate::db::Task {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let task = downloader.db.get_task(id).await.unwrap().unwrap();
        if task.status() == status {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} stuck in {} waiting for {}",
            id,
            task.status(),
            status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until `check` holds, panicking after `timeout`
pub(crate) async fn wait_until<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// In-memory remote downloader
///
/// `add_uri` returns `gid` or fails when `gid` is `None`. `tell_status` pops
/// scripted answers and repeats `Active` once they run out.
#[derive(Default)]
pub(crate) struct FakeRemote {
    pub(crate) gid: Mutex<Option<String>>,
    pub(crate) statuses: Mutex<VecDeque<Result<RemoteJobState>>>,
    pub(crate) pushes: Mutex<Vec<(String, PushOptions)>>,
    pub(crate) status_calls: Mutex<u32>,
}

impl FakeRemote {
    pub(crate) fn accepting(gid: &str) -> Self {
        Self {
            gid: Mutex::new(Some(gid.to_string())),
            ..Default::default()
        }
    }

    pub(crate) fn script(&self, states: Vec<Result<RemoteJobState>>) {
        self.statuses.lock().unwrap().extend(states);
    }
}

#[async_trait]
impl RemoteDownloader for FakeRemote {
    async fn add_uri(&self, uri: &str, options: &PushOptions) -> Result<String> {
        self.pushes
            .lock()
            .unwrap()
            .push((uri.to_string(), options.clone()));
        self.gid
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransferError::RemotePush("connection refused".into()).into())
    }

    async fn tell_status(&self, _gid: &str) -> Result<RemoteJobState> {
        *self.status_calls.lock().unwrap() += 1;
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(RemoteJobState::Active))
    }

    fn name(&self) -> &'static str {
        "fake-remote"
    }
}

/// In-memory uploader that records uploaded paths
#[derive(Default)]
pub(crate) struct FakeUploader {
    pub(crate) fail: Mutex<bool>,
    pub(crate) uploads: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl FileUploader for FakeUploader {
    async fn upload(&self, local: &Path, progress: Option<UnboundedSender<u8>>) -> Result<String> {
        if *self.fail.lock().unwrap() {
            return Err(TransferError::Upload("550 permission denied".into()).into());
        }
        self.uploads.lock().unwrap().push(local.to_path_buf());
        if let Some(tx) = progress {
            for percent in (10..=100).step_by(10) {
                let _ = tx.send(percent);
            }
        }
        let name = local.file_name().unwrap().to_string_lossy();
        Ok(format!("/uploads/{}", name))
    }

    async fn check_connection(&self) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(TransferError::Upload("530 login incorrect".into()).into());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake-uploader"
    }
}

/// Provider handing out the same fakes every time
pub(crate) struct FakeTransfers {
    pub(crate) remote: Arc<FakeRemote>,
    pub(crate) uploader: Arc<FakeUploader>,
}

impl Default for FakeTransfers {
    fn default() -> Self {
        Self {
            remote: Arc::new(FakeRemote::accepting("gid-1")),
            uploader: Arc::new(FakeUploader::default()),
        }
    }
}

impl TransferProvider for FakeTransfers {
    fn remote_downloader(
        &self,
        _settings: &Aria2Settings,
        _config: &RemoteConfig,
    ) -> Result<Arc<dyn RemoteDownloader>> {
        Ok(self.remote.clone())
    }

    fn uploader(
        &self,
        _settings: &FtpSettings,
        _config: &UploadConfig,
    ) -> Result<Arc<dyn FileUploader>> {
        Ok(self.uploader.clone())
    }
}
