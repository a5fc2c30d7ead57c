//! Engine setup and fake external binaries for end-to-end tests

use std::path::{Path, PathBuf};
use std::time::Duration;
use stream_dl::settings::keys;
use stream_dl::{Config, StreamDownloader};
use tempfile::TempDir;

/// Downloader stand-in: prints progress, writes `<save_dir>/<save_name>.mp4`, exits 0
pub const SUCCESS_SCRIPT: &str = r#"echo "Downloading... 12.0% 4.2MB/s 10MB/80MB ETA: 00:00:30"
echo "Downloading... 64.5% 5.0MB/s 52MB/80MB ETA: 00:00:06"
printf 'end to end video' > "$3/$5.mp4"
echo "Merging segments..."
exit 0"#;

/// ffmpeg stand-in printing a duration banner
pub const FFMPEG_SCRIPT: &str = r#"echo "  Duration: 00:03:25.48, start: 0.000000, bitrate: 2400 kb/s" >&2
exit 1"#;

/// Write an executable shell script
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Engine with fast timings, directories in a tempdir and the fake binaries installed
pub async fn create_e2e_downloader(downloader_body: &str) -> (StreamDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let root = temp_dir.path();

    let mut config = Config::default();
    config.persistence.database_path = root.join("stream-dl.db");
    config.queue.poll_interval = Duration::from_millis(20);
    config.process.progress_write_interval = Duration::ZERO;
    config.process.terminate_grace = Duration::from_millis(500);
    config.remote.monitor_poll_interval = Duration::from_millis(20);
    config.remote.monitor_error_backoff = Duration::from_millis(20);
    config.remote.monitor_max_polls = 50;

    let downloader = StreamDownloader::new(config).await.expect("engine start");

    let downloader_bin = write_script(root, "N_m3u8DL-RE", downloader_body);
    let ffmpeg_bin = write_script(root, "ffmpeg", FFMPEG_SCRIPT);
    let settings = [
        (keys::DOWNLOADER_PATH, downloader_bin.to_string_lossy().into_owned()),
        (keys::FFMPEG_PATH, ffmpeg_bin.to_string_lossy().into_owned()),
        (keys::DOWNLOAD_DIR, root.join("downloads").to_string_lossy().into_owned()),
        (keys::TEMP_DIR, root.join("temp").to_string_lossy().into_owned()),
    ];
    for (key, value) in settings {
        downloader.db.set_setting(key, &value).await.expect("set setting");
    }

    (downloader, temp_dir)
}
