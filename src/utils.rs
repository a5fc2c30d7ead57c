//! Utility functions for save names, batch input, output discovery and media probing

use crate::error::Result;
use crate::types::{BatchEntry, TaskId};
use chrono::{DateTime, Local};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::SystemTime;

/// Save name for a task: the custom name when given, otherwise
/// `video_<id>_<YYYYmmdd_HHMMSS>` in local time.
///
/// # Examples
///
/// ```
/// use stream_dl::utils::save_name;
/// use stream_dl::TaskId;
///
/// assert_eq!(save_name(TaskId(3), Some("news")), "news");
/// assert!(save_name(TaskId(3), None).starts_with("video_3_"));
/// ```
pub fn save_name(id: TaskId, custom_name: Option<&str>) -> String {
    match custom_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => generated_save_name(id, Local::now()),
    }
}

fn generated_save_name(id: TaskId, now: DateTime<Local>) -> String {
    format!("{}{}", generated_prefix(id), now.format("%Y%m%d_%H%M%S"))
}

fn generated_prefix(id: TaskId) -> String {
    format!("video_{}_", id.0)
}

/// Parse batch submission text into entries
///
/// One entry per non-empty line. A line may be `url` or `url|name`; the name is
/// trimmed and an empty name means none. Lines with an empty URL are skipped.
///
/// # Examples
///
/// ```
/// use stream_dl::utils::parse_batch_entries;
///
/// let entries = parse_batch_entries("https://a/x.m3u8|first\n\nhttps://b/y.m3u8\n");
/// assert_eq!(entries.len(), 2);
/// assert_eq!(entries[0].name.as_deref(), Some("first"));
/// assert_eq!(entries[1].name, None);
/// ```
pub fn parse_batch_entries(text: &str) -> Vec<BatchEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (url, name) = match line.split_once('|') {
                Some((url, name)) => (url.trim(), Some(name.trim())),
                None => (line, None),
            };
            if url.is_empty() {
                return None;
            }
            Some(BatchEntry {
                url: url.to_string(),
                name: name.filter(|n| !n.is_empty()).map(str::to_string),
            })
        })
        .collect()
}

/// Locate the file the downloader produced for `save_name` in `dir`
///
/// Phase 1 tries `<dir>/<save_name><ext>` for each extension in order. Phase 2
/// scans `dir` for entries whose name starts with `save_name` and picks the most
/// recently modified one; entries whose mtime cannot be read sort as oldest.
pub fn find_output_file(dir: &Path, save_name: &str, extensions: &[String]) -> Option<PathBuf> {
    for ext in extensions {
        let candidate = dir.join(format!("{}{}", save_name, ext));
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(save_name))
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

/// Whether a temp-dir entry belongs to a task
///
/// The name must start with the task's save name or with its generated
/// `video_<id>_` prefix, so task 1 never claims `video_12_...`.
pub fn is_task_temp_entry(file_name: &str, save_name: &str, id: TaskId) -> bool {
    (!save_name.is_empty() && file_name.starts_with(save_name))
        || file_name.starts_with(&generated_prefix(id))
}

// Literal pattern; compilation is exercised by the unit tests below
#[allow(clippy::expect_used)]
static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d{2}):(\d{2}):(\d{2})\.\d{2}").expect("duration pattern")
});

/// Extract `HH:MM:SS` from ffmpeg's `Duration: HH:MM:SS.ff` banner line
pub fn parse_ffmpeg_duration(output: &str) -> Option<String> {
    let caps = DURATION_PATTERN.captures(output)?;
    Some(format!("{}:{}:{}", &caps[1], &caps[2], &caps[3]))
}

/// Probe the media duration of `file` with ffmpeg
///
/// Runs `<ffmpeg> -i <file> -hide_banner` and parses its stderr. ffmpeg exits
/// nonzero when no output is given, so only the banner matters. Any failure
/// yields `None`.
pub async fn probe_duration(ffmpeg: &Path, file: &Path) -> Option<String> {
    let output = tokio::process::Command::new(ffmpeg)
        .arg("-i")
        .arg(file)
        .arg("-hide_banner")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(output) => parse_ffmpeg_duration(&String::from_utf8_lossy(&output.stderr)),
        Err(e) => {
            tracing::debug!(ffmpeg = %ffmpeg.display(), error = %e, "duration probe failed to start");
            None
        }
    }
}

/// Log-and-continue for side-effecting steps whose failure must not abort the caller
///
/// Returns the value on success. On failure logs a warning naming the task and
/// the step, and returns `None`.
pub fn log_step<T>(result: Result<T>, id: TaskId, step: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(task_id = id.0, step, error = %e, "step failed, continuing");
            None
        }
    }
}

/// Resolve an external binary setting to something spawnable
///
/// A configured path that exists is used as is. Otherwise the file name is
/// looked up on `PATH`, and the configured value is returned unchanged if that
/// fails too (the spawn then reports the missing binary).
pub fn resolve_binary(configured: &Path) -> PathBuf {
    if configured.is_file() {
        return configured.to_path_buf();
    }

    configured
        .file_name()
        .and_then(|name| which::which(name).ok())
        .unwrap_or_else(|| configured.to_path_buf())
}

/// Current unix timestamp in seconds
pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
