//! Database layer for stream-dl
//!
//! Handles SQLite persistence for tasks, their append-only logs, and runtime settings.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`tasks`]: Task CRUD and whitelisted field updates
//! - [`logs`]: Append-only task log lines
//! - [`settings`]: Flat key/value runtime settings

use crate::types::{TaskId, TaskStatus};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::Path;

mod logs;
mod migrations;
mod settings;
mod tasks;

/// Task record from database
#[derive(Debug, Clone, FromRow)]
pub struct Task {
    /// Unique database ID
    pub id: TaskId,
    /// Source URL handed to the downloader
    pub url: String,
    /// Status text (see [`Task::status`])
    pub status: String,
    /// Progress percentage (0.0-100.0)
    pub progress: f64,
    /// Unix timestamp when the task was created
    pub created_at: i64,
    /// Unix timestamp when the downloader started
    pub started_at: Option<i64>,
    /// Unix timestamp when the task completed
    pub completed_at: Option<i64>,
    /// Path of the produced file (empty when none or deleted)
    pub file_path: String,
    /// Size of the produced file in bytes
    pub file_size: Option<i64>,
    /// Media duration as HH:MM:SS
    pub duration: Option<String>,
    /// Last error message (empty when none)
    pub error_message: String,
    /// Save name, retained as the display name after the file is deleted
    pub custom_name: String,
    /// Latest speed text
    pub speed: String,
    /// Latest ETA text
    pub eta: String,
    /// Latest total size text
    pub total_size: String,
    /// Latest downloaded size text
    pub downloaded_size: String,
    /// Remote downloader job ID (empty unless a push succeeded)
    pub aria2_gid: String,
}

impl Task {
    /// Parsed status
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_db_str(&self.status)
    }

    /// Custom save name, if one was given or backfilled
    pub fn custom_name(&self) -> Option<&str> {
        non_empty(&self.custom_name)
    }

    /// Output file path, if the file has not been deleted
    pub fn file_path(&self) -> Option<&Path> {
        non_empty(&self.file_path).map(Path::new)
    }

    /// Remote job ID, if a push succeeded
    pub fn aria2_gid(&self) -> Option<&str> {
        non_empty(&self.aria2_gid)
    }

    /// Name a client should show for this task.
    ///
    /// Prefers the custom name, then the basename of the output file.
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.custom_name() {
            return Some(name.to_string());
        }
        self.file_path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

/// Field-level update of a task.
///
/// Only the fields listed here can be written after creation; `None` leaves
/// the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// Source URL
    pub url: Option<String>,
    /// Lifecycle status
    pub status: Option<TaskStatus>,
    /// Progress percentage
    pub progress: Option<f64>,
    /// Start timestamp
    pub started_at: Option<i64>,
    /// Completion timestamp
    pub completed_at: Option<i64>,
    /// Output file path (empty string clears it)
    pub file_path: Option<String>,
    /// Output file size
    pub file_size: Option<i64>,
    /// Media duration
    pub duration: Option<String>,
    /// Error message (empty string clears it)
    pub error_message: Option<String>,
    /// Save/display name
    pub custom_name: Option<String>,
    /// Speed text
    pub speed: Option<String>,
    /// ETA text
    pub eta: Option<String>,
    /// Total size text
    pub total_size: Option<String>,
    /// Downloaded size text
    pub downloaded_size: Option<String>,
    /// Remote job ID
    pub aria2_gid: Option<String>,
}

impl TaskUpdate {
    /// Update that only changes the status
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Update that marks the task failed with a message
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.status.is_none()
            && self.progress.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
            && self.file_path.is_none()
            && self.file_size.is_none()
            && self.duration.is_none()
            && self.error_message.is_none()
            && self.custom_name.is_none()
            && self.speed.is_none()
            && self.eta.is_none()
            && self.total_size.is_none()
            && self.downloaded_size.is_none()
            && self.aria2_gid.is_none()
    }
}

/// One line of a task's log
#[derive(Debug, Clone, FromRow)]
pub struct LogEntry {
    /// Unique database ID
    pub id: i64,
    /// Task this line belongs to
    pub task_id: TaskId,
    /// Unix timestamp when the line was appended
    pub timestamp: i64,
    /// Log text
    pub message: String,
}

/// Database handle for stream-dl
pub struct Database {
    pool: SqlitePool,
}
