//! Core types for stream-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a download task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for TaskId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for admission
    Pending,
    /// External downloader is running
    Downloading,
    /// Output file located and recorded
    Completed,
    /// Process failed, exited non-zero, or produced no output
    Failed,
    /// Stopped by the user
    Cancelled,
}

impl TaskStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Downloading,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// Convert the stored text form to a status
    pub fn from_db_str(status: &str) -> Self {
        match status {
            "pending" => TaskStatus::Pending,
            "downloading" => TaskStatus::Downloading,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" => TaskStatus::Cancelled,
            _ => TaskStatus::Failed, // Unknown rows surface as failures
        }
    }

    /// Text form stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this status ends the task lifecycle (a terminal task may still be resubmitted)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured progress extracted from one line of downloader output
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Progress percentage (0.0 to 100.0)
    pub progress: f64,
    /// Current speed as printed by the downloader (e.g. "12.5MB/s")
    pub speed: Option<String>,
    /// Estimated time remaining (HH:MM:SS or a sentinel while merging)
    pub eta: Option<String>,
    /// Amount downloaded so far (e.g. "602.51MB")
    pub downloaded_size: Option<String>,
    /// Total size (e.g. "1.71GB")
    pub total_size: Option<String>,
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task added to the waiting list
    Queued {
        /// Task ID
        id: TaskId,
        /// Source URL
        url: String,
    },

    /// Downloader process started
    Started {
        /// Task ID
        id: TaskId,
        /// OS process ID of the downloader
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },

    /// Progress persisted for a running task
    Progress {
        /// Task ID
        id: TaskId,
        /// Progress percentage (0.0 to 100.0)
        percent: f64,
        /// Current speed, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        /// Estimated time remaining, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
    },

    /// Output file located, task completed
    Completed {
        /// Task ID
        id: TaskId,
        /// Path of the produced file
        file_path: PathBuf,
        /// Size of the produced file in bytes
        file_size: u64,
    },

    /// Task failed
    Failed {
        /// Task ID
        id: TaskId,
        /// Error message
        error: String,
    },

    /// Task cancelled by the user
    Cancelled {
        /// Task ID
        id: TaskId,
    },

    /// File handed to the remote downloader
    RemotePushed {
        /// Task ID
        id: TaskId,
        /// Remote job identifier
        gid: String,
    },

    /// File uploaded to the file server
    Uploaded {
        /// Task ID
        id: TaskId,
        /// Remote path of the uploaded file
        remote_path: String,
    },

    /// A post-completion step failed (task stays completed)
    TransferFailed {
        /// Task ID
        id: TaskId,
        /// Step that failed ("remote_push", "upload", "remote_monitor")
        step: String,
        /// Error message
        error: String,
    },

    /// Local output file deleted after remote durability was confirmed
    FileDeleted {
        /// Task ID
        id: TaskId,
        /// Path that was deleted
        path: PathBuf,
    },

    /// Task record removed
    Removed {
        /// Task ID
        id: TaskId,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Queue statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total number of task records
    pub total: usize,
    /// Tasks waiting for admission
    pub pending: usize,
    /// Tasks persisted as downloading
    pub downloading: usize,
    /// Completed tasks
    pub completed: usize,
    /// Failed tasks
    pub failed: usize,
    /// Cancelled tasks
    pub cancelled: usize,
    /// Tasks with a live process right now
    pub active: Vec<TaskId>,
    /// Entries currently in the in-memory waiting list
    pub waiting: usize,
}

/// One parsed entry of a batch submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    /// Source URL
    pub url: String,
    /// Optional save name
    pub name: Option<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_text_for_all_variants() {
        for status in TaskStatus::ALL {
            assert_eq!(
                TaskStatus::from_db_str(status.as_str()),
                status,
                "{status:?} should survive the text encoding"
            );
        }
    }

    #[test]
    fn unknown_status_text_defaults_to_failed() {
        assert_eq!(TaskStatus::from_db_str("paused"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_db_str(""), TaskStatus::Failed);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Downloading.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn task_id_parses_and_displays() {
        let id = TaskId::from_str("42").unwrap();
        assert_eq!(id, TaskId(42));
        assert_eq!(id.to_string(), "42");
        assert!(TaskId::from_str("abc").is_err());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Cancelled { id: TaskId(5) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cancelled");
        assert_eq!(json["id"], 5);

        let event = Event::Started {
            id: TaskId(1),
            pid: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("pid").is_none(), "absent pid should be skipped");
    }
}
