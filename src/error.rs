//! Error types for stream-dl
//!
//! This module provides the error hierarchy for the library:
//! - Domain-specific error types (Task admission, Process supervision, Transfers)
//! - Stable machine-readable error codes for logs and event consumers
//! - Context information (task ID, exit code, remote endpoint)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stream-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stream-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration or settings key that caused the error (e.g., "aria2_rpc_url")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Task admission or control error
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// External downloader process error
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Remote push, monitor or upload error
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Task admission and control errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task already has a running (or still terminating) process
    #[error("task {id} is already running")]
    AlreadyRunning {
        /// The task ID that was submitted twice
        id: i64,
    },

    /// Stop requested for a task that is neither running nor waiting
    #[error("task {id} is not running or waiting")]
    NotActive {
        /// The task ID that could not be stopped
        id: i64,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task ID that is in an invalid state for the operation
        id: i64,
        /// The operation that was attempted (e.g., "retry")
        operation: String,
        /// The current state that prevents the operation (e.g., "downloading")
        current_state: String,
    },

    /// Task not found in the store
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: i64,
    },
}

/// External downloader process errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The downloader binary could not be started
    #[error("failed to start {binary}: {reason}")]
    Spawn {
        /// Binary that failed to start
        binary: PathBuf,
        /// Underlying OS error message
        reason: String,
    },

    /// The downloader exited unsuccessfully
    #[error("downloader exited with code {code}")]
    Exit {
        /// Process exit code
        code: i32,
    },

    /// The downloader was terminated by a signal
    #[error("downloader terminated by signal {signal}")]
    Signaled {
        /// Terminating signal number
        signal: i32,
    },

    /// The downloader exited successfully but produced no output file
    #[error("output file missing")]
    OutputMissing,

    /// The task was cancelled between admission and process start
    #[error("task cancelled before the downloader started")]
    Cancelled,
}

/// Post-completion transfer errors (remote push, status monitor, upload)
#[derive(Debug, Error)]
pub enum TransferError {
    /// JSON-RPC call to the remote downloader failed
    #[error("remote push failed: {0}")]
    RemotePush(String),

    /// Upload to the file server failed
    #[error("upload failed: {0}")]
    Upload(String),

    /// Remote job did not reach a terminal state within the polling budget
    #[error("remote job {gid} did not finish after {polls} status checks")]
    MonitorTimeout {
        /// Remote job identifier
        gid: String,
        /// Number of status checks performed
        polls: u32,
    },

    /// Transfer settings are incomplete (missing host or user)
    #[error("incomplete transfer settings: {0}")]
    IncompleteConfig(String),
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Task(e) => match e {
                TaskError::AlreadyRunning { .. } => "already_running",
                TaskError::NotActive { .. } => "not_active",
                TaskError::InvalidState { .. } => "invalid_state",
                TaskError::NotFound { .. } => "task_not_found",
            },
            Error::Process(e) => match e {
                ProcessError::Spawn { .. } => "spawn_failed",
                ProcessError::Exit { .. } => "nonzero_exit",
                ProcessError::Signaled { .. } => "signaled",
                ProcessError::OutputMissing => "output_missing",
                ProcessError::Cancelled => "cancelled",
            },
            Error::Transfer(e) => match e {
                TransferError::RemotePush(_) => "remote_push_failed",
                TransferError::Upload(_) => "upload_failed",
                TransferError::MonitorTimeout { .. } => "monitor_timeout",
                TransferError::IncompleteConfig(_) => "incomplete_config",
            },
            Error::Io(_) => "io_error",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}
