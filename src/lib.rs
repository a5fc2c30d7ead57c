//! # stream-dl
//!
//! Download task orchestration engine for an external stream downloader
//! (N_m3u8DL-RE style HLS/DASH tool).
//!
//! ## Design Philosophy
//!
//! stream-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding behind a request layer
//! - **Store-driven** - Every task transition is persisted; the SQLite store is the source of truth
//! - **Live settings** - Paths, concurrency and transfer toggles are read fresh for every decision
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! A submitted task waits in a FIFO list until the admission loop has capacity, then runs the
//! downloader in its own process group while its output is parsed into progress. Finished files
//! can be pushed to an aria2 instance, uploaded over FTP, and deleted locally once a remote copy
//! is confirmed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stream_dl::{Config, StreamDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = StreamDownloader::new(Config::default()).await?;
//!     let _processor = downloader.start_queue_processor();
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let id = downloader
//!         .add_task("https://example.com/live/index.m3u8", Some("evening-news"))
//!         .await?;
//!     println!("queued task {}", id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Downloader output parsing
pub mod progress;
/// Runtime settings
pub mod settings;
/// Remote push and upload backends
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, Task, TaskUpdate};
pub use downloader::StreamDownloader;
pub use error::{DatabaseError, Error, ProcessError, Result, TaskError, TransferError};
pub use progress::parse_progress;
pub use settings::Settings;
pub use transfer::{
    Aria2Client, DefaultTransferProvider, FileUploader, FtpUploader, RemoteDownloader,
    RemoteJobState, TransferProvider,
};
pub use types::{BatchEntry, Event, ProgressUpdate, QueueStats, TaskId, TaskStatus};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use stream_dl::{Config, StreamDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = StreamDownloader::new(Config::default()).await?;
///     downloader.start_queue_processor();
///
///     // Run until SIGTERM/SIGINT, then drain running tasks
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: StreamDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
