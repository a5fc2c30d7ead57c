//! Shutdown coordination.

use std::time::Duration;

use crate::error::Result;
use crate::types::Event;

use super::StreamDownloader;

impl StreamDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting submissions
    /// 2. Cancels the shutdown token, which every task token and remote monitor derives from
    /// 3. Waits up to `queue.shutdown_timeout` for running downloaders to exit
    ///
    /// Workers interrupted this way put their task back to `pending`, so the next
    /// start resumes it. Waiting tasks are left untouched for the same reason.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for store checkpoints.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new tasks
        self.queue_state
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new tasks");

        // 2. Terminate every running downloader through its token
        self.queue_state.shutdown.cancel();

        // 3. Wait for the registry to drain
        let shutdown_timeout = self.config.queue.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_tasks()).await {
            Ok(()) => tracing::info!("All running downloads stopped"),
            Err(_) => {
                let remaining = self.queue_state.registry.lock().await.active.len();
                tracing::warn!(
                    remaining,
                    "Timeout waiting for downloads to stop, proceeding with shutdown"
                );
            }
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Wait until no process is running or being stopped
    async fn wait_for_active_tasks(&self) {
        loop {
            let active_count = {
                let registry = self.queue_state.registry.lock().await;
                registry.active.len() + registry.stopping.len()
            };

            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running downloads to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
