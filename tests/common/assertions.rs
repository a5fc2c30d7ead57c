//! Waiting helpers and assertions for end-to-end tests

use std::time::Duration;
use stream_dl::{Event, StreamDownloader, Task, TaskId, TaskStatus};
use tokio::sync::broadcast::Receiver;

/// Result of waiting for a task to finish downloading
#[derive(Debug)]
pub enum WaitResult {
    /// Task completed with an output file
    Completed,
    /// Task failed with error
    Failed(String),
    /// Task was cancelled
    Cancelled,
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait on `events` for the task to reach a terminal event
pub async fn wait_for_terminal(events: &mut Receiver<Event>, id: TaskId, timeout: Duration) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { id: event_id, .. }) if event_id == id => {
                    return WaitResult::Completed;
                }
                Ok(Event::Failed { id: event_id, error }) if event_id == id => {
                    return WaitResult::Failed(error);
                }
                Ok(Event::Cancelled { id: event_id }) if event_id == id => {
                    return WaitResult::Cancelled;
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait on `events` for the first event matching `predicate`
pub async fn wait_for_event<F>(events: &mut Receiver<Event>, timeout: Duration, predicate: F) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    })
    .await;

    result.ok().flatten()
}

/// Fetch the task and assert its persisted status
pub async fn assert_task_status(downloader: &StreamDownloader, id: TaskId, expected: TaskStatus) -> Task {
    let task = downloader
        .db
        .get_task(id)
        .await
        .expect("store query failed")
        .expect("task not found");
    assert_eq!(
        task.status(),
        expected,
        "task {} has status {}, error: {:?}",
        id,
        task.status(),
        task.error_message
    );
    task
}
