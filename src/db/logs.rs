//! Append-only task log lines.

use crate::error::DatabaseError;
use crate::types::TaskId;
use crate::{Error, Result};

use super::{Database, LogEntry};

impl Database {
    /// Append a line to a task's log.
    ///
    /// Lines for tasks that no longer exist are dropped silently.
    pub async fn append_log(&self, id: TaskId, message: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO task_logs (task_id, timestamp, message)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM tasks WHERE id = ?)
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to append task log: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a task's log, oldest line first
    pub async fn get_logs(&self, id: TaskId) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, LogEntry>(
            r#"
            SELECT id, task_id, timestamp, message
            FROM task_logs
            WHERE task_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task logs: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
