//! Task CRUD and whitelisted field updates.

use crate::error::DatabaseError;
use crate::types::{TaskId, TaskStatus};
use crate::{Error, Result};
use sqlx::{QueryBuilder, Sqlite};

use super::{Database, Task, TaskUpdate};

const TASK_COLUMNS: &str = r#"
    id, url, status, progress, created_at, started_at, completed_at,
    file_path, file_size, duration, error_message, custom_name,
    speed, eta, total_size, downloaded_size, aria2_gid
"#;

impl Database {
    /// Insert a new pending task
    pub async fn create_task(&self, url: &str, custom_name: Option<&str>) -> Result<TaskId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (url, status, progress, created_at, custom_name)
            VALUES (?, ?, 0.0, ?, ?)
            "#,
        )
        .bind(url)
        .bind(TaskStatus::Pending.as_str())
        .bind(now)
        .bind(custom_name.unwrap_or(""))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            )))
        })?;

        Ok(TaskId(result.last_insert_rowid()))
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = ?",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all tasks, newest first
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC, id DESC",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List tasks with a specific status, oldest first (admission order)
    pub async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE status = ? ORDER BY id ASC",
            TASK_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Count tasks per status
    pub async fn count_by_status(&self) -> Result<Vec<(TaskStatus, usize)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to count tasks: {}",
                        e
                    )))
                })?;

        Ok(rows
            .into_iter()
            .map(|(status, count)| (TaskStatus::from_db_str(&status), count.max(0) as usize))
            .collect())
    }

    /// Apply a field-level update.
    ///
    /// Only the fields set in `update` are written. Returns whether a row changed
    /// (false for an unknown task or an empty update).
    pub async fn update_task(&self, id: TaskId, update: &TaskUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE tasks SET ");
        let mut fields = builder.separated(", ");

        if let Some(url) = &update.url {
            fields.push("url = ");
            fields.push_bind_unseparated(url.clone());
        }
        if let Some(status) = update.status {
            fields.push("status = ");
            fields.push_bind_unseparated(status.as_str());
        }
        if let Some(progress) = update.progress {
            fields.push("progress = ");
            fields.push_bind_unseparated(progress);
        }
        if let Some(started_at) = update.started_at {
            fields.push("started_at = ");
            fields.push_bind_unseparated(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            fields.push("completed_at = ");
            fields.push_bind_unseparated(completed_at);
        }
        if let Some(file_path) = &update.file_path {
            fields.push("file_path = ");
            fields.push_bind_unseparated(file_path.clone());
        }
        if let Some(file_size) = update.file_size {
            fields.push("file_size = ");
            fields.push_bind_unseparated(file_size);
        }
        if let Some(duration) = &update.duration {
            fields.push("duration = ");
            fields.push_bind_unseparated(duration.clone());
        }
        if let Some(error_message) = &update.error_message {
            fields.push("error_message = ");
            fields.push_bind_unseparated(error_message.clone());
        }
        if let Some(custom_name) = &update.custom_name {
            fields.push("custom_name = ");
            fields.push_bind_unseparated(custom_name.clone());
        }
        if let Some(speed) = &update.speed {
            fields.push("speed = ");
            fields.push_bind_unseparated(speed.clone());
        }
        if let Some(eta) = &update.eta {
            fields.push("eta = ");
            fields.push_bind_unseparated(eta.clone());
        }
        if let Some(total_size) = &update.total_size {
            fields.push("total_size = ");
            fields.push_bind_unseparated(total_size.clone());
        }
        if let Some(downloaded_size) = &update.downloaded_size {
            fields.push("downloaded_size = ");
            fields.push_bind_unseparated(downloaded_size.clone());
        }
        if let Some(aria2_gid) = &update.aria2_gid {
            fields.push("aria2_gid = ");
            fields.push_bind_unseparated(aria2_gid.clone());
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update task: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Reset a task for (re)submission: pending, zero progress, cleared error/speed/eta
    pub async fn reset_for_submission(&self, id: TaskId) -> Result<bool> {
        self.update_task(
            id,
            &TaskUpdate {
                status: Some(TaskStatus::Pending),
                progress: Some(0.0),
                error_message: Some(String::new()),
                speed: Some(String::new()),
                eta: Some(String::new()),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete a task and (via cascade) its logs
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
