//! Flat key/value runtime settings.

use std::collections::HashMap;

use crate::error::DatabaseError;
use crate::settings::{DEFAULT_SETTINGS, Settings};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Get a setting, or `default` when the key is absent
    pub async fn get_setting(&self, key: &str, default: &str) -> Result<String> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get setting {}: {}",
                    key, e
                )))
            })?;

        Ok(value.unwrap_or_else(|| default.to_string()))
    }

    /// Insert or replace a setting
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set setting {}: {}",
                key, e
            )))
        })?;

        Ok(())
    }

    /// All stored settings
    pub async fn all_settings(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list settings: {}",
                    e
                )))
            })?;

        Ok(rows.into_iter().collect())
    }

    /// Typed snapshot of the current settings
    pub async fn load_settings(&self) -> Result<Settings> {
        Ok(Settings::from_map(&self.all_settings().await?))
    }

    /// Insert default values for keys that are not set yet
    pub async fn seed_default_settings(&self) -> Result<()> {
        for (key, value) in DEFAULT_SETTINGS {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(*key)
                .bind(*value)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to seed setting {}: {}",
                        key, e
                    )))
                })?;
        }

        Ok(())
    }
}
