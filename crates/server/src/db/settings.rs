//! Settings database operations.
//!
//! A flat key to JSON store for site configuration (home page content,
//! contact details, payment methods, shipping rates).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use sqlx::types::Json;

use super::RepositoryError;

/// A stored setting.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SettingEntry {
    pub key: String,
    #[sqlx(json)]
    pub value: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// Repository for settings.
pub struct SettingsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SettingsRepository<'a> {
    /// Create a new settings repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a setting value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, key: &str) -> Result<Option<JsonValue>, RepositoryError> {
        let value: Option<Json<JsonValue>> =
            sqlx::query_scalar("SELECT value FROM shop.setting WHERE key = $1")
                .bind(key)
                .fetch_optional(self.pool)
                .await?;
        Ok(value.map(|v| v.0))
    }

    /// Insert or replace a setting value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set(&self, key: &str, value: &JsonValue) -> Result<SettingEntry, RepositoryError> {
        let entry = sqlx::query_as::<_, SettingEntry>(
            "INSERT INTO shop.setting (key, value)
             VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
             RETURNING key, value, updated_at",
        )
        .bind(key)
        .bind(Json(value))
        .fetch_one(self.pool)
        .await?;
        Ok(entry)
    }

    /// List all settings ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<SettingEntry>, RepositoryError> {
        let entries = sqlx::query_as::<_, SettingEntry>(
            "SELECT key, value, updated_at FROM shop.setting ORDER BY key",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(entries)
    }
}
