//! Raw SQL access to the `settings` key-value table.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::instrument;

/// Name of the backing table.
pub const SETTINGS_TABLE: &str = "settings";

/// Repository for settings rows.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the value stored for `key`.
    ///
    /// Fails when the table does not exist.
    #[instrument(skip(self))]
    pub async fn read(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read setting")?;

        Ok(row.and_then(|(value,)| value))
    }

    /// Insert or overwrite the value for `key`.
    #[instrument(skip(self, value))]
    pub async fn replace(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .context("Failed to write setting")?;

        Ok(())
    }

    /// Create the table if it is missing. Idempotent.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, value TEXT)")
            .execute(&self.pool)
            .await
            .context("Failed to create settings table")?;

        Ok(())
    }

    /// Check the catalog for the table.
    #[instrument(skip(self))]
    pub async fn table_exists(&self) -> Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(SETTINGS_TABLE)
                .fetch_one(&self.pool)
                .await
                .context("Failed to inspect database schema")?;

        Ok(count.0 > 0)
    }
}
