//! Site settings store with lazy table creation.

use tracing::{debug, info, instrument, warn};

use crate::error::{ServiceError, ServiceResult};

use super::repository::{SETTINGS_TABLE, SettingsRepository};

/// Key under which the site background image URL is stored.
pub const BACKGROUND_IMAGE_KEY: &str = "backgroundImage";

/// Key-value store for application-wide settings.
///
/// The backing table is not part of the migrations. The first write that
/// fails creates it and retries once; reads treat a missing table as an
/// empty store.
#[derive(Debug, Clone)]
pub struct SettingsService {
    repo: SettingsRepository,
}

impl SettingsService {
    pub fn new(repo: SettingsRepository) -> Self {
        Self { repo }
    }

    /// Get the value for `key`, or an empty string when unset.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> ServiceResult<String> {
        match self.repo.read(key).await {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(read_err) => {
                let exists = self
                    .repo
                    .table_exists()
                    .await
                    .map_err(|e| ServiceError::storage("Failed to read setting", e))?;
                if exists {
                    return Err(ServiceError::storage("Failed to read setting", read_err));
                }
                debug!(key, "Settings table absent, returning empty value");
                Ok(String::new())
            }
        }
    }

    /// Store `value` under `key`, replacing any previous value.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> ServiceResult<()> {
        if value.is_empty() {
            return Err(ServiceError::validation("Setting value must not be empty"));
        }

        let first_err = match self.repo.replace(key, value).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!(key, error = %first_err, "Setting write failed, ensuring schema before retry");

        self.repo
            .ensure_schema()
            .await
            .map_err(|source| ServiceError::Schema {
                table: SETTINGS_TABLE,
                source,
            })?;

        self.repo
            .replace(key, value)
            .await
            .map_err(|e| ServiceError::storage("Failed to save setting", e))?;

        info!(key, "Setting saved after creating settings table");
        Ok(())
    }

    /// Get the site background image URL.
    pub async fn background_image(&self) -> ServiceResult<String> {
        self.get(BACKGROUND_IMAGE_KEY).await
    }

    /// Set the site background image URL.
    pub async fn set_background_image(&self, url: &str) -> ServiceResult<()> {
        if url.is_empty() {
            return Err(ServiceError::validation(
                "Background image URL must not be empty",
            ));
        }
        self.set(BACKGROUND_IMAGE_KEY, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use sqlx::SqlitePool;

    async fn setup_store() -> (SettingsService, SettingsRepository, SqlitePool) {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool().clone();
        let repo = SettingsRepository::new(pool.clone());
        (SettingsService::new(repo.clone()), repo, pool)
    }

    #[tokio::test]
    async fn test_get_without_table_returns_empty() {
        let (store, repo, _pool) = setup_store().await;
        assert!(!repo.table_exists().await.unwrap());

        assert_eq!(store.get("anything").await.unwrap(), "");
        assert_eq!(store.background_image().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_get_unknown_key_with_table_returns_empty() {
        let (store, repo, _pool) = setup_store().await;
        repo.ensure_schema().await.unwrap();

        assert_eq!(store.get("missing").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_first_set_creates_table() {
        let (store, repo, _pool) = setup_store().await;

        store
            .set(BACKGROUND_IMAGE_KEY, "http://x/img.png")
            .await
            .unwrap();

        assert!(repo.table_exists().await.unwrap());
        assert_eq!(
            store.get(BACKGROUND_IMAGE_KEY).await.unwrap(),
            "http://x/img.png"
        );
    }

    #[tokio::test]
    async fn test_set_replaces_previous_value() {
        let (store, _repo, pool) = setup_store().await;

        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), "v2");

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings WHERE key = 'k'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows.0, 1);
    }

    #[tokio::test]
    async fn test_set_empty_value_is_rejected_without_write() {
        let (store, repo, _pool) = setup_store().await;

        let err = store.set("k", "").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = store.set_background_image("").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // No write attempt, so no lazy table creation either.
        assert!(!repo.table_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let (store, repo, _pool) = setup_store().await;

        store.set("k", "v").await.unwrap();
        repo.ensure_schema().await.unwrap();
        repo.ensure_schema().await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn test_closed_pool_reports_schema_failure() {
        let (store, _repo, pool) = setup_store().await;
        pool.close().await;

        let err = store.set("k", "v").await.unwrap_err();
        assert!(matches!(err, ServiceError::Schema { table: "settings", .. }));

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_failed_retry_reports_storage_error() {
        let (store, _repo, pool) = setup_store().await;
        // Table exists, so schema creation is a no-op and every write violates the check.
        sqlx::query("CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT CHECK (0))")
            .execute(&pool)
            .await
            .unwrap();

        let err = store.set("k", "v").await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage { .. }));

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows.0, 0);
    }

    #[tokio::test]
    async fn test_read_from_incompatible_table_reports_storage_error() {
        let (store, repo, pool) = setup_store().await;
        sqlx::query("CREATE TABLE settings (key TEXT PRIMARY KEY, other TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        assert!(repo.table_exists().await.unwrap());

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage { .. }));
    }
}
