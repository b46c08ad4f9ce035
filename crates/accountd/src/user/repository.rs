//! User repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::models::{LoginInfo, User, UserInfo};

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user with an already hashed password.
    #[instrument(skip(self, password_hash))]
    pub async fn create(&self, username: &str, password_hash: &str) -> Result<User> {
        debug!("Creating user: {}", username);

        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .context("Failed to insert user")?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after creation"))
    }

    /// Get a user by ID.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, last_login_time, last_login_ip, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        Ok(user)
    }

    /// Get a user by username.
    #[instrument(skip(self))]
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, last_login_time, last_login_ip, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        Ok(user)
    }

    /// Get the public identity fields of a user.
    #[instrument(skip(self))]
    pub async fn get_info(&self, id: i64) -> Result<Option<UserInfo>> {
        let info = sqlx::query_as::<_, UserInfo>("SELECT id, username FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user profile")?;

        Ok(info)
    }

    /// Get the last login details of a user.
    #[instrument(skip(self))]
    pub async fn get_login_info(&self, id: i64) -> Result<Option<LoginInfo>> {
        let info = sqlx::query_as::<_, LoginInfo>(
            "SELECT last_login_time, last_login_ip FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch login info")?;

        Ok(info)
    }

    /// Get the stored password hash of a user.
    #[instrument(skip(self))]
    pub async fn get_password_hash(&self, id: i64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT password_hash FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch password hash")?;

        Ok(row.map(|(hash,)| hash))
    }

    /// Replace the password hash of a user.
    ///
    /// Returns `false` when no row matched `id`.
    #[instrument(skip(self, password_hash))]
    pub async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update password hash")?;

        Ok(result.rows_affected() > 0)
    }

    /// List every user's identity fields in id order.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<UserInfo>> {
        let users = sqlx::query_as::<_, UserInfo>("SELECT id, username FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        Ok(users)
    }

    /// List one window of users in id order.
    #[instrument(skip(self))]
    pub async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<UserInfo>> {
        let users = sqlx::query_as::<_, UserInfo>(
            "SELECT id, username FROM users ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users page")?;

        Ok(users)
    }

    /// Count total users.
    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;

        Ok(count.0)
    }

    /// Record a successful login.
    #[instrument(skip(self))]
    pub async fn update_last_login(&self, id: i64, ip: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE users SET last_login_time = datetime('now'), last_login_ip = ? WHERE id = ?",
        )
        .bind(ip)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update last login")?;

        Ok(())
    }
}
