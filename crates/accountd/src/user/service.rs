//! User service for business logic.

use tracing::{info, instrument, warn};

use crate::error::{ServiceError, ServiceResult};

use super::models::{LoginInfo, User, UserInfo, UserListQuery, UserListing};
use super::password::{MIN_PASSWORD_LEN, hash_password, verify_password};
use super::repository::UserRepository;

const USER_NOT_FOUND: &str = "User not found";

/// Service for user account operations.
#[derive(Debug, Clone)]
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    /// Create a new user service.
    pub fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    /// Create a user from a plaintext password.
    #[instrument(skip(self, password))]
    pub async fn create_user(&self, username: &str, password: &str) -> ServiceResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::validation("Username must not be empty"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let existing = self
            .repo
            .get_by_username(username)
            .await
            .map_err(|e| ServiceError::storage("Failed to look up user", e))?;
        if existing.is_some() {
            return Err(ServiceError::validation(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let hash = hash_password(password)
            .map_err(|e| ServiceError::storage("Failed to hash password", e))?;
        let user = self
            .repo
            .create(username, &hash)
            .await
            .map_err(|e| ServiceError::storage("Failed to create user", e))?;

        info!(user_id = user.id, username = %user.username, "Created new user");
        Ok(user)
    }

    /// Get the public identity fields of a user.
    #[instrument(skip(self))]
    pub async fn get_profile(&self, id: i64) -> ServiceResult<UserInfo> {
        self.repo
            .get_info(id)
            .await
            .map_err(|e| ServiceError::storage("Failed to load user profile", e))?
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))
    }

    /// Get the last login time and address of a user.
    #[instrument(skip(self))]
    pub async fn get_login_info(&self, id: i64) -> ServiceResult<LoginInfo> {
        self.repo
            .get_login_info(id)
            .await
            .map_err(|e| ServiceError::storage("Failed to load login info", e))?
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))
    }

    /// List users, paginated when the query asks for it.
    ///
    /// The total is read separately from the page slice so it stays correct
    /// for empty or out-of-range pages.
    #[instrument(skip(self))]
    pub async fn list_users(&self, query: UserListQuery) -> ServiceResult<UserListing> {
        let Some(pagination) = query.pagination() else {
            let data = self
                .repo
                .list_all()
                .await
                .map_err(|e| ServiceError::storage("Failed to list users", e))?;
            return Ok(UserListing::All { data });
        };

        let total = self
            .repo
            .count()
            .await
            .map_err(|e| ServiceError::storage("Failed to count users", e))?;
        let data = self
            .repo
            .list_page(pagination.page_size, pagination.offset())
            .await
            .map_err(|e| ServiceError::storage("Failed to list users", e))?;

        Ok(UserListing::Page {
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            data,
        })
    }

    /// Change a user's password after verifying the current one.
    ///
    /// Nothing is written unless `old_password` verifies against the stored
    /// hash.
    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        id: i64,
        old_password: Option<&str>,
        new_password: Option<&str>,
    ) -> ServiceResult<()> {
        let (Some(old_password), Some(new_password)) = (
            old_password.filter(|p| !p.is_empty()),
            new_password.filter(|p| !p.is_empty()),
        ) else {
            return Err(ServiceError::validation(
                "Both old and new passwords are required",
            ));
        };

        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::validation(format!(
                "New password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let current_hash = self
            .repo
            .get_password_hash(id)
            .await
            .map_err(|e| ServiceError::storage("Failed to load user", e))?
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))?;

        if !verify_password(&current_hash, old_password) {
            warn!(user_id = id, "Password change rejected: old password mismatch");
            return Err(ServiceError::authorization("Old password is incorrect"));
        }

        let new_hash = hash_password(new_password)
            .map_err(|e| ServiceError::storage("Failed to update password", e))?;
        let updated = self
            .repo
            .update_password_hash(id, &new_hash)
            .await
            .map_err(|e| ServiceError::storage("Failed to update password", e))?;
        if !updated {
            return Err(ServiceError::not_found(USER_NOT_FOUND));
        }

        info!(user_id = id, "Password changed");
        Ok(())
    }

    /// Verify login credentials and record the login.
    ///
    /// Unknown usernames and wrong passwords are both reported as an
    /// authorization failure.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client_ip: Option<&str>,
    ) -> ServiceResult<User> {
        let user = self
            .repo
            .get_by_username(username)
            .await
            .map_err(|e| ServiceError::storage("Failed to look up user", e))?;

        let Some(user) = user.filter(|u| verify_password(&u.password_hash, password)) else {
            return Err(ServiceError::authorization("Invalid username or password"));
        };

        self.repo
            .update_last_login(user.id, client_ip)
            .await
            .map_err(|e| ServiceError::storage("Failed to record login", e))?;

        info!(user_id = user.id, "User logged in");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup_service() -> (UserService, UserRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool().clone());
        (UserService::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn test_change_password_success() {
        let (service, repo) = setup_service().await;
        let user = service.create_user("alice", "oldpass1").await.unwrap();

        service
            .change_password(user.id, Some("oldpass1"), Some("newpass1"))
            .await
            .unwrap();

        let hash = repo.get_password_hash(user.id).await.unwrap().unwrap();
        assert!(verify_password(&hash, "newpass1"));
        assert!(!verify_password(&hash, "oldpass1"));
    }

    #[tokio::test]
    async fn test_change_password_wrong_old_leaves_hash_untouched() {
        let (service, repo) = setup_service().await;
        let user = service.create_user("bob", "correct1").await.unwrap();
        let before = repo.get_password_hash(user.id).await.unwrap().unwrap();

        let err = service
            .change_password(user.id, Some("wrongpw"), Some("abcdef"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        let after = repo.get_password_hash(user.id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_change_password_validation() {
        let (service, repo) = setup_service().await;
        let user = service.create_user("carol", "secret1").await.unwrap();
        let before = repo.get_password_hash(user.id).await.unwrap().unwrap();

        let cases = [
            (None, Some("abcdef")),
            (Some("secret1"), None),
            (Some(""), Some("abcdef")),
            (Some("secret1"), Some("")),
            (Some("secret1"), Some("abcde")),
        ];

        for (old, new) in cases {
            let err = service
                .change_password(user.id, old, new)
                .await
                .unwrap_err();
            assert!(
                matches!(err, ServiceError::Validation(_)),
                "{old:?}/{new:?} should fail validation"
            );
        }

        let after = repo.get_password_hash(user.id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_change_password_unknown_user() {
        let (service, _repo) = setup_service().await;

        let err = service
            .change_password(42, Some("whatever"), Some("abcdef"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_users_unpaginated() {
        let (service, _repo) = setup_service().await;
        for name in ["u1", "u2", "u3"] {
            service.create_user(name, "password").await.unwrap();
        }

        let listing = service.list_users(UserListQuery::default()).await.unwrap();
        assert!(matches!(listing, UserListing::All { .. }));
        assert_eq!(listing.items().len(), 3);

        let json = serde_json::to_value(&listing).unwrap();
        for item in json["data"].as_array().unwrap() {
            let keys: Vec<_> = item.as_object().unwrap().keys().cloned().collect();
            assert_eq!(keys.len(), 2);
            assert!(item.get("id").is_some());
            assert!(item.get("username").is_some());
        }
    }

    #[tokio::test]
    async fn test_list_users_second_page() {
        let (service, _repo) = setup_service().await;
        for name in ["u1", "u2", "u3"] {
            service.create_user(name, "password").await.unwrap();
        }

        let listing = service
            .list_users(UserListQuery::paged(2, 1))
            .await
            .unwrap();

        let UserListing::Page {
            total,
            page,
            page_size,
            data,
        } = listing
        else {
            panic!("expected a paginated listing");
        };
        assert_eq!(total, 3);
        assert_eq!(page, 2);
        assert_eq!(page_size, 1);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].username, "u2");
    }

    #[tokio::test]
    async fn test_list_users_past_the_end() {
        let (service, _repo) = setup_service().await;
        for name in ["u1", "u2"] {
            service.create_user(name, "password").await.unwrap();
        }

        let listing = service
            .list_users(UserListQuery::paged(5, 10))
            .await
            .unwrap();
        let UserListing::Page { total, data, .. } = listing else {
            panic!("expected a paginated listing");
        };
        assert_eq!(total, 2);
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_profile_and_login_info() {
        let (service, _repo) = setup_service().await;
        let user = service.create_user("dave", "password").await.unwrap();

        let profile = service.get_profile(user.id).await.unwrap();
        assert_eq!(profile.username, "dave");

        let info = service.get_login_info(user.id).await.unwrap();
        assert!(info.last_login_time.is_none());

        service
            .login("dave", "password", Some("192.168.1.9"))
            .await
            .unwrap();
        let info = service.get_login_info(user.id).await.unwrap();
        assert!(info.last_login_time.is_some());
        assert_eq!(info.last_login_ip.as_deref(), Some("192.168.1.9"));

        assert!(matches!(
            service.get_profile(999).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            service.get_login_info(999).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let (service, _repo) = setup_service().await;
        service.create_user("erin", "password").await.unwrap();

        assert!(matches!(
            service.login("erin", "nope", None).await.unwrap_err(),
            ServiceError::Authorization(_)
        ));
        assert!(matches!(
            service.login("nobody", "password", None).await.unwrap_err(),
            ServiceError::Authorization(_)
        ));
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let (service, _repo) = setup_service().await;

        assert!(matches!(
            service.create_user("  ", "password").await.unwrap_err(),
            ServiceError::Validation(_)
        ));
        assert!(matches!(
            service.create_user("frank", "short").await.unwrap_err(),
            ServiceError::Validation(_)
        ));

        service.create_user("frank", "password").await.unwrap();
        assert!(matches!(
            service.create_user("frank", "password").await.unwrap_err(),
            ServiceError::Validation(_)
        ));
    }
}
