//! Test utilities and common setup.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

use accountd::api;
use accountd::auth::{AuthConfig, AuthState};
use accountd::db::Database;
use accountd::user::{UserRepository, UserService};

pub const TEST_PASSWORD: &str = "secret123";

/// Create a test AuthConfig with a JWT secret for testing.
fn test_auth_config(dev_mode: bool) -> AuthConfig {
    AuthConfig {
        dev_mode,
        jwt_secret: Some("test-secret-for-integration-tests-minimum-32-chars".to_string()),
        ..AuthConfig::default()
    }
}

/// A fully wired application backed by an in-memory database.
pub struct TestApp {
    pub router: Router,
    pub auth: AuthState,
    pub users: UserService,
    pub pool: SqlitePool,
}

impl TestApp {
    /// Create a user directly through the service and return its id.
    pub async fn seed_user(&self, username: &str) -> i64 {
        self.users
            .create_user(username, TEST_PASSWORD)
            .await
            .unwrap()
            .id
    }

    /// Issue a valid bearer token for `user_id`.
    pub fn token_for(&self, user_id: i64, username: &str) -> String {
        self.auth.generate_token(user_id, username).unwrap()
    }

    /// Stored password hash for `user_id`.
    pub async fn password_hash(&self, user_id: i64) -> String {
        let row: (String,) = sqlx::query_as("SELECT password_hash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .unwrap();
        row.0
    }

    /// Send a request and return the status plus the parsed JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri).method(method);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send_request(request).await
    }

    /// Send a prepared request. Bodies that are not JSON come back as a string value.
    pub async fn send_request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }
}

async fn build(dev_mode: bool) -> TestApp {
    let db = Database::in_memory().await.unwrap();
    let auth = AuthState::new(test_auth_config(dev_mode));

    let state = api::AppState::from_database(&db, auth.clone());
    let router = api::create_router(state);

    TestApp {
        router,
        auth,
        users: UserService::new(UserRepository::new(db.pool().clone())),
        pool: db.pool().clone(),
    }
}

/// Create a test application in production auth mode.
pub async fn test_app() -> TestApp {
    build(false).await
}

/// Create a test application with dev mode enabled.
pub async fn test_app_dev_mode() -> TestApp {
    build(true).await
}
