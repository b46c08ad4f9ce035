//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthState;
use crate::db::Database;
use crate::settings::{SettingsRepository, SettingsService};
use crate::user::{UserRepository, UserService};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// User service for profiles, credentials and listings.
    pub users: Arc<UserService>,
    /// Site settings store.
    pub settings: Arc<SettingsService>,
    /// Authentication state.
    pub auth: AuthState,
    /// Upper bound on the time spent serving a single request.
    pub request_timeout: Duration,
}

impl AppState {
    /// Create new application state.
    pub fn new(users: UserService, settings: SettingsService, auth: AuthState) -> Self {
        Self {
            users: Arc::new(users),
            settings: Arc::new(settings),
            auth,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Build the services on top of an open database.
    pub fn from_database(db: &Database, auth: AuthState) -> Self {
        let pool = db.pool().clone();
        Self::new(
            UserService::new(UserRepository::new(pool.clone())),
            SettingsService::new(SettingsRepository::new(pool)),
            auth,
        )
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
