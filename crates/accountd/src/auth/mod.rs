//! Authentication module.
//!
//! Provides JWT validation middleware with support for:
//! - HS256 tokens issued by the login endpoint (header or cookie)
//! - Dev bypass mode via the `X-Dev-User` header

mod claims;
mod config;
mod error;
mod middleware;

pub use claims::Claims;
pub use config::{AuthConfig, ConfigValidationError};
pub use error::AuthError;
pub use middleware::{AUTH_COOKIE, AuthState, CurrentUser, TOKEN_TTL_SECS, auth_middleware};
