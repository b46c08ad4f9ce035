//! HTTP API module.
//!
//! Provides the account, settings and login endpoints.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::{AppState, DEFAULT_REQUEST_TIMEOUT};
