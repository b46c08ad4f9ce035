//! Unified API error handling with structured responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::AuthError;
use crate::error::ServiceError;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if let ApiError::Internal(msg) = &self {
            error!(error_code = code, message = %msg, "API error");
        } else {
            debug!(error_code = code, message = %message, "Client error");
        }

        (status, Json(ErrorResponse { message, code })).into_response()
    }
}

/// Wrong credentials are a client error here, not an authentication failure.
/// Handlers that need a 401 (login) map the authorization case themselves.
impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) | ServiceError::Authorization(msg) => {
                ApiError::BadRequest(msg)
            }
            ServiceError::NotFound(msg) => ApiError::NotFound(msg),
            ServiceError::Storage { message, source } => {
                error!(error = ?source, "{}", message);
                ApiError::Internal(message)
            }
            err @ ServiceError::Schema { .. } => {
                let message = err.to_string();
                error!(error = ?anyhow::Error::from(err), "Schema creation failed");
                ApiError::Internal(message)
            }
        }
    }
}

/// Malformed request bodies (bad JSON, wrong types, missing content type)
/// are validation failures.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = ?err, "Unhandled error");
        ApiError::Internal(err.to_string())
    }
}

/// Convert auth errors to API errors.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => {
                ApiError::Unauthorized("Missing or invalid authorization".to_string())
            }
            AuthError::InvalidToken(msg) => {
                ApiError::Unauthorized(format!("Invalid token: {}", msg))
            }
            AuthError::TokenExpired => ApiError::Unauthorized("Token has expired".to_string()),
            AuthError::Internal(msg) => {
                ApiError::Internal(format!("Authentication error: {}", msg))
            }
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
