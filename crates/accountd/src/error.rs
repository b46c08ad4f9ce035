//! Domain error taxonomy shared by the user and settings services.

use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by the account and settings services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// A supplied credential did not match.
    #[error("{0}")]
    Authorization(String),

    /// The referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Underlying persistence fault.
    #[error("{message}")]
    Storage {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// Creating a lazily provisioned table failed.
    #[error("failed to create {table} table")]
    Schema {
        table: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Storage {
            message: msg.into(),
            source,
        }
    }
}
