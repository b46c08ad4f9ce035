//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Minimum accepted JWT secret length outside dev mode.
const MIN_JWT_SECRET_LEN: usize = 32;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable development mode (accepts the `X-Dev-User` header).
    pub dev_mode: bool,

    /// JWT secret for HS256. Supports `env:VAR_NAME` indirection.
    /// REQUIRED when dev_mode is false.
    pub jwt_secret: Option<String>,

    /// Allowed CORS origins. If empty in production, CORS is disabled.
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            // No default JWT secret - must be explicitly configured
            jwt_secret: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    /// Returns the resolved secret or None if not configured.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration for the current mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.dev_mode {
            return Ok(());
        }

        match self.resolve_jwt_secret()? {
            None => Err(ConfigValidationError::MissingJwtSecret),
            Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                Err(ConfigValidationError::JwtSecretTooShort)
            }
            Some(_) => Ok(()),
        }
    }

    /// Generate a random JWT secret from the OS-backed thread RNG.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const SECRET_LENGTH: usize = 64;

        let mut rng = rand::rng();
        (0..SECRET_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// JWT secret is required in production mode.
    MissingJwtSecret,
    /// JWT secret is too short.
    JwtSecretTooShort,
    /// Environment variable not found (for `env:VAR_NAME` syntax).
    EnvVarNotFound(String),
    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    EnvVarEmpty(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingJwtSecret => {
                write!(
                    f,
                    "JWT secret is required when dev_mode is false. Set ACCOUNTD__AUTH__JWT_SECRET or jwt_secret in config."
                )
            }
            Self::JwtSecretTooShort => {
                write!(
                    f,
                    "JWT secret must be at least {} characters long.",
                    MIN_JWT_SECRET_LEN
                )
            }
            Self::EnvVarNotFound(var) => {
                write!(
                    f,
                    "Environment variable '{}' not found (referenced via env:{} in config).",
                    var, var
                )
            }
            Self::EnvVarEmpty(var) => {
                write!(
                    f,
                    "Environment variable '{}' is empty (referenced via env:{} in config).",
                    var, var
                )
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(!config.dev_mode);
        assert!(config.jwt_secret.is_none());
        assert!(!config.allowed_origins.is_empty());
    }

    #[test]
    fn test_validate_requires_secret_in_production() {
        let config = AuthConfig::default();
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::MissingJwtSecret)
        );

        let short = AuthConfig {
            jwt_secret: Some("too-short".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(
            short.validate(),
            Err(ConfigValidationError::JwtSecretTooShort)
        );

        let ok = AuthConfig {
            jwt_secret: Some(AuthConfig::generate_jwt_secret()),
            ..AuthConfig::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_validate_dev_mode_without_secret() {
        let config = AuthConfig {
            dev_mode: true,
            ..AuthConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_missing_env_var() {
        let config = AuthConfig {
            jwt_secret: Some("env:ACCOUNTD_TEST_SECRET_THAT_IS_NEVER_SET".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(
            config.resolve_jwt_secret(),
            Err(ConfigValidationError::EnvVarNotFound(
                "ACCOUNTD_TEST_SECRET_THAT_IS_NEVER_SET".to_string()
            ))
        );
    }

    #[test]
    fn test_generate_jwt_secret() {
        let a = AuthConfig::generate_jwt_secret();
        let b = AuthConfig::generate_jwt_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
