//! Authentication middleware.

use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::{debug, warn};
use std::sync::Arc;

use super::{AuthConfig, AuthError, Claims};

/// Name of the cookie carrying the session token.
pub const AUTH_COOKIE: &str = "auth_token";

/// Lifetime of issued tokens.
pub const TOKEN_TTL_SECS: i64 = 60 * 60 * 24;

const TOKEN_ISSUER: &str = "accountd";

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }

    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim()).filter(|v| !v.is_empty())
        } else {
            None
        }
    })
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    encoding_key: Option<EncodingKey>,
    decoding_key: Option<DecodingKey>,
}

impl AuthState {
    /// Create new auth state from config.
    /// Resolves `env:VAR_NAME` syntax in jwt_secret at construction time.
    pub fn new(mut config: AuthConfig) -> Self {
        if let Ok(Some(resolved)) = config.resolve_jwt_secret() {
            config.jwt_secret = Some(resolved);
        }

        let encoding_key = config
            .jwt_secret
            .as_ref()
            .map(|s| EncodingKey::from_secret(s.as_bytes()));
        let decoding_key = config
            .jwt_secret
            .as_ref()
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        Self {
            config: Arc::new(config),
            encoding_key,
            decoding_key,
        }
    }

    /// Check if dev mode is enabled.
    pub fn is_dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    /// Get allowed CORS origins from config.
    pub fn allowed_origins(&self) -> &[String] {
        &self.config.allowed_origins
    }

    /// Validate a JWT token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if self.config.dev_mode {
            if let Some(user_id) = token.strip_prefix("dev:") {
                return Ok(dev_claims(user_id));
            }
        }

        let decoding_key = self
            .decoding_key
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_string());

        let token_data = decode::<Claims>(token, decoding_key, &validation).map_err(|e| {
            warn!("JWT validation failed: {:?}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Generate a JWT token for a user.
    pub fn generate_token(&self, user_id: i64, username: &str) -> Result<String, AuthError> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: Some(TOKEN_ISSUER.to_string()),
            exp: now + TOKEN_TTL_SECS,
            iat: Some(now),
            preferred_username: Some(username.to_string()),
        };

        encode(&Header::default(), &claims, encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

fn dev_claims(user_id: &str) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub: user_id.to_string(),
        iss: Some("dev".to_string()),
        exp: now + TOKEN_TTL_SECS,
        iat: Some(now),
        preferred_username: None,
    }
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    user_id: i64,
    /// User claims.
    pub claims: Claims,
}

impl CurrentUser {
    /// Build from validated claims. The subject must be a numeric user ID.
    pub fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let user_id = claims
            .user_id()
            .ok_or_else(|| AuthError::InvalidToken("subject is not a user id".to_string()))?;
        Ok(Self { user_id, claims })
    }

    /// Get the user ID.
    pub fn id(&self) -> i64 {
        self.user_id
    }

    /// Get display name.
    pub fn display_name(&self) -> &str {
        self.claims.display_name()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Authentication middleware.
///
/// Validates JWT tokens and injects `CurrentUser` into request extensions.
/// Auth methods in priority order:
/// 1. Authorization: Bearer <token> header
/// 2. auth_token cookie
/// 3. X-Dev-User header (dev mode only)
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let cookie_token = req
        .headers()
        .get(axum::http::header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookie_header| token_from_cookie_header(cookie_header, AUTH_COOKIE));

    let claims = if let Some(header) = auth_header {
        let token = bearer_token_from_header(header)?;
        auth.validate_token(token)?
    } else if let Some(token) = cookie_token {
        auth.validate_token(token)?
    } else if auth.is_dev_mode() {
        if let Some(user_id) = req
            .headers()
            .get("X-Dev-User")
            .and_then(|h| h.to_str().ok())
        {
            debug!("Using dev user: {}", user_id);
            auth.validate_token(&format!("dev:{}", user_id))?
        } else {
            return Err(AuthError::MissingAuthHeader);
        }
    } else {
        return Err(AuthError::MissingAuthHeader);
    };

    let user = CurrentUser::from_claims(claims)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
