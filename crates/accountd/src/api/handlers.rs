//! API request handlers.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE, request::Parts},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::{AUTH_COOKIE, CurrentUser, TOKEN_TTL_SECS};
use crate::error::ServiceError;
use crate::user::{ChangePasswordRequest, LoginInfo, UserInfo, UserListQuery, UserListing};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Plain message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Single-item envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

// ============================================================================
// Client address
// ============================================================================

/// Best-effort client address: proxy headers first, then the socket peer.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    ["x-forwarded-for", "x-real-ip"].iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = forwarded_client_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        Ok(ClientIp(ip))
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

/// Login endpoint. Records the login time and client address.
#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let user = state
        .users
        .login(&request.username, &request.password, client_ip.as_deref())
        .await
        .map_err(|e| match e {
            ServiceError::Authorization(msg) => ApiError::Unauthorized(msg),
            other => other.into(),
        })?;

    let token = state.auth.generate_token(user.id, &user.username)?;

    let secure_flag = if state.auth.is_dev_mode() {
        ""
    } else {
        " Secure;"
    };
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax;{} Max-Age={}",
        AUTH_COOKIE, token, secure_flag, TOKEN_TTL_SECS
    );

    info!(user_id = user.id, "User logged in successfully");

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Logout endpoint (clears auth cookie).
pub async fn logout() -> impl IntoResponse {
    let cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", AUTH_COOKIE);

    (AppendHeaders([(SET_COOKIE, cookie)]), StatusCode::NO_CONTENT)
}

// ============================================================================
// Site settings
// ============================================================================

/// Background image configuration (request and response share a shape).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    #[serde(default)]
    pub background_image: Option<String>,
}

/// Get the site background image. Public.
#[instrument(skip(state))]
pub async fn get_background(State(state): State<AppState>) -> ApiResult<Json<BackgroundConfig>> {
    let url = state.settings.background_image().await?;
    Ok(Json(BackgroundConfig {
        background_image: Some(url),
    }))
}

/// Save the site background image.
#[instrument(skip(state, user, body), fields(user_id = user.id()))]
pub async fn set_background(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<Json<BackgroundConfig>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = body?;
    let url = request.background_image.unwrap_or_default();
    state.settings.set_background_image(&url).await?;

    info!("Background image updated");
    Ok(MessageResponse::new("Background image saved"))
}

// ============================================================================
// Users
// ============================================================================

/// Get the current user's identity.
#[instrument(skip(state, user), fields(user_id = user.id()))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<DataResponse<UserInfo>>> {
    let data = state.users.get_profile(user.id()).await?;
    Ok(Json(DataResponse { data }))
}

/// Get the current user's last login details.
#[instrument(skip(state, user), fields(user_id = user.id()))]
pub async fn get_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<LoginInfo>> {
    let info = state.users.get_login_info(user.id()).await?;
    Ok(Json(info))
}

/// Change the current user's password.
#[instrument(skip(state, user, body), fields(user_id = user.id()))]
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = body?;
    state
        .users
        .change_password(
            user.id(),
            request.old_password.as_deref(),
            request.new_password.as_deref(),
        )
        .await?;

    Ok(MessageResponse::new("Password changed successfully"))
}

/// List users, paginated when `page` or `pageSize` is given.
#[instrument(skip(state, _user))]
pub async fn list_users(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<UserListing>> {
    let listing = state.users.list_users(query).await?;
    Ok(Json(listing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_client_ip_prefers_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(forwarded_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_forwarded_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(
            forwarded_client_ip(&headers).as_deref(),
            Some("198.51.100.4")
        );

        assert_eq!(forwarded_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_background_config_wire_format() {
        let body = serde_json::to_value(BackgroundConfig {
            background_image: Some("http://x/bg.png".to_string()),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "backgroundImage": "http://x/bg.png" }));

        let parsed: BackgroundConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.background_image.is_none());
    }
}
