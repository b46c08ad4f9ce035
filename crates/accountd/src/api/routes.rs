//! API route definitions.

use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};

use crate::auth::auth_middleware;

use super::handlers;
use super::state::AppState;

/// Origins always accepted in dev mode.
const DEV_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.request_timeout);

    let auth_state = state.auth.clone();

    // Protected user routes (require authentication)
    let protected_users = Router::new()
        .route("/", get(handlers::list_users))
        .route("/config/background", post(handlers::set_background))
        .route("/profile", get(handlers::get_profile))
        .route("/me", get(handlers::get_me))
        .route("/password", put(handlers::change_password))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    // The background image is read by the public landing page.
    let public_users = Router::new().route("/config/background", get(handlers::get_background));

    let auth_routes = Router::new()
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/users", public_users.merge(protected_users))
        .nest("/api/auth", auth_routes)
        .with_state(state)
        .layer(timeout)
        .layer(cors)
        .layer(trace_layer)
}

/// Build the CORS layer based on configuration.
///
/// In dev mode the localhost origins are always allowed in addition to the
/// configured ones. Outside dev mode only configured origins are allowed.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let allowed_origins = state.auth.allowed_origins();
    let dev_mode = state.auth.is_dev_mode();

    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];

    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::COOKIE,
        header::HeaderName::from_static("x-dev-user"),
    ];

    let mut origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if dev_mode {
        for origin in DEV_ORIGINS {
            let value = HeaderValue::from_static(origin);
            if !origins.contains(&value) {
                origins.push(value);
            }
        }
    }

    if origins.is_empty() {
        warn!("CORS: No valid origins configured, denying all cross-origin requests");
        return CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")));
    }

    info!("CORS: Allowing {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}
