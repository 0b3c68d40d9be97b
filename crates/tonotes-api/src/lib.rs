//! toNotes REST API
//!
//! HTTP surface of the authentication core.
//!
//! # API Structure
//!
//! ```text
//! /api/v1/
//! ├── /auth          - register, login, token refresh, logout
//! ├── /session       - list, inspect and end sessions
//! ├── /2fa           - TOTP enrollment and recovery login
//! └── /user          - profile, password, email, deletion
//! /health, /ready    - liveness and store readiness
//! ```
//!
//! Protected routes need `Authorization: Bearer <access token>` plus the
//! session id, taken from the `X-Session-ID` header or the `session_id` cookie.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tonotes_auth::middleware::SESSION_HEADER;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable CORS for browser clients
    pub enable_cors: bool,
    /// Allowed origins; `*` allows any origin but then cookies are not sent cross-site
    pub cors_origins: Vec<String>,
    /// Gzip responses
    pub enable_compression: bool,
    /// One tracing span per request
    pub enable_tracing: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            enable_compression: true,
            enable_tracing: true,
        }
    }
}

/// Router with every route and the configured layers
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    with_layers(create_test_router(state), &config)
}

/// Routes only, without the outer layers
pub fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_v1_routes(&state))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state)
}

/// Outermost first: request id, trace, compression, CORS
fn with_layers(mut router: Router, config: &ApiConfig) -> Router {
    if config.enable_cors {
        router = router.layer(cors_layer(&config.cors_origins));
    }

    if config.enable_compression {
        router = router.layer(CompressionLayer::new());
    }

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            },
        ));
    }

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// CORS for browser clients
///
/// The session cookie only travels with credentialed requests, and browsers
/// refuse credentials together with wildcard origins or headers, so a
/// concrete origin list gets an explicit header list as well.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let session_header = HeaderName::from_static(SESSION_HEADER);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            session_header.clone(),
            HeaderName::from_static(handlers::auth::REFRESH_TOKEN_HEADER),
        ])
        .expose_headers([session_header, HeaderName::from_static(REQUEST_ID_HEADER)])
        .allow_credentials(true)
}
