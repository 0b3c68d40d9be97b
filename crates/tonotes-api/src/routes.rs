//! API Routes
//!
//! Route definitions for all API endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tonotes_auth::AuthLayer;

use crate::handlers;
use crate::state::AppState;

/// Create API v1 routes
pub fn api_v1_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(public_routes())
        .merge(protected_routes().route_layer(AuthLayer::new(state.auth.clone())))
}

/// Routes reachable without an access token
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // Bearer is the refresh token here, not an access token
        .route("/auth/token/refresh", post(handlers::auth::refresh_token))
        .route("/2fa/recovery", post(handlers::two_factor::recovery))
}

/// Routes behind the bearer + session check
fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .nest("/session", session_routes())
        .nest("/2fa", two_factor_routes())
        .nest("/user", user_routes())
}

/// Session routes
fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::session::list_sessions))
        .route("/logout-all", post(handlers::session::logout_all))
        .route(
            "/:id",
            get(handlers::session::get_session).delete(handlers::session::delete_session),
        )
}

/// 2FA routes
fn two_factor_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/setup", get(handlers::two_factor::setup))
        .route("/enable", post(handlers::two_factor::enable))
        .route("/verify", post(handlers::two_factor::verify))
        .route("/disable", post(handlers::two_factor::disable))
}

/// Account routes
fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::user::profile).delete(handlers::user::delete_account),
        )
        .route("/password", put(handlers::user::change_password))
        .route("/email", put(handlers::user::change_email))
}
