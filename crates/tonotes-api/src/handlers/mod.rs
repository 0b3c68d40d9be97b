//! API Handlers
//!
//! Request handlers for all API endpoints.

pub mod auth;
pub mod health;
pub mod session;
pub mod two_factor;
pub mod user;

use axum::http::{HeaderName, HeaderValue};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tonotes_auth::middleware::{SESSION_COOKIE, SESSION_HEADER};
use uuid::Uuid;

/// Set the session cookie
pub(crate) fn with_session_cookie(jar: CookieJar, session_id: Uuid) -> CookieJar {
    jar.add(
        Cookie::build((SESSION_COOKIE, session_id.to_string()))
            .http_only(true)
            .secure(true)
            .path("/")
            .same_site(SameSite::Lax),
    )
}

/// Expire the session cookie
pub(crate) fn without_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// `X-Session-ID` header mirroring the cookie
pub(crate) fn session_header(session_id: Uuid) -> [(HeaderName, HeaderValue); 1] {
    let value = HeaderValue::from_str(&session_id.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static(""));
    [(HeaderName::from_static(SESSION_HEADER), value)]
}
