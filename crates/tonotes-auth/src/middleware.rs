//! Authentication Middleware for Axum
//!
//! Protected routes carry two credentials:
//! - `Authorization: Bearer <access token>`
//! - the session id, in the `X-Session-ID` header or the `session_id` cookie
//!
//! The middleware resolves both through [`AuthService::authenticate`] and
//! stores the resulting [`AuthContext`] in the request extensions. Handlers
//! read it with the [`RequireAuth`] extractor.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::Response,
};
use headers::{authorization::Bearer, Authorization, HeaderMapExt};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::error::{AuthError, ErrorResponse};
use crate::service::AuthService;
use crate::types::AuthContext;

/// Header mirroring the session cookie
pub const SESSION_HEADER: &str = "x-session-id";

/// Cookie holding the session id
pub const SESSION_COOKIE: &str = "session_id";

/// Authentication middleware layer
#[derive(Clone)]
pub struct AuthLayer {
    auth: Arc<AuthService>,
}

impl AuthLayer {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            auth: self.auth.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    auth: Arc<AuthService>,
}

impl<S> Service<Request> for AuthMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let auth = self.auth.clone();
        // Swap in the clone so the ready service handles this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match authenticate_request(req.headers(), &auth).await {
                Ok(ctx) => {
                    let (mut parts, body) = req.into_parts();
                    parts.extensions.insert(ctx);
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(e) => {
                    if e.is_server_error() {
                        tracing::error!(error = %e, "Authentication failed");
                    } else {
                        tracing::debug!(error = %e, "Request rejected");
                    }
                    Ok(auth_error_response(e))
                }
            }
        })
    }
}

async fn authenticate_request(headers: &HeaderMap, auth: &AuthService) -> Result<AuthContext, AuthError> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AuthError::MissingToken)?;

    let session_id = match extract_session_id(headers) {
        Some(raw) => Some(Uuid::parse_str(raw.trim()).map_err(|_| AuthError::SessionNotFound)?),
        None => None,
    };

    auth.authenticate(bearer.token(), session_id).await
}

/// Session id from the `X-Session-ID` header, falling back to the cookie
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// JSON error body with the status of the error's kind
pub fn auth_error_response(error: AuthError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse::from(&error);

    let mut res = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(retry_after) = error.retry_after_secs() {
        res = res.header(header::RETRY_AFTER, retry_after.to_string());
    }
    if status == StatusCode::UNAUTHORIZED {
        res = res.header(header::WWW_AUTHENTICATE, "Bearer");
    }

    res.body(Body::from(serde_json::to_string(&body).unwrap_or_default()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

// =============================================================================
// Axum Extractors
// =============================================================================

/// Extractor for the authenticated caller
///
/// Rejects with 401 when the route is not behind [`AuthLayer`].
pub struct RequireAuth(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(RequireAuth)
            .ok_or_else(|| auth_error_response(AuthError::MissingToken))
    }
}
