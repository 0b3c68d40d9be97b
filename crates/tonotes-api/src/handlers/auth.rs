//! Authentication Handlers
//!
//! Register, login, token refresh and logout.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use headers::{authorization::Bearer, Authorization, HeaderMapExt};
use std::sync::Arc;
use tonotes_auth::{AuthError, LoginOutcome, RequireAuth};

use super::{session_header, with_session_cookie, without_session_cookie};
use crate::dto::{
    LoginRequest, LoginResponse, MessageResponse, RefreshResponse, RegisterRequest,
    RegisterResponse, TwoFactorChallenge,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ClientMeta, ValidatedJson};
use crate::state::AppState;

/// Header carrying the refresh token on logout
pub const REFRESH_TOKEN_HEADER: &str = "refresh-token";

/// User registration
///
/// Opens the first session so the returned tokens work immediately.
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ClientMeta(meta): ClientMeta,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> ApiResult<Response> {
    validate_username(&request.username)?;

    let success = state
        .auth
        .register(&request.username, &request.email, &request.password, &meta)
        .await?;

    Ok((
        StatusCode::CREATED,
        with_session_cookie(jar, success.session.id),
        session_header(success.session.id),
        Json(RegisterResponse::from(&success)),
    )
        .into_response())
}

/// User login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ClientMeta(meta): ClientMeta,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> ApiResult<Response> {
    let outcome = state
        .auth
        .login(
            &request.username,
            &request.password,
            request.totp_code.as_deref(),
            &meta,
        )
        .await?;

    match outcome {
        LoginOutcome::Authenticated(success) => Ok((
            with_session_cookie(jar, success.session.id),
            session_header(success.session.id),
            Json(LoginResponse::from(&success)),
        )
            .into_response()),
        LoginOutcome::TwoFactorRequired { user_id } => Ok(Json(TwoFactorChallenge {
            requires_2fa: true,
            user_id,
        })
        .into_response()),
    }
}

/// Exchange the refresh token in the `Authorization` header for a new pair
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<RefreshResponse>> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AuthError::MissingToken)?;

    let pair = state.auth.refresh(bearer.token()).await?;
    Ok(Json(RefreshResponse::from(pair)))
}

/// Revoke the caller's tokens and end the current session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    jar: CookieJar,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let refresh = headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Refresh-Token header is required".to_string()))?;

    state.auth.logout(&ctx, refresh).await?;

    Ok((
        without_session_cookie(jar),
        Json(MessageResponse::new("Logged out successfully")),
    )
        .into_response())
}

/// Letters, digits, `_`, `-` and `.`
fn validate_username(username: &str) -> ApiResult<()> {
    let valid = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Username may only contain letters, digits, '_', '-' and '.'".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("a.b-c").is_ok());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username("al:ce").is_err());
    }
}
