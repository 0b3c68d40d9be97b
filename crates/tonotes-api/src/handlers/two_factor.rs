//! Two-Factor Handlers

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tonotes_auth::RequireAuth;

use super::{session_header, with_session_cookie};
use crate::dto::{
    LoginResponse, MessageResponse, RecoveryLoginRequest, RecoveryLoginResponse,
    TwoFactorCodeRequest, TwoFactorEnableRequest, TwoFactorEnableResponse,
    TwoFactorSetupResponse, TwoFactorVerifyResponse,
};
use crate::error::ApiResult;
use crate::extractors::{ClientMeta, ValidatedJson};
use crate::state::AppState;

/// Generate a secret and QR code; nothing is stored yet
pub async fn setup(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
) -> ApiResult<Json<TwoFactorSetupResponse>> {
    let enrollment = state.auth.two_factor_setup(ctx.user_id).await?;
    Ok(Json(TwoFactorSetupResponse {
        secret: enrollment.secret,
        qr_code: enrollment.qr_code,
        otpauth_url: enrollment.otpauth_url,
    }))
}

/// Confirm the secret with a code and receive recovery codes
pub async fn enable(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    ValidatedJson(request): ValidatedJson<TwoFactorEnableRequest>,
) -> ApiResult<Json<TwoFactorEnableResponse>> {
    let recovery_codes = state
        .auth
        .two_factor_enable(ctx.user_id, &request.secret, &request.code)
        .await?;

    Ok(Json(TwoFactorEnableResponse {
        message: "Two-factor authentication enabled. Store these recovery codes safely."
            .to_string(),
        recovery_codes,
    }))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    ValidatedJson(request): ValidatedJson<TwoFactorCodeRequest>,
) -> ApiResult<Json<TwoFactorVerifyResponse>> {
    let valid = state.auth.two_factor_verify(ctx.user_id, &request.code).await?;
    Ok(Json(TwoFactorVerifyResponse { valid }))
}

pub async fn disable(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    ValidatedJson(request): ValidatedJson<TwoFactorCodeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.auth.two_factor_disable(ctx.user_id, &request.code).await?;
    Ok(Json(MessageResponse::new("Two-factor authentication disabled")))
}

/// Complete a login with a recovery code
pub async fn recovery(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ClientMeta(meta): ClientMeta,
    ValidatedJson(request): ValidatedJson<RecoveryLoginRequest>,
) -> ApiResult<Response> {
    let recovered = state
        .auth
        .login_with_recovery(
            &request.username,
            &request.password,
            &request.recovery_code,
            &meta,
        )
        .await?;
    let session_id = recovered.login.session.id;

    Ok((
        with_session_cookie(jar, session_id),
        session_header(session_id),
        Json(RecoveryLoginResponse {
            login: LoginResponse::from(&recovered.login),
            remaining_codes: recovered.remaining_codes,
            warning: recovered.warning,
        }),
    )
        .into_response())
}
