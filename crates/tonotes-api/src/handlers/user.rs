//! Account Handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tonotes_auth::{RequireAuth, UserSummary};

use super::without_session_cookie;
use crate::dto::{ChangeEmailRequest, ChangePasswordRequest, MessageResponse};
use crate::error::ApiResult;
use crate::extractors::ValidatedJson;
use crate::state::AppState;

/// Profile of the caller
pub async fn profile(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
) -> ApiResult<Json<UserSummary>> {
    let user = state.auth.current_user(ctx.user_id).await?;
    Ok(Json(UserSummary::from(&user)))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .auth
        .change_password(&ctx, &request.current_password, &request.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed")))
}

pub async fn change_email(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    ValidatedJson(request): ValidatedJson<ChangeEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.auth.change_email(&ctx, &request.email).await?;
    Ok(Json(MessageResponse::new("Email changed")))
}

/// Delete the account and every session
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    jar: CookieJar,
) -> ApiResult<Response> {
    state.auth.delete_account(&ctx).await?;
    Ok((StatusCode::NO_CONTENT, without_session_cookie(jar)).into_response())
}
