//! Session Handlers

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;
use tonotes_auth::RequireAuth;
use uuid::Uuid;

use super::without_session_cookie;
use crate::dto::{LogoutAllResponse, MessageResponse, SessionListResponse, SessionView};
use crate::error::ApiResult;
use crate::state::AppState;

/// Active sessions of the caller, most recently active first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
) -> ApiResult<Json<SessionListResponse>> {
    let current = ctx.session_id();
    let sessions: Vec<SessionView> = state
        .auth
        .list_sessions(&ctx)
        .await?
        .into_iter()
        .map(|s| SessionView::new(s, current))
        .collect();

    Ok(Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    }))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = state.auth.get_session(&ctx, session_id).await?;
    Ok(Json(SessionView::new(session, ctx.session_id())))
}

/// End one of the caller's sessions
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    jar: CookieJar,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Response> {
    let was_current = state.auth.end_session(&ctx, session_id).await?;
    let body = Json(MessageResponse::new("Session ended"));

    if was_current {
        Ok((without_session_cookie(jar), body).into_response())
    } else {
        Ok(body.into_response())
    }
}

/// End every session of the caller
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    RequireAuth(ctx): RequireAuth,
    jar: CookieJar,
) -> ApiResult<Response> {
    let ended = state.auth.logout_all(&ctx).await?;

    Ok((
        without_session_cookie(jar),
        Json(LogoutAllResponse {
            message: "Logged out from all sessions".to_string(),
            sessions_ended: ended,
        }),
    )
        .into_response())
}
