//! API error handling
//!
//! Auth errors keep their own kind, status and machine code. Request-shape
//! errors raised before the core is reached render as `INVALID_INPUT`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tonotes_auth::middleware::auth_error_response;
use tonotes_auth::{AuthError, ErrorResponse};

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(err) => {
                if err.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                }
                auth_error_response(err)
            }
            other => {
                let body = ErrorResponse {
                    error: other.to_string(),
                    code: "INVALID_INPUT".to_string(),
                    next_allowed_at: None,
                };
                (other.status_code(), Json(body)).into_response()
            }
        }
    }
}
