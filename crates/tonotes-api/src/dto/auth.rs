//! Authentication DTOs

use serde::{Deserialize, Serialize};
use tonotes_auth::{LoginSuccess, TokenPair, UserSummary};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Registration
// =============================================================================

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3 to 32 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 256, message = "Password is required"))]
    pub password: String,
}

/// Registration response
#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub profile: UserSummary,
    pub token: String,
    pub refresh: String,
    pub session_id: Uuid,
}

impl From<&LoginSuccess> for RegisterResponse {
    fn from(success: &LoginSuccess) -> Self {
        Self {
            profile: success.user.clone(),
            token: success.tokens.access_token.clone(),
            refresh: success.tokens.refresh_token.clone(),
            session_id: success.session.id,
        }
    }
}

// =============================================================================
// Login
// =============================================================================

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// TOTP code, required once 2FA is enabled
    #[serde(default)]
    pub totp_code: Option<String>,
}

/// Tokens issued by a completed login
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub refresh: String,
    pub token_type: String,
    /// Access token expiry (Unix timestamp)
    pub expires_at: i64,
    pub session_id: Uuid,
    pub user: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl From<&LoginSuccess> for LoginResponse {
    fn from(success: &LoginSuccess) -> Self {
        Self {
            token: success.tokens.access_token.clone(),
            refresh: success.tokens.refresh_token.clone(),
            token_type: success.tokens.token_type.clone(),
            expires_at: success.tokens.access_expires_at,
            session_id: success.session.id,
            user: success.user.clone(),
            notice: success.notice.clone(),
        }
    }
}

/// Password accepted, second factor still needed
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorChallenge {
    pub requires_2fa: bool,
    pub user_id: Uuid,
}

// =============================================================================
// Token Refresh
// =============================================================================

/// Refresh token response
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub new_refresh_token: String,
    pub token_type: String,
    /// Access token expiry (Unix timestamp)
    pub expires_at: i64,
}

impl From<TokenPair> for RefreshResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            new_refresh_token: pair.refresh_token,
            token_type: pair.token_type,
            expires_at: pair.access_expires_at,
        }
    }
}
