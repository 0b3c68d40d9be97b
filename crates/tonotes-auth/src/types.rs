//! Shared authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tonotes_db::{Session, User};
use uuid::Uuid;

// =============================================================================
// Token Types
// =============================================================================

/// Claim value marking a refresh token
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// JWT token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

impl TokenPair {
    pub fn new(
        access_token: String,
        refresh_token: String,
        access_expires_at: i64,
        refresh_expires_at: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            token_type: "Bearer".to_string(),
        }
    }
}

/// Token kind, derived from the presence of the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// `"refresh"` on refresh tokens, absent on access tokens
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl TokenClaims {
    pub fn kind(&self) -> TokenKind {
        match self.token_type.as_deref() {
            Some(REFRESH_TOKEN_TYPE) => TokenKind::Refresh,
            _ => TokenKind::Access,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Client details captured when a session is opened
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub user_agent: String,
    /// Client IP as reported by proxy headers or the socket
    pub ip: Option<String>,
}

/// Authenticated caller, attached to request extensions by the middleware
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    /// The caller's session after this request's activity touch
    pub session: Session,
    /// Raw bearer token, needed to revoke it on logout
    pub access_token: String,
}

impl AuthContext {
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }
}

// =============================================================================
// Flow Results
// =============================================================================

/// Public view of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            two_factor_enabled: user.two_factor_enabled,
            created_at: user.created_at,
        }
    }
}

/// Tokens and session handed out by a completed login or registration
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub tokens: TokenPair,
    pub user: UserSummary,
    pub session: Session,
    /// Set when an older session was ended to respect the cap
    pub notice: Option<String>,
}

/// Result of a password login
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(LoginSuccess),
    /// Password was right but a TOTP code is needed; no tokens were minted
    TwoFactorRequired { user_id: Uuid },
}

/// Login completed with a recovery code instead of a TOTP code
#[derive(Debug, Clone)]
pub struct RecoveryLogin {
    pub login: LoginSuccess,
    pub remaining_codes: usize,
    /// Present once the last code has been used
    pub warning: Option<String>,
}

/// First step of 2FA enrollment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpEnrollment {
    /// Base32 shared secret
    pub secret: String,
    /// `otpauth://` provisioning URI
    pub otpauth_url: String,
    /// QR code of the provisioning URI as an SVG data URI
    pub qr_code: String,
}
