//! Error taxonomy of the auth core
//!
//! Every [`AuthError`] maps to one [`ErrorKind`], which fixes the HTTP status,
//! and to a stable machine-readable code. Client messages never carry store
//! or crypto details; those only reach the logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tonotes_db::DbError;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Token Errors
    // =========================================================================
    /// No bearer token on a protected request
    #[error("Authentication required")]
    MissingToken,

    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// Token is invalid (malformed, wrong signature, wrong algorithm, etc.)
    #[error("Invalid token")]
    InvalidToken,

    /// An access token was presented where a refresh token is required
    #[error("Wrong token kind")]
    WrongTokenKind,

    /// Token has been revoked
    #[error("Token has been revoked")]
    TokenRevoked,

    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// Unknown username or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password does not meet requirements
    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    /// Stored password digest could not be parsed
    #[error("Malformed password digest")]
    MalformedDigest,

    // =========================================================================
    // 2FA Errors
    // =========================================================================
    /// Two-factor authentication is required
    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    /// Invalid 2FA code
    #[error("Invalid 2FA code")]
    InvalidTwoFactorCode,

    /// 2FA is not enabled for this account
    #[error("2FA not enabled")]
    TwoFactorNotEnabled,

    /// 2FA is already enabled
    #[error("2FA already enabled")]
    TwoFactorAlreadyEnabled,

    /// Recovery code unknown or already used
    #[error("Invalid recovery code")]
    InvalidRecoveryCode,

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// No session id accompanied the request
    #[error("Session required")]
    SessionRequired,

    /// Session not found
    #[error("Session not found")]
    SessionNotFound,

    /// Session ended or expired
    #[error("Session has been invalidated")]
    SessionInvalidated,

    // =========================================================================
    // Access Errors
    // =========================================================================
    /// Resource belongs to another user
    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    // =========================================================================
    // Account Errors
    // =========================================================================
    #[error("Username already taken")]
    UsernameTaken,

    #[error("Email already in use")]
    EmailTaken,

    /// Change attempted inside its cooldown window
    #[error("Too many changes, next allowed at {next_allowed_at}")]
    RateLimited {
        /// Earliest time the change is accepted again
        next_allowed_at: DateTime<Utc>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Document or key/value store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A token could not be added to the revocation list
    #[error("Token revocation failed")]
    RevocationFailed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not be exposed to clients)
    #[error("Internal error")]
    Internal(String),
}

/// Client-facing error classes; each maps to one HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    InvalidCredentials,
    Requires2FA,
    Invalid2FA,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    WeakPassword,
    StorageFailed,
    RevocationFailed,
    InternalError,
}

impl ErrorKind {
    /// HTTP status code for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput | Self::WeakPassword => 400,
            Self::InvalidCredentials | Self::Invalid2FA | Self::Unauthorized => 401,
            Self::Requires2FA | Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimited => 429,
            Self::StorageFailed | Self::RevocationFailed | Self::InternalError => 500,
        }
    }
}

impl AuthError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingToken
            | Self::TokenExpired
            | Self::InvalidToken
            | Self::WrongTokenKind
            | Self::TokenRevoked
            | Self::SessionRequired
            | Self::SessionNotFound
            | Self::SessionInvalidated => ErrorKind::Unauthorized,

            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::WeakPassword(_) => ErrorKind::WeakPassword,

            Self::TwoFactorRequired => ErrorKind::Requires2FA,
            Self::InvalidTwoFactorCode | Self::InvalidRecoveryCode => ErrorKind::Invalid2FA,
            Self::TwoFactorNotEnabled | Self::TwoFactorAlreadyEnabled | Self::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }

            Self::Forbidden => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UsernameTaken | Self::EmailTaken => ErrorKind::Conflict,
            Self::RateLimited { .. } => ErrorKind::RateLimited,

            Self::Storage(_) => ErrorKind::StorageFailed,
            Self::RevocationFailed => ErrorKind::RevocationFailed,
            Self::MalformedDigest | Self::Config(_) | Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Get an error code for the client (safe to expose)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingToken => "UNAUTHENTICATED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::WrongTokenKind => "WRONG_TOKEN_KIND",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::MalformedDigest => "INTERNAL_ERROR",
            Self::TwoFactorRequired => "2FA_REQUIRED",
            Self::InvalidTwoFactorCode => "INVALID_2FA_CODE",
            Self::TwoFactorNotEnabled => "2FA_NOT_ENABLED",
            Self::TwoFactorAlreadyEnabled => "2FA_ALREADY_ENABLED",
            Self::InvalidRecoveryCode => "INVALID_CODE",
            Self::SessionRequired => "SESSION_REQUIRED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionInvalidated => "SESSION_INVALIDATED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Storage(_) => "INTERNAL_ERROR",
            Self::RevocationFailed => "INTERNAL_ERROR",
            Self::Config(_) => "INTERNAL_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Server-side faults, logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Message for the response body; internal failures are masked
    pub fn client_message(&self) -> String {
        if self.is_server_error() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }

    /// Seconds until a rate-limited action is allowed again, rounded up
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { next_allowed_at } => {
                let millis = (*next_allowed_at - Utc::now()).num_milliseconds().max(0) as u64;
                Some(millis.div_ceil(1000))
            }
            _ => None,
        }
    }
}

/// Error response for API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message (human-readable)
    pub error: String,
    /// Error code (machine-readable)
    pub code: String,
    /// Earliest retry time (for rate limiting)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_allowed_at: Option<DateTime<Utc>>,
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        let next_allowed_at = match error {
            AuthError::RateLimited { next_allowed_at } => Some(*next_allowed_at),
            _ => None,
        };

        Self {
            error: error.client_message(),
            code: error.error_code().to_string(),
            next_allowed_at,
        }
    }
}

// Conversions from library errors
impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::InvalidToken,
        }
    }
}

impl From<password_hash::Error> for AuthError {
    fn from(_: password_hash::Error) -> Self {
        Self::MalformedDigest
    }
}

impl From<DbError> for AuthError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other.to_string()),
        }
    }
}
