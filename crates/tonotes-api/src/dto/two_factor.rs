//! Two-factor DTOs

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::auth::LoginResponse;

/// First enrollment step
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    /// SVG data URI
    pub qr_code: String,
    pub otpauth_url: String,
}

/// Second enrollment step: the secret again plus a fresh code
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TwoFactorEnableRequest {
    #[validate(length(min = 16, max = 128, message = "Invalid secret"))]
    pub secret: String,
    #[validate(length(min = 1, max = 16, message = "Code is required"))]
    pub code: String,
}

/// Plaintext recovery codes, shown once
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorEnableResponse {
    pub message: String,
    pub recovery_codes: Vec<String>,
}

/// A TOTP code for verify and disable
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TwoFactorCodeRequest {
    #[validate(length(min = 1, max = 16, message = "Code is required"))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorVerifyResponse {
    pub valid: bool,
}

/// Login with a recovery code in place of a TOTP code
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecoveryLoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[validate(length(min = 1, max = 32, message = "Recovery code is required"))]
    pub recovery_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryLoginResponse {
    #[serde(flatten)]
    pub login: LoginResponse,
    pub remaining_codes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
