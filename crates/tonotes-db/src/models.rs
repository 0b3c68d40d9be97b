//! Persisted records
//!
//! Sessions reference their owner by id only; users never embed sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// User
// =============================================================================

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    /// Unique, matched exactly
    pub username: String,
    /// Unique, matched exactly
    pub email: String,
    /// Self-describing password digest (salt + derived key)
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
    pub last_password_change: Option<DateTime<Utc>>,
    pub last_email_change: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    /// Base32 TOTP secret, present iff `two_factor_enabled`
    pub totp_secret: Option<String>,
    /// Hex SHA-256 digests of the normalized recovery codes still unused
    pub recovery_codes: Vec<String>,
    pub active: bool,
}

impl User {
    /// A fresh active account with 2FA disabled
    pub fn new(username: String, email: String, password_digest: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_digest,
            created_at: now,
            last_password_change: None,
            last_email_change: None,
            two_factor_enabled: false,
            totp_secret: None,
            recovery_codes: Vec::new(),
            active: true,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Server-side record of one logged-in client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Never moves backwards for a given session
    pub last_activity_at: DateTime<Utc>,
    pub device: DeviceInfo,
    pub ip: String,
    pub location: String,
    /// Once false, stays false
    pub active: bool,
}

impl Session {
    /// Active and not yet expired at `now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at > now
    }
}

/// Device fingerprint derived from the user agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: DeviceType,
    pub user_agent: String,
}

/// Device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Unknown,
    Desktop,
    Mobile,
    Tablet,
    Api,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Api => "api",
        }
    }
}
