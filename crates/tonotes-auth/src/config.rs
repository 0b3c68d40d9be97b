//! Authentication configuration
//!
//! Centralized configuration for all authentication components. Defaults
//! are production values; only the signing secret must be supplied.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AuthError, AuthResult};

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing and lifetimes
    pub jwt: JwtConfig,
    /// Password hashing and policy
    pub password: PasswordConfig,
    /// Session lifetime, cap and cache
    pub session: SessionConfig,
    /// TOTP (2FA) configuration
    pub totp: TotpConfig,
    /// Account change rules
    pub account: AccountConfig,
    /// IP geolocation
    pub geo: GeoConfig,
}

/// JWT token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// HMAC-SHA256 signing secret, shared by access and refresh tokens
    pub secret: String,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
    /// Token issuer claim
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be set in production
            access_token_lifetime: Duration::from_secs(15 * 60), // 15 minutes
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            issuer: "toNotes".to_string(),
        }
    }
}

/// Password hashing configuration (Argon2id) and policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Output hash length in bytes
    pub hash_length: u32,
    /// Salt length in bytes
    pub salt_length: usize,
    /// Minimum password length in characters
    pub min_length: usize,
    /// Minimum number of digit characters
    pub min_digits: usize,
    /// Minimum number of punctuation/symbol characters
    pub min_symbols: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 64 * 1024, // 64 MiB
            time_cost: 3,
            parallelism: 2,
            hash_length: 32,
            salt_length: 16,
            min_length: 6,
            min_digits: 2,
            min_symbols: 2,
        }
    }
}

/// Session management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Absolute session lifetime
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Maximum concurrently active sessions per user
    pub max_active: u64,
    /// Lifetime of cached per-user session lists
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// How often the janitor sweeps expired sessions
    #[serde(with = "humantime_serde")]
    pub janitor_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_active: 5,
            cache_ttl: Duration::from_secs(5 * 60),
            janitor_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// TOTP (Time-based One-Time Password) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TotpConfig {
    /// Issuer label shown in authenticator apps
    pub issuer: String,
    /// Number of digits in a code
    pub digits: usize,
    /// Time step in seconds
    pub step: u64,
    /// Steps of clock drift accepted on either side
    pub skew: u8,
    /// Number of recovery codes issued at enrollment
    pub recovery_codes: usize,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "ToNotes".to_string(),
            digits: 6,
            step: 30,
            skew: 1,
            recovery_codes: 10,
        }
    }
}

/// Rules for changing account credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Minimum time between two password changes, and between two email changes
    #[serde(with = "humantime_serde")]
    pub change_cooldown: Duration,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            change_cooldown: Duration::from_secs(14 * 24 * 60 * 60), // 14 days
        }
    }
}

/// IP geolocation lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Disable to label every public address "Unknown Location"
    pub enabled: bool,
    /// Lookup endpoint; the address is appended as a path segment
    pub endpoint: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://ip-api.com/json".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

impl AuthConfig {
    /// Create configuration from environment variables
    ///
    /// Reads `JWT_SECRET_KEY`, `JWT_EXPIRATION_TIME` and
    /// `REFRESH_TOKEN_EXPIRATION_TIME` (seconds) and `SESSION_DURATION`
    /// (seconds or a humantime string such as `24h`).
    pub fn from_env() -> AuthResult<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay values from `lookup` onto this configuration
    pub fn apply_env<F>(&mut self, lookup: F) -> AuthResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("JWT_SECRET_KEY") {
            self.jwt.secret = secret;
        }
        if let Some(raw) = lookup("JWT_EXPIRATION_TIME") {
            self.jwt.access_token_lifetime = parse_seconds("JWT_EXPIRATION_TIME", &raw)?;
        }
        if let Some(raw) = lookup("REFRESH_TOKEN_EXPIRATION_TIME") {
            self.jwt.refresh_token_lifetime = parse_seconds("REFRESH_TOKEN_EXPIRATION_TIME", &raw)?;
        }
        if let Some(raw) = lookup("SESSION_DURATION") {
            self.session.duration = parse_duration("SESSION_DURATION", &raw)?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // JWT validation
        if self.jwt.secret.is_empty() {
            errors.push("JWT secret must be set".to_string());
        } else if self.jwt.secret.len() < 32 {
            errors.push("JWT secret should be at least 256 bits (32 bytes)".to_string());
        }
        if self.jwt.access_token_lifetime >= self.jwt.refresh_token_lifetime {
            errors.push("Access token lifetime must be shorter than refresh token lifetime".to_string());
        }

        // Session validation
        if self.session.max_active == 0 {
            errors.push("At least one active session per user must be allowed".to_string());
        }
        if self.session.duration.is_zero() {
            errors.push("Session duration must be positive".to_string());
        }

        // TOTP validation
        if self.totp.step == 0 {
            errors.push("TOTP step must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn parse_seconds(name: &str, raw: &str) -> AuthResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| AuthError::Config(format!("{name}: expected seconds, got {raw:?}: {e}")))
}

fn parse_duration(name: &str, raw: &str) -> AuthResult<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw)
        .map_err(|e| AuthError::Config(format!("{name}: invalid duration {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.jwt.access_token_lifetime, Duration::from_secs(15 * 60));
        assert_eq!(config.jwt.issuer, "toNotes");
        assert_eq!(config.password.memory_cost, 65536);
        assert_eq!(config.password.parallelism, 2);
        assert_eq!(config.session.max_active, 5);
        assert_eq!(config.totp.issuer, "ToNotes");
        assert_eq!(config.totp.recovery_codes, 10);
    }

    #[test]
    fn test_config_validation_missing_secret() {
        let config = AuthConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_valid() {
        let mut config = AuthConfig::default();
        config.jwt.secret = "a".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_lifetimes() {
        let mut config = AuthConfig::default();
        config.jwt.secret = "a".repeat(32);
        config.jwt.access_token_lifetime = config.jwt.refresh_token_lifetime;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_apply_env() {
        let vars: HashMap<&str, &str> = [
            ("JWT_SECRET_KEY", "from-env"),
            ("JWT_EXPIRATION_TIME", "600"),
            ("REFRESH_TOKEN_EXPIRATION_TIME", "86400"),
            ("SESSION_DURATION", "12h"),
        ]
        .into_iter()
        .collect();

        let mut config = AuthConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.jwt.secret, "from-env");
        assert_eq!(config.jwt.access_token_lifetime, Duration::from_secs(600));
        assert_eq!(config.jwt.refresh_token_lifetime, Duration::from_secs(86400));
        assert_eq!(config.session.duration, Duration::from_secs(12 * 60 * 60));
    }

    #[test]
    fn test_session_duration_accepts_plain_seconds() {
        assert_eq!(parse_duration("X", "3600").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("X", "soon").is_err());
        assert!(parse_seconds("X", "15m").is_err());
    }
}
