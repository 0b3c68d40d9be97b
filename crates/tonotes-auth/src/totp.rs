//! TOTP (Time-based One-Time Password) Service
//!
//! Second factor for accounts that opt in:
//! - Shared-secret generation with an `otpauth://` provisioning URI
//! - QR code of that URI as an SVG data URI
//! - Code verification with a configurable step skew (RFC 6238, HMAC-SHA1)
//! - Recovery code generation and hashing

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::TotpConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::TotpEnrollment;

/// TOTP service for two-factor authentication
#[derive(Clone)]
pub struct TotpService {
    config: TotpConfig,
}

impl TotpService {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a fresh secret for `account` (the user's email)
    pub fn generate_secret(&self, account: &str) -> AuthResult<TotpEnrollment> {
        let secret = Secret::generate_secret();
        let bytes = secret
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("TOTP secret: {}", e)))?;

        let totp = self.build(bytes, account)?;
        let otpauth_url = totp.get_url();
        let qr_code = qr_data_uri(&otpauth_url)?;

        Ok(TotpEnrollment {
            secret: secret.to_encoded().to_string(),
            otpauth_url,
            qr_code,
        })
    }

    /// Verify `code` against a base32 `secret` at the current time
    ///
    /// Anything that is not exactly the configured number of ASCII digits is
    /// rejected without touching the secret.
    pub fn verify_code(&self, secret: &str, code: &str) -> AuthResult<bool> {
        let code = code.trim();
        if code.len() != self.config.digits || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.build(decode_secret(secret)?, "")?;
        let now = Utc::now().timestamp().max(0) as u64;
        let skew = u64::from(self.config.skew);

        // Walk the window from one edge to the other
        for offset in 0..=(2 * skew) {
            let Some(time) = (now + offset * self.config.step).checked_sub(skew * self.config.step)
            else {
                continue;
            };
            if constant_time_compare(code, &totp.generate(time)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The code for `secret` right now
    pub fn current_code(&self, secret: &str) -> AuthResult<String> {
        let totp = self.build(decode_secret(secret)?, "")?;
        Ok(totp.generate(Utc::now().timestamp().max(0) as u64))
    }

    /// Seconds until the current code rolls over
    pub fn seconds_remaining(&self) -> u64 {
        let now = Utc::now().timestamp().max(0) as u64;
        self.config.step - (now % self.config.step)
    }

    /// Fresh plaintext recovery codes, formatted `XXXX-XXXX` (uppercase hex)
    pub fn generate_recovery_codes(&self) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..self.config.recovery_codes)
            .map(|_| {
                let mut bytes = [0u8; 4];
                rng.fill_bytes(&mut bytes);
                let code = hex::encode_upper(bytes);
                format!("{}-{}", &code[..4], &code[4..])
            })
            .collect()
    }

    fn build(&self, secret: Vec<u8>, account: &str) -> AuthResult<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            self.config.digits,
            self.config.skew,
            self.config.step,
            secret,
            Some(self.config.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AuthError::InvalidInput(format!("TOTP parameters: {}", e)))
    }
}

/// Uppercase with dashes and whitespace removed
pub fn normalize_recovery_code(code: &str) -> String {
    code.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Hex SHA-256 of the normalized code, the only form ever stored
pub fn hash_recovery_code(code: &str) -> String {
    hex::encode(Sha256::digest(normalize_recovery_code(code).as_bytes()))
}

fn decode_secret(secret: &str) -> AuthResult<Vec<u8>> {
    Secret::Encoded(secret.trim().to_uppercase())
        .to_bytes()
        .map_err(|_| AuthError::InvalidInput("Invalid TOTP secret".to_string()))
}

fn qr_data_uri(url: &str) -> AuthResult<String> {
    use qrcode::render::svg;
    use qrcode::QrCode;

    let code = QrCode::new(url.as_bytes())
        .map_err(|e| AuthError::Internal(format!("QR encode: {}", e)))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TotpService {
        TotpService::new(TotpConfig::default())
    }

    #[test]
    fn test_generate_secret() {
        let service = service();
        let enrollment = service.generate_secret("alice@example.com").unwrap();

        assert!(enrollment
            .secret
            .chars()
            .all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567=".contains(c)));
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_url.contains("ToNotes"));
        assert!(enrollment.otpauth_url.contains(&enrollment.secret));
        assert!(enrollment.qr_code.starts_with("data:image/svg+xml;base64,"));
    }

    #[test]
    fn test_verify_current_code() {
        let service = service();
        let enrollment = service.generate_secret("alice@example.com").unwrap();
        let code = service.current_code(&enrollment.secret).unwrap();

        assert_eq!(code.len(), 6);
        assert!(service.verify_code(&enrollment.secret, &code).unwrap());
        assert!(service.verify_code(&enrollment.secret, &format!(" {} ", code)).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let service = service();
        let enrollment = service.generate_secret("alice@example.com").unwrap();

        assert!(!service.verify_code(&enrollment.secret, "12345").unwrap());
        assert!(!service.verify_code(&enrollment.secret, "1234567").unwrap());
        assert!(!service.verify_code(&enrollment.secret, "12a456").unwrap());
        assert!(!service.verify_code(&enrollment.secret, "").unwrap());
    }

    #[test]
    fn test_invalid_secret_is_input_error() {
        let err = service().verify_code("not base32!", "123456").unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }

    #[test]
    fn test_recovery_code_format() {
        let codes = service().generate_recovery_codes();

        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 9);
            let (left, right) = code.split_once('-').unwrap();
            assert_eq!(left.len(), 4);
            assert_eq!(right.len(), 4);
            assert!(left
                .chars()
                .chain(right.chars())
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn test_recovery_hash_ignores_case_and_dashes() {
        assert_eq!(normalize_recovery_code(" ab12-cd34 "), "AB12CD34");
        assert_eq!(hash_recovery_code("ab12-cd34"), hash_recovery_code("AB12CD34"));
        assert_ne!(hash_recovery_code("AB12-CD34"), hash_recovery_code("AB12-CD35"));
        assert_eq!(hash_recovery_code("AB12-CD34").len(), 64);
    }

    #[test]
    fn test_seconds_remaining() {
        let remaining = service().seconds_remaining();
        assert!((1..=30).contains(&remaining));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("123456", "123456"));
        assert!(!constant_time_compare("123456", "123457"));
        assert!(!constant_time_compare("123456", "12345"));
    }
}
