//! Password Service
//!
//! Argon2id hashing with per-password random salts. Digests are PHC strings,
//! so verification reads the parameters and salt from the digest itself.

use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

/// Password service for hashing and verification
#[derive(Clone)]
pub struct PasswordService {
    config: PasswordConfig,
}

impl PasswordService {
    /// Create a new password service
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    /// Hash a password that satisfies the policy
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        self.validate_policy(password)?;

        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            Some(self.config.hash_length as usize),
        )
        .map_err(|e| AuthError::Config(format!("Invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut salt_bytes = Zeroizing::new(vec![0u8; self.config.salt_length]);
        rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::Internal(format!("Salt encoding failed: {}", e)))?;

        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored digest
    ///
    /// The comparison of derived keys is constant-time.
    pub fn verify(&self, digest: &str, password: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(digest)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(_) => Err(AuthError::MalformedDigest),
        }
    }

    /// Check a candidate password against the policy
    ///
    /// Requires a minimum length, both letter cases, and minimum counts of
    /// digits and of punctuation/symbol characters.
    pub fn validate_policy(&self, password: &str) -> AuthResult<()> {
        let mut errors = Vec::new();

        if password.chars().count() < self.config.min_length {
            errors.push(format!(
                "Password must be at least {} characters",
                self.config.min_length
            ));
        }

        if !password.chars().any(|c| c.is_uppercase()) {
            errors.push("Password must contain at least one uppercase letter".to_string());
        }

        if !password.chars().any(|c| c.is_lowercase()) {
            errors.push("Password must contain at least one lowercase letter".to_string());
        }

        let digits = password.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < self.config.min_digits {
            errors.push(format!(
                "Password must contain at least {} digits",
                self.config.min_digits
            ));
        }

        let symbols = password
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        if symbols < self.config.min_symbols {
            errors.push(format!(
                "Password must contain at least {} symbols",
                self.config.min_symbols
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::WeakPassword(errors.join("; ")))
        }
    }
}
