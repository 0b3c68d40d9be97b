//! Two-factor enrollment and recovery against the user repository
//!
//! Enrollment is a two-step commit: `generate_secret` hands out a secret
//! without storing anything, and only `enable` with a matching code persists
//! it together with the hashed recovery codes.

use std::sync::Arc;
use tonotes_db::{User, UserRepository};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::totp::{hash_recovery_code, TotpService};
use crate::types::TotpEnrollment;

#[derive(Clone)]
pub struct TwoFactorService {
    users: Arc<dyn UserRepository>,
    totp: TotpService,
}

impl TwoFactorService {
    pub fn new(users: Arc<dyn UserRepository>, totp: TotpService) -> Self {
        Self { users, totp }
    }

    /// First enrollment step. Nothing is persisted.
    pub fn generate_secret(&self, user: &User) -> AuthResult<TotpEnrollment> {
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }
        self.totp.generate_secret(&user.email)
    }

    /// Second enrollment step: check `code` against the submitted `secret`,
    /// then store both and return the plaintext recovery codes
    pub async fn enable(&self, user_id: Uuid, secret: &str, code: &str) -> AuthResult<Vec<String>> {
        let user = self.load(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }
        if !self.totp.verify_code(secret, code)? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        let codes = self.totp.generate_recovery_codes();
        let hashes: Vec<String> = codes.iter().map(|c| hash_recovery_code(c)).collect();

        // Conditional on 2FA still being off, so two racing enables store one secret
        if !self.users.enable_two_factor(user_id, secret.trim(), &hashes).await? {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        info!(user_id = %user_id, "Two-factor authentication enabled");
        Ok(codes)
    }

    /// Check a TOTP code for a user with 2FA on
    pub async fn verify(&self, user_id: Uuid, code: &str) -> AuthResult<bool> {
        let user = self.load(user_id).await?;
        self.verify_user(&user, code)
    }

    pub fn verify_user(&self, user: &User, code: &str) -> AuthResult<bool> {
        match (&user.totp_secret, user.two_factor_enabled) {
            (Some(secret), true) => self.totp.verify_code(secret, code),
            _ => Err(AuthError::TwoFactorNotEnabled),
        }
    }

    /// Spend one recovery code. Returns how many remain.
    pub async fn consume_recovery(&self, user_id: Uuid, code: &str) -> AuthResult<usize> {
        let hash = hash_recovery_code(code);
        let remaining = self
            .users
            .consume_recovery_code(user_id, &hash)
            .await?
            .ok_or(AuthError::InvalidRecoveryCode)?;

        info!(user_id = %user_id, remaining, "Recovery code used");
        if remaining == 0 {
            warn!(user_id = %user_id, "Last recovery code used");
        }
        Ok(remaining)
    }

    /// Turn 2FA off. Requires a currently valid TOTP code.
    pub async fn disable(&self, user_id: Uuid, code: &str) -> AuthResult<()> {
        let user = self.load(user_id).await?;
        if !self.verify_user(&user, code)? {
            return Err(AuthError::InvalidTwoFactorCode);
        }
        self.users.disable_two_factor(user_id).await?;
        info!(user_id = %user_id, "Two-factor authentication disabled");
        Ok(())
    }

    async fn load(&self, user_id: Uuid) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))
    }
}
