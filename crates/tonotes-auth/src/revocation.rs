//! Revocation List
//!
//! Revoked tokens are stored in the key/value store under
//! `blacklist:access:<token>` / `blacklist:refresh:<token>` with a TTL equal
//! to the token's remaining lifetime, so entries vanish when the token would
//! have expired anyway.
//!
//! Failure policy: `is_revoked` fails open (an unreachable store lets
//! already-issued tokens through) while `revoke_pair` fails closed so that
//! logout never reports success without the entries in place.

use std::sync::Arc;
use tonotes_db::cache::keys;
use tonotes_db::KeyValueStore;
use tracing::{debug, error, warn};

use crate::error::{AuthError, AuthResult};
use crate::jwt::TokenService;

const SENTINEL: &str = "1";

/// TTL-indexed set of revoked tokens
#[derive(Clone)]
pub struct RevocationList {
    store: Arc<dyn KeyValueStore>,
    tokens: Arc<TokenService>,
}

impl RevocationList {
    pub fn new(store: Arc<dyn KeyValueStore>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    /// Revoke an access/refresh pair
    ///
    /// Both tokens are attempted even if the first one fails.
    pub async fn revoke_pair(&self, access_token: &str, refresh_token: &str) -> AuthResult<()> {
        let access = self.revoke(keys::REVOKED_ACCESS, access_token).await;
        let refresh = self.revoke(keys::REVOKED_REFRESH, refresh_token).await;

        if access.is_err() || refresh.is_err() {
            return Err(AuthError::RevocationFailed);
        }
        Ok(())
    }

    async fn revoke(&self, prefix: &str, token: &str) -> AuthResult<()> {
        let Some(ttl) = self.tokens.remaining_lifetime(token) else {
            // Expired or forged tokens are rejected by parsing already
            debug!("Skipping revocation of a token with no remaining lifetime");
            return Ok(());
        };

        let key = format!("{}{}", prefix, token);
        self.store.set_ex(&key, SENTINEL, ttl).await.map_err(|e| {
            error!(error = %e, "Failed to record revoked token");
            AuthError::RevocationFailed
        })
    }

    /// True if the token appears in either namespace
    pub async fn is_revoked(&self, token: &str) -> bool {
        let access_key = format!("{}{}", keys::REVOKED_ACCESS, token);
        let refresh_key = format!("{}{}", keys::REVOKED_REFRESH, token);

        match self.store.exists_any(&[access_key.as_str(), refresh_key.as_str()]).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Revocation check failed, allowing token");
                false
            }
        }
    }

    /// Release the underlying store connection
    pub async fn close(&self) {
        self.store.close().await;
    }
}
