//! JWT Token Service
//!
//! HS256 access and refresh tokens signed with one shared secret. Refresh
//! tokens carry `type: "refresh"`; access tokens carry no type claim and no
//! session binding.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::{TokenClaims, TokenKind, TokenPair, REFRESH_TOKEN_TYPE};

/// Mints and validates tokens
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Mint a short-lived access token for `user_id`
    pub fn mint_access(&self, user_id: Uuid) -> AuthResult<String> {
        self.mint(user_id, TokenKind::Access).map(|(token, _)| token)
    }

    /// Mint a long-lived refresh token for `user_id`
    pub fn mint_refresh(&self, user_id: Uuid) -> AuthResult<String> {
        self.mint(user_id, TokenKind::Refresh).map(|(token, _)| token)
    }

    /// Mint both tokens at once
    pub fn mint_pair(&self, user_id: Uuid) -> AuthResult<TokenPair> {
        let (access_token, access_exp) = self.mint(user_id, TokenKind::Access)?;
        let (refresh_token, refresh_exp) = self.mint(user_id, TokenKind::Refresh)?;
        Ok(TokenPair::new(access_token, refresh_token, access_exp, refresh_exp))
    }

    fn mint(&self, user_id: Uuid, kind: TokenKind) -> AuthResult<(String, i64)> {
        let (lifetime, token_type) = match kind {
            TokenKind::Access => (self.config.access_token_lifetime, None),
            TokenKind::Refresh => (
                self.config.refresh_token_lifetime,
                Some(REFRESH_TOKEN_TYPE.to_string()),
            ),
        };

        let now = Utc::now();
        let exp = now + Duration::from_std(lifetime).map_err(|e| AuthError::Internal(e.to_string()))?;

        let claims = TokenClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            token_type,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode token: {}", e)))?;

        Ok((token, claims.exp))
    }

    /// Verify signature, algorithm, issuer and expiry
    ///
    /// Expiry is strict: a token whose `exp` equals the current second is expired.
    pub fn parse(&self, token: &str) -> AuthResult<TokenClaims> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation())?.claims;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Parse a refresh token and return its subject
    pub fn validate_refresh(&self, token: &str) -> AuthResult<Uuid> {
        let claims = self.parse(token)?;

        if claims.kind() != TokenKind::Refresh {
            return Err(AuthError::WrongTokenKind);
        }

        claims.user_id().ok_or(AuthError::InvalidToken)
    }

    /// Time left before a genuine token expires
    ///
    /// Returns `None` for tokens that are already expired or fail signature checks.
    pub fn remaining_lifetime(&self, token: &str) -> Option<std::time::Duration> {
        let mut validation = self.validation();
        validation.validate_exp = false;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .ok()?
            .claims;
        let exp = chrono::DateTime::from_timestamp(claims.exp, 0)?;
        (exp - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.validate_aud = false;
        validation.leeway = 0;
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-key-for-jwt-tokens-min-32-bytes!".to_string(),
            ..JwtConfig::default()
        }
    }

    #[test]
    fn test_mint_and_parse_access() {
        let service = TokenService::new(test_config());
        let user_id = Uuid::new_v4();

        let token = service.mint_access(user_id).unwrap();
        let claims = service.parse(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.iss, "toNotes");
        assert_eq!(claims.kind(), TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_validate_refresh() {
        let service = TokenService::new(test_config());
        let user_id = Uuid::new_v4();

        let pair = service.mint_pair(user_id).unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert!(pair.refresh_expires_at > pair.access_expires_at);
        assert_eq!(service.validate_refresh(&pair.refresh_token).unwrap(), user_id);
    }

    #[test]
    fn test_access_token_fails_as_refresh() {
        let service = TokenService::new(test_config());
        let token = service.mint_access(Uuid::new_v4()).unwrap();

        assert!(matches!(
            service.validate_refresh(&token),
            Err(AuthError::WrongTokenKind)
        ));
    }

    #[test]
    fn test_expiry_is_strict() {
        let mut config = test_config();
        config.access_token_lifetime = std::time::Duration::ZERO;
        let service = TokenService::new(config);

        let token = service.mint_access(Uuid::new_v4()).unwrap();
        assert!(matches!(service.parse(&token), Err(AuthError::TokenExpired)));
        assert!(service.remaining_lifetime(&token).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service = TokenService::new(test_config());
        let other = TokenService::new(JwtConfig {
            secret: "another-secret-key-another-secret-key".to_string(),
            ..JwtConfig::default()
        });

        let token = other.mint_access(Uuid::new_v4()).unwrap();
        assert!(matches!(service.parse(&token), Err(AuthError::InvalidToken)));
        assert!(service.remaining_lifetime(&token).is_none());
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let config = test_config();
        let service = TokenService::new(config.clone());
        let claims = TokenClaims {
            sub: Uuid::new_v4().to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 600,
            iss: config.issuer.clone(),
            token_type: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(service.parse(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let service = TokenService::new(test_config());
        let other = TokenService::new(JwtConfig {
            issuer: "someone-else".to_string(),
            ..test_config()
        });

        let token = other.mint_access(Uuid::new_v4()).unwrap();
        assert!(service.parse(&token).is_err());
    }

    #[test]
    fn test_remaining_lifetime() {
        let service = TokenService::new(test_config());
        let token = service.mint_refresh(Uuid::new_v4()).unwrap();

        let left = service.remaining_lifetime(&token).unwrap();
        assert!(left <= std::time::Duration::from_secs(7 * 24 * 3600));
        assert!(left > std::time::Duration::from_secs(7 * 24 * 3600 - 5));
    }

    #[test]
    fn test_invalid_token() {
        let service = TokenService::new(test_config());
        assert!(matches!(service.parse("invalid-token"), Err(AuthError::InvalidToken)));
    }
}
