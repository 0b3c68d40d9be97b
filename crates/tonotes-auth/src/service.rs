//! Auth Orchestrator
//!
//! Composes the password hasher, token service, revocation list, session
//! registry and 2FA into the flows handlers call: register, login, refresh,
//! logout and the account-management operations.

use chrono::{DateTime, Utc};
use std::sync::Arc;
#[cfg(any(test, feature = "mock"))]
use tonotes_db::mock::MockDatabase;
use tonotes_db::{Database, DbError, KeyValueStore, Session, SessionRepository, User, UserRepository};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::device::GeoLocator;
use crate::error::{AuthError, AuthResult};
use crate::jwt::TokenService;
use crate::password::PasswordService;
use crate::revocation::RevocationList;
use crate::session::SessionRegistry;
use crate::session_cache::SessionCache;
use crate::totp::TotpService;
use crate::two_factor::TwoFactorService;
use crate::types::{
    AuthContext, LoginOutcome, LoginSuccess, RecoveryLogin, RequestMeta, TokenKind, TokenPair,
    TotpEnrollment, UserSummary,
};

const EVICTION_NOTICE: &str =
    "Maximum number of active sessions reached. Your least recently used session was logged out.";
const NO_RECOVERY_CODES_LEFT: &str =
    "This was your last recovery code. Disable and re-enable 2FA to get new codes.";

/// Storage handles the orchestrator runs on
#[derive(Clone)]
pub struct Backends {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub store: Arc<dyn KeyValueStore>,
}

impl From<&Database> for Backends {
    fn from(db: &Database) -> Self {
        Self {
            users: db.user_repo(),
            sessions: db.session_repo(),
            store: db.store(),
        }
    }
}

#[cfg(any(test, feature = "mock"))]
impl From<&MockDatabase> for Backends {
    fn from(db: &MockDatabase) -> Self {
        Self {
            users: db.users.clone(),
            sessions: db.sessions.clone(),
            store: db.store.clone(),
        }
    }
}

/// Authentication and account orchestrator
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    users: Arc<dyn UserRepository>,
    passwords: PasswordService,
    tokens: Arc<TokenService>,
    revocation: RevocationList,
    sessions: Arc<SessionRegistry>,
    two_factor: TwoFactorService,
}

impl AuthService {
    pub fn new(config: AuthConfig, backends: Backends, geo: Arc<dyn GeoLocator>) -> Self {
        let tokens = Arc::new(TokenService::new(config.jwt.clone()));
        let revocation = RevocationList::new(backends.store.clone(), tokens.clone());
        let cache = SessionCache::new(backends.store, config.session.cache_ttl);
        let sessions = Arc::new(SessionRegistry::new(
            backends.sessions,
            cache,
            geo,
            config.session.clone(),
        ));
        let two_factor =
            TwoFactorService::new(backends.users.clone(), TotpService::new(config.totp.clone()));

        Self {
            passwords: PasswordService::new(config.password.clone()),
            users: backends.users,
            tokens,
            revocation,
            sessions,
            two_factor,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        self.sessions.clone()
    }

    pub fn revocation(&self) -> &RevocationList {
        &self.revocation
    }

    // =========================================================================
    // Registration and login
    // =========================================================================

    /// Create an account and open its first session
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> AuthResult<LoginSuccess> {
        self.passwords.validate_policy(password)?;

        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let digest = self.hash_password(password).await?;
        let user = User::new(username.to_string(), email.to_string(), digest, Utc::now());

        self.users.create(&user).await.map_err(duplicate_to_conflict)?;
        info!(user_id = %user.id, username = %user.username, "User registered");

        self.open_session(&user, meta).await
    }

    /// Password login with an optional TOTP code
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        totp_code: Option<&str>,
        meta: &RequestMeta,
    ) -> AuthResult<LoginOutcome> {
        let user = self.check_credentials(username, password).await?;

        if user.two_factor_enabled {
            let Some(code) = totp_code.filter(|c| !c.trim().is_empty()) else {
                info!(user_id = %user.id, "Login awaiting second factor");
                return Ok(LoginOutcome::TwoFactorRequired { user_id: user.id });
            };
            if !self.two_factor.verify_user(&user, code)? {
                warn!(user_id = %user.id, "Login rejected: invalid 2FA code");
                return Err(AuthError::InvalidTwoFactorCode);
            }
        }

        let success = self.open_session(&user, meta).await?;
        info!(user_id = %user.id, session_id = %success.session.id, "User logged in");
        Ok(LoginOutcome::Authenticated(success))
    }

    /// Password login that spends a recovery code in place of a TOTP code
    pub async fn login_with_recovery(
        &self,
        username: &str,
        password: &str,
        recovery_code: &str,
        meta: &RequestMeta,
    ) -> AuthResult<RecoveryLogin> {
        let user = self.check_credentials(username, password).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let remaining = self.two_factor.consume_recovery(user.id, recovery_code).await?;
        let login = self.open_session(&user, meta).await?;
        info!(user_id = %user.id, session_id = %login.session.id, "User logged in with recovery code");

        Ok(RecoveryLogin {
            login,
            remaining_codes: remaining,
            warning: (remaining == 0).then(|| NO_RECOVERY_CODES_LEFT.to_string()),
        })
    }

    async fn check_credentials(&self, username: &str, password: &str) -> AuthResult<User> {
        // Unknown user and wrong password must be indistinguishable
        let Some(user) = self.users.find_by_username(username).await?.filter(|u| u.active) else {
            warn!(username = %username, "Login rejected: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify_password(&user.password_digest, password).await? {
            warn!(user_id = %user.id, "Login rejected: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    async fn open_session(&self, user: &User, meta: &RequestMeta) -> AuthResult<LoginSuccess> {
        let created = self.sessions.create(user.id, meta).await?;
        let tokens = self.tokens.mint_pair(user.id)?;

        let notice = created.evicted.map(|evicted| {
            info!(user_id = %user.id, session_id = %evicted, "Session evicted to make room for new login");
            EVICTION_NOTICE.to_string()
        });

        Ok(LoginSuccess {
            tokens,
            user: UserSummary::from(user),
            session: created.session,
            notice,
        })
    }

    // =========================================================================
    // Per-request authentication
    // =========================================================================

    /// Resolve a bearer access token plus session id into an [`AuthContext`]
    ///
    /// The session must be live and owned by the token subject. Its activity
    /// timestamp is bumped on success.
    pub async fn authenticate(
        &self,
        access_token: &str,
        session_id: Option<Uuid>,
    ) -> AuthResult<AuthContext> {
        let claims = self.tokens.parse(access_token)?;
        if claims.kind() != TokenKind::Access {
            return Err(AuthError::InvalidToken);
        }
        let user_id = claims.user_id().ok_or(AuthError::InvalidToken)?;

        if self.revocation.is_revoked(access_token).await {
            return Err(AuthError::TokenRevoked);
        }

        let session_id = session_id.ok_or(AuthError::SessionRequired)?;
        self.sessions
            .get(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(AuthError::SessionNotFound)?;

        let session = self
            .sessions
            .touch(session_id)
            .await?
            .ok_or(AuthError::SessionInvalidated)?;

        Ok(AuthContext {
            user_id,
            session,
            access_token: access_token.to_string(),
        })
    }

    /// Exchange a refresh token for a fresh pair
    ///
    /// The presented refresh token stays valid; rotation happens on logout.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let user_id = self.tokens.validate_refresh(refresh_token)?;

        if self.revocation.is_revoked(refresh_token).await {
            return Err(AuthError::TokenRevoked);
        }

        match self.users.find_by_id(user_id).await? {
            Some(user) if user.active => {}
            _ => return Err(AuthError::InvalidToken),
        }

        self.tokens.mint_pair(user_id)
    }

    // =========================================================================
    // Logout
    // =========================================================================

    /// Revoke both tokens and end the current session
    ///
    /// The refresh token must be a refresh token of the caller; an expired one
    /// has nothing left to revoke and is accepted. Once it checks out both
    /// steps always run, and failure of either is reported after the fact.
    pub async fn logout(&self, ctx: &AuthContext, refresh_token: &str) -> AuthResult<()> {
        match self.tokens.validate_refresh(refresh_token) {
            Ok(owner) if owner == ctx.user_id => {}
            Ok(owner) => {
                warn!(user_id = %ctx.user_id, owner = %owner, "Logout with another user's refresh token");
                return Err(AuthError::InvalidToken);
            }
            Err(AuthError::TokenExpired) => {}
            Err(e) => return Err(e),
        }

        let revoked = self.revocation.revoke_pair(&ctx.access_token, refresh_token).await;

        // Conditional deactivation leaves the stored activity time alone
        let session = &ctx.session;
        let ended = self.sessions.end(session).await;

        if let Err(e) = &revoked {
            error!(user_id = %ctx.user_id, error = %e, "Logout: token revocation failed");
        }
        if let Err(e) = &ended {
            error!(user_id = %ctx.user_id, session_id = %session.id, error = %e, "Logout: ending session failed");
        }
        if revoked.is_err() || ended.is_err() {
            return Err(AuthError::Internal("logout incomplete".to_string()));
        }

        info!(user_id = %ctx.user_id, session_id = %session.id, "User logged out");
        Ok(())
    }

    /// End every session of the caller
    pub async fn logout_all(&self, ctx: &AuthContext) -> AuthResult<u64> {
        let ended = self.sessions.end_all(ctx.user_id).await?;
        info!(user_id = %ctx.user_id, ended, "User logged out everywhere");
        Ok(ended)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn list_sessions(&self, ctx: &AuthContext) -> AuthResult<Vec<Session>> {
        self.sessions.list_active(ctx.user_id).await
    }

    /// A session owned by the caller
    pub async fn get_session(&self, ctx: &AuthContext, session_id: Uuid) -> AuthResult<Session> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Session".to_string()))?;
        if session.user_id != ctx.user_id {
            return Err(AuthError::Forbidden);
        }
        Ok(session)
    }

    /// End a session owned by the caller. Returns true if it was the current one.
    pub async fn end_session(&self, ctx: &AuthContext, session_id: Uuid) -> AuthResult<bool> {
        let session = self.get_session(ctx, session_id).await?;
        self.sessions.end(&session).await?;
        Ok(session.id == ctx.session_id())
    }

    // =========================================================================
    // Account
    // =========================================================================

    pub async fn current_user(&self, user_id: Uuid) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))
    }

    /// End all sessions, then delete the sessions and the user record
    pub async fn delete_account(&self, ctx: &AuthContext) -> AuthResult<()> {
        self.sessions.end_all(ctx.user_id).await?;
        self.sessions.purge_user(ctx.user_id).await?;
        if !self.users.delete(ctx.user_id).await? {
            return Err(AuthError::NotFound("User".to_string()));
        }
        info!(user_id = %ctx.user_id, "Account deleted");
        Ok(())
    }

    /// Change the password, at most once per cooldown period
    ///
    /// Other sessions of the user are ended; the current one stays.
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self.current_user(ctx.user_id).await?;
        let now = Utc::now();
        self.check_cooldown(user.last_password_change, now)?;

        if !self.verify_password(&user.password_digest, current_password).await? {
            return Err(AuthError::InvalidCredentials);
        }
        self.passwords.validate_policy(new_password)?;
        if self.verify_password(&user.password_digest, new_password).await? {
            return Err(AuthError::InvalidInput(
                "New password must differ from the current one".to_string(),
            ));
        }

        let digest = self.hash_password(new_password).await?;
        if !self.users.update_password(user.id, &digest, now).await? {
            return Err(AuthError::NotFound("User".to_string()));
        }

        let ended = self.sessions.end_all_except(user.id, ctx.session_id()).await?;
        info!(user_id = %user.id, other_sessions_ended = ended, "Password changed");
        Ok(())
    }

    /// Change the email address, at most once per cooldown period
    pub async fn change_email(&self, ctx: &AuthContext, new_email: &str) -> AuthResult<()> {
        let user = self.current_user(ctx.user_id).await?;
        let now = Utc::now();
        self.check_cooldown(user.last_email_change, now)?;

        if user.email == new_email {
            return Err(AuthError::InvalidInput(
                "New email must differ from the current one".to_string(),
            ));
        }

        let updated = self
            .users
            .update_email(user.id, new_email, now)
            .await
            .map_err(duplicate_to_conflict)?;
        if !updated {
            return Err(AuthError::NotFound("User".to_string()));
        }
        info!(user_id = %user.id, "Email changed");
        Ok(())
    }

    fn check_cooldown(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> AuthResult<()> {
        let Some(last) = last else {
            return Ok(());
        };
        let cooldown = chrono::Duration::from_std(self.config.account.change_cooldown)
            .map_err(|e| AuthError::Config(format!("change cooldown: {}", e)))?;
        let next_allowed_at = last + cooldown;
        if now < next_allowed_at {
            return Err(AuthError::RateLimited { next_allowed_at });
        }
        Ok(())
    }

    // =========================================================================
    // Two-factor
    // =========================================================================

    pub async fn two_factor_setup(&self, user_id: Uuid) -> AuthResult<TotpEnrollment> {
        let user = self.current_user(user_id).await?;
        self.two_factor.generate_secret(&user)
    }

    pub async fn two_factor_enable(
        &self,
        user_id: Uuid,
        secret: &str,
        code: &str,
    ) -> AuthResult<Vec<String>> {
        self.two_factor.enable(user_id, secret, code).await
    }

    pub async fn two_factor_verify(&self, user_id: Uuid, code: &str) -> AuthResult<bool> {
        self.two_factor.verify(user_id, code).await
    }

    pub async fn two_factor_disable(&self, user_id: Uuid, code: &str) -> AuthResult<()> {
        self.two_factor.disable(user_id, code).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Release the key/value store
    pub async fn close(&self) {
        self.revocation.close().await;
    }

    async fn hash_password(&self, password: &str) -> AuthResult<String> {
        let passwords = self.passwords.clone();
        let password = zeroize::Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task: {}", e)))?
    }

    async fn verify_password(&self, digest: &str, password: &str) -> AuthResult<bool> {
        let passwords = self.passwords.clone();
        let digest = digest.to_string();
        let password = zeroize::Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || passwords.verify(&digest, &password))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task: {}", e)))?
    }
}

fn duplicate_to_conflict(err: DbError) -> AuthError {
    match err {
        DbError::Duplicate(field) if field == "email" => AuthError::EmailTaken,
        DbError::Duplicate(_) => AuthError::UsernameTaken,
        other => other.into(),
    }
}
