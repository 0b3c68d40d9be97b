//! In-memory repositories for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::memory::MemoryStore;
use crate::models::{Session, User};
use crate::repos::{SessionRepository, UserRepository};
use crate::{DbError, DbResult};

/// User records keyed by id, with unique username and email
#[derive(Default)]
pub struct MemoryUserRepo {
    users: DashMap<Uuid, User>,
    // Serializes the uniqueness check with the write it guards
    unique: Mutex<()>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn email_owner(&self, email: &str) -> Option<Uuid> {
        self.users
            .iter()
            .find(|entry| entry.email == email)
            .map(|entry| entry.id)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepo {
    async fn create(&self, user: &User) -> DbResult<()> {
        let _guard = self.unique.lock();
        if self.users.iter().any(|entry| entry.username == user.username) {
            return Err(DbError::Duplicate("username".to_string()));
        }
        if self.email_owner(&user.email).is_some() {
            return Err(DbError::Duplicate("email".to_string()));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.clone()))
    }

    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.username == username)
            .map(|entry| entry.clone()))
    }

    async fn update_password(&self, id: Uuid, digest: &str, changed_at: DateTime<Utc>) -> DbResult<bool> {
        Ok(match self.users.get_mut(&id) {
            Some(mut user) => {
                user.password_digest = digest.to_string();
                user.last_password_change = Some(changed_at);
                true
            }
            None => false,
        })
    }

    async fn update_email(&self, id: Uuid, email: &str, changed_at: DateTime<Utc>) -> DbResult<bool> {
        let _guard = self.unique.lock();
        if self.email_owner(email).map_or(false, |owner| owner != id) {
            return Err(DbError::Duplicate("email".to_string()));
        }
        Ok(match self.users.get_mut(&id) {
            Some(mut user) => {
                user.email = email.to_string();
                user.last_email_change = Some(changed_at);
                true
            }
            None => false,
        })
    }

    async fn enable_two_factor(&self, id: Uuid, secret: &str, recovery_hashes: &[String]) -> DbResult<bool> {
        Ok(match self.users.get_mut(&id) {
            Some(mut user) if !user.two_factor_enabled => {
                user.two_factor_enabled = true;
                user.totp_secret = Some(secret.to_string());
                user.recovery_codes = recovery_hashes.to_vec();
                true
            }
            _ => false,
        })
    }

    async fn disable_two_factor(&self, id: Uuid) -> DbResult<bool> {
        Ok(match self.users.get_mut(&id) {
            Some(mut user) => {
                user.two_factor_enabled = false;
                user.totp_secret = None;
                user.recovery_codes.clear();
                true
            }
            None => false,
        })
    }

    async fn consume_recovery_code(&self, id: Uuid, hash: &str) -> DbResult<Option<usize>> {
        Ok(self.users.get_mut(&id).and_then(|mut user| {
            let pos = user.recovery_codes.iter().position(|stored| stored == hash)?;
            user.recovery_codes.remove(pos);
            Some(user.recovery_codes.len())
        }))
    }

    async fn delete(&self, id: Uuid) -> DbResult<bool> {
        Ok(self.users.remove(&id).is_some())
    }
}

/// Session records keyed by id
#[derive(Default)]
pub struct MemorySessionRepo {
    sessions: DashMap<Uuid, Session>,
}

impl MemorySessionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records held, live or not
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepo {
    async fn insert(&self, session: &Session) -> DbResult<()> {
        if self.sessions.contains_key(&session.id) {
            return Err(DbError::Duplicate("_id".to_string()));
        }
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Session>> {
        Ok(self.sessions.get(&id).map(|entry| entry.clone()))
    }

    async fn list_active(&self, user_id: Uuid, now: DateTime<Utc>) -> DbResult<Vec<Session>> {
        let mut live: Vec<Session> = self
            .sessions
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.is_live(now))
            .map(|entry| entry.clone())
            .collect();
        live.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(live)
    }

    async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> DbResult<u64> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.is_live(now))
            .count() as u64)
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<Option<Session>> {
        Ok(match self.sessions.get_mut(&id) {
            Some(mut session) if session.is_live(now) => {
                if now > session.last_activity_at {
                    session.last_activity_at = now;
                }
                Some(session.clone())
            }
            _ => None,
        })
    }

    async fn deactivate(&self, id: Uuid) -> DbResult<bool> {
        Ok(match self.sessions.get_mut(&id) {
            Some(mut session) if session.active => {
                session.active = false;
                true
            }
            _ => false,
        })
    }

    async fn deactivate_all(&self, user_id: Uuid) -> DbResult<u64> {
        let mut changed = 0;
        for mut entry in self.sessions.iter_mut() {
            if entry.user_id == user_id && entry.active {
                entry.active = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn update(&self, session: &Session) -> DbResult<bool> {
        Ok(match self.sessions.get_mut(&session.id) {
            Some(mut stored) => {
                if session.active && !stored.active {
                    return Ok(false);
                }
                let last_activity_at = stored.last_activity_at.max(session.last_activity_at);
                *stored = Session {
                    last_activity_at,
                    ..session.clone()
                };
                true
            }
            None => false,
        })
    }

    async fn delete_for_user(&self, user_id: Uuid) -> DbResult<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - self.sessions.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        Ok((before - self.sessions.len()) as u64)
    }
}

/// A complete set of in-memory backends
#[derive(Clone)]
pub struct MockDatabase {
    pub users: Arc<MemoryUserRepo>,
    pub sessions: Arc<MemorySessionRepo>,
    pub store: Arc<MemoryStore>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self {
            users: Arc::new(MemoryUserRepo::new()),
            sessions: Arc::new(MemorySessionRepo::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}
