//! Session Registry
//!
//! Server-side sessions with a per-user cap on live sessions. The document
//! store is the system of record; the key/value cache only speeds up reads.
//!
//! Cap enforcement: before inserting, a user already at the cap loses their
//! least-active session. Two concurrent logins can both pass that check, so
//! after inserting the registry re-counts and keeps ending the least-active
//! *other* session until the user is back under the cap.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tonotes_db::{Session, SessionRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::device::{parse_user_agent, resolve_location, GeoLocator};
use crate::error::{AuthError, AuthResult};
use crate::session_cache::SessionCache;
use crate::types::RequestMeta;

/// Bound on retries when a concurrent writer wins a race
const SETTLE_ATTEMPTS: usize = 8;

/// A newly opened session and the session ended to make room for it
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: Session,
    pub evicted: Option<Uuid>,
}

/// Session registry backed by a repository plus cache
#[derive(Clone)]
pub struct SessionRegistry {
    repo: Arc<dyn SessionRepository>,
    cache: SessionCache,
    geo: Arc<dyn GeoLocator>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        cache: SessionCache,
        geo: Arc<dyn GeoLocator>,
        config: SessionConfig,
    ) -> Self {
        Self {
            repo,
            cache,
            geo,
            config,
        }
    }

    pub fn max_active(&self) -> u64 {
        self.config.max_active
    }

    /// Open a session for `user_id`, ending the least-active one if at the cap
    pub async fn create(&self, user_id: Uuid, meta: &RequestMeta) -> AuthResult<CreatedSession> {
        // Resolve location before touching the cap so the window stays short
        let location = resolve_location(self.geo.as_ref(), meta.ip.as_deref()).await;
        let device = parse_user_agent(&meta.user_agent);

        let mut evicted = None;
        if self.count_active(user_id).await? >= self.config.max_active {
            evicted = self.end_least_active_except(user_id, None).await?;
        }

        let now = Utc::now();
        let lifetime = Duration::from_std(self.config.duration)
            .map_err(|e| AuthError::Config(format!("session duration: {}", e)))?;
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            created_at: now,
            expires_at: now + lifetime,
            last_activity_at: now,
            device,
            ip: meta.ip.clone().unwrap_or_default(),
            location,
            active: true,
        };

        self.repo.insert(&session).await?;
        self.cache.invalidate_user(user_id).await;
        self.cache.put_session(&session, now).await;

        for _ in 0..SETTLE_ATTEMPTS {
            if self.count_active(user_id).await? <= self.config.max_active {
                break;
            }
            match self.end_least_active_except(user_id, Some(session.id)).await? {
                Some(id) => {
                    evicted.get_or_insert(id);
                }
                None => break,
            }
        }

        info!(
            user_id = %user_id,
            session_id = %session.id,
            device = session.device.device_type.as_str(),
            location = %session.location,
            "Session created"
        );

        Ok(CreatedSession { session, evicted })
    }

    /// Record activity on a live session
    ///
    /// Returns the updated session, or `None` if it is inactive, expired or unknown.
    /// The cached copy follows the stored record.
    pub async fn touch(&self, session_id: Uuid) -> AuthResult<Option<Session>> {
        let now = Utc::now();
        let touched = self.repo.touch(session_id, now).await?;
        match &touched {
            Some(session) => self.cache.put_session(session, now).await,
            None => self.cache.evict_session(session_id).await,
        }
        Ok(touched)
    }

    /// Look a session up, cache first
    pub async fn get(&self, session_id: Uuid) -> AuthResult<Option<Session>> {
        if let Some(session) = self.cache.get_session(session_id).await {
            return Ok(Some(session));
        }

        let found = self.repo.find_by_id(session_id).await?;
        if let Some(session) = found.as_ref().filter(|s| s.is_live(Utc::now())) {
            self.cache.put_session(session, Utc::now()).await;
        }
        Ok(found)
    }

    /// Live sessions of a user, most recently active first
    pub async fn list_active(&self, user_id: Uuid) -> AuthResult<Vec<Session>> {
        let now = Utc::now();
        let version = self.cache.version(user_id).await;

        if let Some(version) = version {
            if let Some(cached) = self.cache.get_list(user_id, version).await {
                return Ok(cached.into_iter().filter(|s| s.is_live(now)).collect());
            }
        }

        let sessions = self.repo.list_active(user_id, now).await?;
        if let Some(version) = version {
            self.cache.put_list(user_id, version, &sessions).await;
        }
        Ok(sessions)
    }

    /// Number of live sessions, always read from the system of record
    pub async fn count_active(&self, user_id: Uuid) -> AuthResult<u64> {
        Ok(self.repo.count_active(user_id, Utc::now()).await?)
    }

    /// End the user's least-active live session
    ///
    /// Picks the smallest `last_activity_at`, then the smallest `created_at`,
    /// then the smallest id. Returns the ended session id, if any.
    pub async fn end_least_active(&self, user_id: Uuid) -> AuthResult<Option<Uuid>> {
        self.end_least_active_except(user_id, None).await
    }

    async fn end_least_active_except(
        &self,
        user_id: Uuid,
        keep: Option<Uuid>,
    ) -> AuthResult<Option<Uuid>> {
        for _ in 0..SETTLE_ATTEMPTS {
            let candidates = self.repo.list_active(user_id, Utc::now()).await?;
            let Some(victim) = candidates
                .into_iter()
                .filter(|s| Some(s.id) != keep)
                .min_by(least_active_first)
            else {
                return Ok(None);
            };

            if self.repo.deactivate(victim.id).await? {
                self.after_state_change(user_id, &[victim.id]).await;
                info!(user_id = %user_id, session_id = %victim.id, "Least active session ended");
                return Ok(Some(victim.id));
            }
            debug!(session_id = %victim.id, "Session ended concurrently, picking again");
        }
        warn!(user_id = %user_id, "Gave up ending least active session after repeated races");
        Ok(None)
    }

    /// End one session. Returns false if it was already inactive.
    pub async fn end(&self, session: &Session) -> AuthResult<bool> {
        let ended = self.repo.deactivate(session.id).await?;
        self.after_state_change(session.user_id, &[session.id]).await;
        if ended {
            info!(user_id = %session.user_id, session_id = %session.id, "Session ended");
        }
        Ok(ended)
    }

    /// End every live session of a user
    pub async fn end_all(&self, user_id: Uuid) -> AuthResult<u64> {
        let live = self.repo.list_active(user_id, Utc::now()).await?;
        let ended = self.repo.deactivate_all(user_id).await?;
        let ids: Vec<Uuid> = live.iter().map(|s| s.id).collect();
        self.after_state_change(user_id, &ids).await;
        info!(user_id = %user_id, ended, "All sessions ended");
        Ok(ended)
    }

    /// End every live session of a user except `keep`
    pub async fn end_all_except(&self, user_id: Uuid, keep: Uuid) -> AuthResult<u64> {
        let live = self.repo.list_active(user_id, Utc::now()).await?;
        let mut ended_ids = Vec::new();
        for session in live.iter().filter(|s| s.id != keep) {
            if self.repo.deactivate(session.id).await? {
                ended_ids.push(session.id);
            }
        }
        self.after_state_change(user_id, &ended_ids).await;
        Ok(ended_ids.len() as u64)
    }

    /// Persist mutated fields of a session. An ended session is never revived.
    pub async fn update(&self, session: &Session) -> AuthResult<bool> {
        let written = self.repo.update(session).await?;
        self.after_state_change(session.user_id, &[session.id]).await;
        Ok(written)
    }

    /// Delete every session record of a user
    pub async fn purge_user(&self, user_id: Uuid) -> AuthResult<u64> {
        let deleted = self.repo.delete_for_user(user_id).await?;
        self.cache.invalidate_user(user_id).await;
        Ok(deleted)
    }

    /// Drop expired cache entries and expired records
    ///
    /// Returns `(cache_entries_removed, records_removed)`.
    pub async fn sweep_expired(&self) -> AuthResult<(usize, u64)> {
        let now = Utc::now();
        let cached = self.cache.sweep_expired(now).await;
        let records = self.repo.delete_expired(now).await?;
        Ok((cached, records))
    }

    async fn after_state_change(&self, user_id: Uuid, session_ids: &[Uuid]) {
        for id in session_ids {
            self.cache.evict_session(*id).await;
        }
        self.cache.invalidate_user(user_id).await;
    }
}

fn least_active_first(a: &Session, b: &Session) -> Ordering {
    a.last_activity_at
        .cmp(&b.last_activity_at)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

/// Whether `session` is live and belongs to `user_id`
pub fn owned_and_live(session: &Session, user_id: Uuid, now: DateTime<Utc>) -> bool {
    session.user_id == user_id && session.is_live(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NoopGeoLocator;
    use tonotes_db::mock::MemorySessionRepo;
    use tonotes_db::MemoryStore;

    fn registry() -> (SessionRegistry, Arc<MemorySessionRepo>) {
        let repo = Arc::new(MemorySessionRepo::new());
        let store = Arc::new(MemoryStore::new());
        let config = SessionConfig::default();
        let registry = SessionRegistry::new(
            repo.clone(),
            SessionCache::new(store, config.cache_ttl),
            Arc::new(NoopGeoLocator),
            config,
        );
        (registry, repo)
    }

    fn meta(agent: &str) -> RequestMeta {
        RequestMeta {
            user_agent: agent.to_string(),
            ip: Some("192.168.1.20".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_sets_fields() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();

        let created = registry.create(user_id, &meta("curl/8.0")).await.unwrap();
        let s = &created.session;

        assert!(created.evicted.is_none());
        assert!(s.active);
        assert_eq!(s.created_at, s.last_activity_at);
        assert_eq!(s.expires_at - s.created_at, Duration::hours(24));
        assert_eq!(s.location, "Local Network");
        assert_eq!(s.device.device_type, tonotes_db::DeviceType::Api);
    }

    #[tokio::test]
    async fn test_cap_evicts_least_active() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();

        let mut ids = Vec::new();
        for i in 0..5 {
            let created = registry.create(user_id, &meta(&format!("device-{i}"))).await.unwrap();
            assert!(created.evicted.is_none());
            ids.push(created.session.id);
        }
        // Activity everywhere but the second session makes it the least active
        for id in ids.iter().filter(|id| **id != ids[1]) {
            registry.touch(*id).await.unwrap().unwrap();
        }

        let sixth = registry.create(user_id, &meta("device-5")).await.unwrap();
        assert_eq!(sixth.evicted, Some(ids[1]));
        assert_eq!(registry.count_active(user_id).await.unwrap(), 5);
        assert!(!registry.get(ids[1]).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_concurrent_logins_respect_cap() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.create(user_id, &meta(&format!("d{i}"))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(registry.count_active(user_id).await.unwrap() <= 5);
    }

    #[tokio::test]
    async fn test_touch_is_monotonic() {
        let (registry, _) = registry();
        let created = registry.create(Uuid::new_v4(), &meta("ua")).await.unwrap();

        let first = registry.touch(created.session.id).await.unwrap().unwrap();
        let second = registry.touch(created.session.id).await.unwrap().unwrap();
        assert!(second.last_activity_at >= first.last_activity_at);
        assert!(first.last_activity_at >= created.session.last_activity_at);
    }

    #[tokio::test]
    async fn test_get_after_touch_sees_new_activity() {
        let (registry, _) = registry();
        let created = registry.create(Uuid::new_v4(), &meta("ua")).await.unwrap();
        // create left the session in the cache
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let touched = registry.touch(created.session.id).await.unwrap().unwrap();
        assert!(touched.last_activity_at > created.session.last_activity_at);

        let fetched = registry.get(created.session.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_activity_at, touched.last_activity_at);
    }

    #[tokio::test]
    async fn test_end_makes_touch_a_noop() {
        let (registry, _) = registry();
        let created = registry.create(Uuid::new_v4(), &meta("ua")).await.unwrap();

        assert!(registry.end(&created.session).await.unwrap());
        assert!(!registry.end(&created.session).await.unwrap());
        assert!(registry.touch(created.session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_reflects_changes_through_cache() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();
        let a = registry.create(user_id, &meta("a")).await.unwrap().session;
        let b = registry.create(user_id, &meta("b")).await.unwrap().session;

        assert_eq!(registry.list_active(user_id).await.unwrap().len(), 2);
        // Served from cache now; ending a session must not leave it listed
        registry.end(&a).await.unwrap();
        let listed = registry.list_active(user_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, b.id);
    }

    #[tokio::test]
    async fn test_update_never_reactivates() {
        let (registry, _) = registry();
        let created = registry.create(Uuid::new_v4(), &meta("ua")).await.unwrap();
        registry.end(&created.session).await.unwrap();

        assert!(!registry.update(&created.session).await.unwrap());
        assert!(!registry.get(created.session.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_end_all_except_keeps_current() {
        let (registry, _) = registry();
        let user_id = Uuid::new_v4();
        let keep = registry.create(user_id, &meta("a")).await.unwrap().session;
        registry.create(user_id, &meta("b")).await.unwrap();
        registry.create(user_id, &meta("c")).await.unwrap();

        assert_eq!(registry.end_all_except(user_id, keep.id).await.unwrap(), 2);
        let listed = registry.list_active(user_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);
    }

    #[test]
    fn test_least_active_tie_breaks() {
        let now = Utc::now();
        let base = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::hours(1),
            last_activity_at: now,
            device: Default::default(),
            ip: String::new(),
            location: String::new(),
            active: true,
        };
        let mut older_created = base.clone();
        older_created.id = Uuid::new_v4();
        older_created.created_at = now - Duration::minutes(1);

        assert_eq!(least_active_first(&older_created, &base), Ordering::Less);

        let mut more_active = older_created.clone();
        more_active.last_activity_at = now + Duration::seconds(1);
        assert_eq!(least_active_first(&base, &more_active), Ordering::Less);
    }
}
