//! Advisory session cache in the key/value store
//!
//! Single sessions live under `session:<id>` until they expire. Per-user
//! active lists live under `session:user:<user_id>` for the configured TTL,
//! tagged with the per-user version counter read *before* the system of
//! record was queried. Every state change bumps the counter, so a list
//! tagged with an older version is stale and ignored.
//!
//! All failures degrade to a cache miss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tonotes_db::cache::{get_json, keys, set_json};
use tonotes_db::{KeyValueStore, Session};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct CachedList {
    version: i64,
    sessions: Vec<Session>,
}

#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
    list_ttl: Duration,
}

impl SessionCache {
    pub fn new(store: Arc<dyn KeyValueStore>, list_ttl: Duration) -> Self {
        Self { store, list_ttl }
    }

    fn session_key(id: Uuid) -> String {
        format!("{}{}", keys::SESSION, id)
    }

    fn list_key(user_id: Uuid) -> String {
        format!("{}{}", keys::SESSION_USER, user_id)
    }

    fn version_key(user_id: Uuid) -> String {
        format!("{}{}", keys::SESSION_VERSION, user_id)
    }

    pub async fn get_session(&self, id: Uuid) -> Option<Session> {
        match get_json::<Session>(self.store.as_ref(), &Self::session_key(id)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Session cache read failed");
                None
            }
        }
    }

    /// Cache a session until its own expiry
    pub async fn put_session(&self, session: &Session, now: DateTime<Utc>) {
        let Ok(ttl) = (session.expires_at - now).to_std() else {
            return;
        };
        if ttl.is_zero() {
            return;
        }
        if let Err(e) = set_json(self.store.as_ref(), &Self::session_key(session.id), session, ttl).await {
            warn!(session_id = %session.id, error = %e, "Session cache write failed");
        }
    }

    pub async fn evict_session(&self, id: Uuid) {
        if let Err(e) = self.store.delete(&Self::session_key(id)).await {
            warn!(session_id = %id, error = %e, "Session cache evict failed");
        }
    }

    /// Current per-user version; `None` when the store is unreachable
    pub async fn version(&self, user_id: Uuid) -> Option<i64> {
        match self.store.get(&Self::version_key(user_id)).await {
            Ok(raw) => Some(raw.and_then(|v| v.parse().ok()).unwrap_or(0)),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Session cache version read failed");
                None
            }
        }
    }

    /// Cached active list, if it was written at `version` or later
    pub async fn get_list(&self, user_id: Uuid, version: i64) -> Option<Vec<Session>> {
        match get_json::<CachedList>(self.store.as_ref(), &Self::list_key(user_id)).await {
            Ok(Some(cached)) if cached.version >= version => Some(cached.sessions),
            Ok(Some(cached)) => {
                debug!(user_id = %user_id, cached = cached.version, current = version, "Stale session list");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Session cache read failed");
                None
            }
        }
    }

    pub async fn put_list(&self, user_id: Uuid, version: i64, sessions: &[Session]) {
        let cached = CachedList {
            version,
            sessions: sessions.to_vec(),
        };
        if let Err(e) = set_json(self.store.as_ref(), &Self::list_key(user_id), &cached, self.list_ttl).await {
            warn!(user_id = %user_id, error = %e, "Session cache write failed");
        }
    }

    /// Mark every cached view of the user's sessions stale
    pub async fn invalidate_user(&self, user_id: Uuid) {
        if let Err(e) = self.store.incr(&Self::version_key(user_id)).await {
            warn!(user_id = %user_id, error = %e, "Session cache version bump failed");
        }
        if let Err(e) = self.store.delete(&Self::list_key(user_id)).await {
            warn!(user_id = %user_id, error = %e, "Session cache evict failed");
        }
    }

    /// Remove cached sessions whose `expires_at` has passed or that no longer parse
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let found = match self.store.scan_prefix(keys::SESSION).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Session cache scan failed");
                return 0;
            }
        };

        let mut removed = 0;
        for key in found {
            if key.starts_with(keys::SESSION_USER) || key.starts_with(keys::SESSION_VERSION) {
                continue;
            }
            let expired = match get_json::<Session>(self.store.as_ref(), &key).await {
                Ok(Some(session)) => session.expires_at <= now,
                Ok(None) => false,
                Err(_) => true,
            };
            if expired && self.store.delete(&key).await.unwrap_or(false) {
                removed += 1;
            }
        }
        removed
    }
}
