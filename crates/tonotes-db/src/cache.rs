//! Key/value store for revocation markers and the session cache

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Pool as RedisPool;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::{DbError, DbResult};

/// Cache key prefixes
pub mod keys {
    /// `session:<id>` holds one serialized session
    pub const SESSION: &str = "session:";
    /// `session:user:<user_id>` holds the cached active list of a user
    pub const SESSION_USER: &str = "session:user:";
    /// `session:version:<user_id>` is bumped on every state change
    pub const SESSION_VERSION: &str = "session:version:";
    pub const REVOKED_ACCESS: &str = "blacklist:access:";
    pub const REVOKED_REFRESH: &str = "blacklist:refresh:";
}

/// Minimal string store with per-key expiry
///
/// Values are opaque strings; use [`set_json`] / [`get_json`] for typed data.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl` (millisecond precision)
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()>;

    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Returns true if a live key was removed
    async fn delete(&self, key: &str) -> DbResult<bool>;

    /// True if at least one of `keys` is present
    async fn exists_any(&self, keys: &[&str]) -> DbResult<bool>;

    /// Increment an integer counter, creating it at 0 first. Counters never expire.
    async fn incr(&self, key: &str) -> DbResult<i64>;

    /// Live keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<String>>;

    async fn ping(&self) -> DbResult<()>;

    /// Release connections. Further calls may fail.
    async fn close(&self);
}

/// Serialize `value` as JSON and store it
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> DbResult<()> {
    let json = serde_json::to_string(value)?;
    store.set_ex(key, &json, ttl).await
}

/// Load and deserialize a JSON value
pub async fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> DbResult<Option<T>> {
    match store.get(key).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Redis-backed store
pub struct RedisStore {
    pool: RedisPool,
}

impl RedisStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        // Redis rejects PX 0
        let millis = ttl.as_millis().max(1) as u64;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        let mut conn = self.pool.get().await?;
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn exists_any(&self, keys: &[&str]) -> DbResult<bool> {
        if keys.is_empty() {
            return Ok(false);
        }
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.exists(*key);
        }
        let found: Vec<bool> = pipe.query_async(&mut conn).await?;
        Ok(found.into_iter().any(|hit| hit))
    }

    async fn incr(&self, key: &str) -> DbResult<i64> {
        let mut conn = self.pool.get().await?;
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(found)
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DbError::Connection(format!("Redis ping: {}", e)))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
