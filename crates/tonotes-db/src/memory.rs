//! In-process key/value store
//!
//! Used when no Redis URL is configured and by tests. Expiry is checked on
//! every read, and each insertion schedules a one-shot cleanup so expired
//! entries do not pile up.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::KeyValueStore;
use crate::DbResult;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// HashMap-backed [`KeyValueStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including expired ones not yet cleaned up
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn schedule_cleanup(&self, key: String, ttl: Duration) {
        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let now = Instant::now();
            let mut map = entries.write();
            // The key may have been rewritten with a later expiry meanwhile
            if map.get(&key).map_or(false, |entry| !entry.is_live(now)) {
                map.remove(&key);
            }
        });
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Some(Instant::now() + ttl),
        };
        self.entries.write().insert(key.to_string(), entry);
        self.schedule_cleanup(key.to_string(), ttl);
        Ok(())
    }

    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .remove(key)
            .map_or(false, |entry| entry.is_live(now)))
    }

    async fn exists_any(&self, keys: &[&str]) -> DbResult<bool> {
        let now = Instant::now();
        let map = self.entries.read();
        Ok(keys
            .iter()
            .any(|key| map.get(*key).map_or(false, |entry| entry.is_live(now))))
    }

    async fn incr(&self, key: &str) -> DbResult<i64> {
        let now = Instant::now();
        let mut map = self.entries.write();
        let current = map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        map.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn close(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_millis(500)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_millis(501)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists_any(&["k"]).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_removes_entry() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_survives_earlier_cleanup() {
        let store = MemoryStore::new();
        store.set_ex("k", "old", Duration::from_secs(1)).await.unwrap();
        store.set_ex("k", "new", Duration::from_secs(10)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_exists_any_and_delete() {
        let store = MemoryStore::new();
        store.set_ex("a", "1", Duration::from_secs(60)).await.unwrap();

        assert!(store.exists_any(&["missing", "a"]).await.unwrap());
        assert!(!store.exists_any(&[]).await.unwrap());
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_and_scan() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("session:version:u1").await.unwrap(), 1);
        assert_eq!(store.incr("session:version:u1").await.unwrap(), 2);

        store.set_ex("session:s1", "{}", Duration::from_secs(60)).await.unwrap();
        let mut keys = store.scan_prefix("session:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session:s1", "session:version:u1"]);
    }
}
