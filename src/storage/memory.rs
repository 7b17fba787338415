//! In-memory credential store for development and testing
//!
//! Keeps entries in a map alongside their deadline. Expired entries are
//! invisible to readers right away and are physically dropped by a periodic
//! sweep.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::traits::CredentialStore;
use crate::error::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

pub struct MemoryCredentialStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        })
    }

    /// Drop expired entries, returning how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();

        if removed > 0 {
            log::debug!("Cleaned up {} expired credential entries", removed);
        }
        removed
    }

    /// Number of stored entries, expired ones included until the next sweep
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryCredentialStore::new();

        store.put("k", "alice", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("alice".to_string()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Idempotent
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_overwrites_value_and_ttl() {
        let store = MemoryCredentialStore::new();

        store.put("k", "alice", Duration::from_millis(20)).await.unwrap();
        store.put("k", "bob", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), Some("bob".to_string()));
    }

    #[tokio::test]
    async fn test_entries_expire_without_sweep() {
        let store = MemoryCredentialStore::new();

        store.put("k", "alice", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        // Still physically present until the sweep runs
        assert_eq!(store.len().await, 1);
        assert_eq!(store.cleanup_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_task_sweeps() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.put("k", "alice", Duration::from_millis(10)).await.unwrap();

        let handle = store.clone().start_cleanup_task(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert!(store.is_empty().await);
    }
}
