//! In-process cache backend

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{CacheError, CacheStore};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// `HashMap` cache with per-entry expiry; expired entries are dropped on read
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of stored entries, expired or not
    pub async fn stored(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: remove unless a writer refreshed it meanwhile
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("TTL out of range: {:?}", ttl)))?;
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("nutrition:rice").await.unwrap(), None);

        cache.set("nutrition:rice", "{}", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("nutrition:rice").await.unwrap().as_deref(), Some("{}"));

        cache.delete("nutrition:rice").await.unwrap();
        assert_eq!(cache.get("nutrition:rice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.set("shopping:1:100:G", "a", Duration::from_millis(20)).await.unwrap();
        cache.set("shopping:2:100:G", "b", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len().await, 2);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("shopping:1:100:G").await.unwrap(), None);
        assert_eq!(cache.get("shopping:2:100:G").await.unwrap().as_deref(), Some("b"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryCache::new();
        cache.set("allergen:milk", "first", Duration::from_secs(60)).await.unwrap();
        cache.set("allergen:milk", "second", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("allergen:milk").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_millis(1)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.stored().await, 2);
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.stored().await, 1);
        assert!(!cache.is_empty().await);
    }
}
