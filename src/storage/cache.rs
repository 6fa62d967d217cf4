// src/storage/cache.rs
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory key/value cache with per-entry TTL
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone + Send + Sync> CacheStore<V> {
    pub fn new(default_ttl: Duration) -> Self {
        log::info!("CacheStore initialized with TTL={}s", default_ttl.as_secs());
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Live value for `key`; an expired entry is evicted and reported as a miss
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    log::debug!("Cache hit for key '{}'", key);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Another writer may have refreshed the entry in between
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            log::debug!("Cache key '{}' expired", key);
        }
        None
    }

    /// Store `value`; `ttl` of `None` uses the default, zero expires immediately
    pub async fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        log::debug!("Cached key '{}' with TTL={}s", key, ttl.as_secs());
    }

    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            log::debug!("Deleted cache key '{}'", key);
        }
        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
        log::info!("Cache cleared");
    }

    /// Drop every expired entry; returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Cleaned up {} expired cache entries", removed);
        }
        removed
    }

    /// Number of stored entries, expired ones included until swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
