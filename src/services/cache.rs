//! Key-value cache with TTL support
//!
//! [`Cache`] is the backend capability. [`CacheHandle`] is what services hold:
//! backend failures never reach the caller. A failed read is a miss and a
//! failed write or delete is logged and skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key-value capability with per-key expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every entry.
    async fn clear(&self) -> Result<(), CacheError>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// A cached entry with expiration time
#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL cache
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all expired entries
    pub fn cleanup_expired(&self) {
        let mut entries = self.entries.write();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Number of stored entries, expired ones included until cleanup
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read();
        Ok(entries.get(key).and_then(|entry| {
            if Instant::now() < entry.expires_at {
                Some(entry.value.clone())
            } else {
                None
            }
        }))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write();
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().clear();
        Ok(())
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Shared, failure-absorbing handle onto a cache backend.
#[derive(Clone)]
pub struct CacheHandle {
    backend: Arc<dyn Cache>,
    default_ttl: Duration,
}

impl CacheHandle {
    pub fn new(backend: Arc<dyn Cache>, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
        }
    }

    /// Handle onto a fresh in-process cache
    pub fn memory(default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCache::new()), default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as a miss");
                None
            }
        }
    }

    /// Set a value with the default TTL
    pub async fn set(&self, key: &str, value: String) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        if let Err(e) = self.backend.set(key, value, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(key, error = %e, "Cache delete failed");
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Read and decode a JSON value. Undecodable entries count as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_with_ttl(key, raw, ttl).await,
            Err(e) => warn!(key, error = %e, "Failed to encode cache entry"),
        }
    }

    /// Explicit teardown: drop every entry.
    pub async fn shutdown(&self) {
        if let Err(e) = self.backend.clear().await {
            warn!(error = %e, "Cache shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that fails every call.
    struct UnavailableCache;

    #[async_trait]
    impl Cache for UnavailableCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_cache_set_and_get() {
        let cache = CacheHandle::memory(Duration::from_secs(60));
        cache.set("key", "value".to_string()).await;
        assert_eq!(cache.get("key").await, Some("value".to_string()));

        cache.delete("key").await;
        assert_eq!(cache.get("key").await, None);
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let cache = CacheHandle::memory(Duration::from_millis(50));
        cache.set("key", "value".to_string()).await;
        assert!(cache.contains("key").await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!cache.contains("key").await);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let backend = MemoryCache::new();
        backend.set("a", "1".into(), Duration::from_millis(10)).await.unwrap();
        backend.set("b", "2".into(), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        backend.cleanup_expired();
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_absorbed() {
        let cache = CacheHandle::new(Arc::new(UnavailableCache), Duration::from_secs(60));
        cache.set("key", "value".to_string()).await;
        assert_eq!(cache.get("key").await, None);
        cache.delete("key").await;
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_json_roundtrip_and_garbage() {
        let cache = CacheHandle::memory(Duration::from_secs(60));
        cache.set_json("n", &vec![1, 2, 3], Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Vec<i32>>("n").await, Some(vec![1, 2, 3]));

        cache.set("bad", "{not json".to_string()).await;
        assert_eq!(cache.get_json::<Vec<i32>>("bad").await, None);
    }

    #[tokio::test]
    async fn test_shutdown_clears_entries() {
        let cache = CacheHandle::memory(Duration::from_secs(60));
        cache.set("key", "value".to_string()).await;
        cache.shutdown().await;
        assert!(!cache.contains("key").await);
    }
}
