//! In-memory cache implementation using moka
//!
//! Uses moka's TinyLFU cache with per-entry TTLs. Suitable for development
//! and single-process deployments; production deployments use Redis so that
//! every API process sees the same cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::backend::CacheBackend;
use super::error::CacheError;
use crate::core::config::CacheConfig;

/// Cache entry with data and metadata
#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    ttl: Option<Duration>,
    created_at: Instant,
}

/// Per-entry expiry tracking for variable TTLs
struct VariableTtlExpiry;

impl Expiry<String, CacheEntry> for VariableTtlExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_read(
        &self,
        _key: &String,
        _value: &CacheEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        duration_until_expiry
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    cache: Cache<String, CacheEntry>,
}

impl InMemoryCache {
    /// Create a new in-memory cache with the given configuration
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .initial_capacity((config.max_entries as usize / 4).min(10_000))
            .expire_after(VariableTtlExpiry)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.data.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.cache
            .insert(
                key.to_string(),
                CacheEntry {
                    data: value,
                    ttl,
                    created_at: Instant::now(),
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let existed = self.cache.contains_key(key);
        self.cache.invalidate(key).await;
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.cache.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        Ok(self.cache.get(key).await.and_then(|entry| {
            let ttl = entry.ttl?;
            ttl.checked_sub(entry.created_at.elapsed())
        }))
    }

    async fn health_check(&self) -> Result<(), CacheError> {
        // In-memory backend is always healthy
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CacheBackendType;

    fn test_cache() -> InMemoryCache {
        InMemoryCache::new(&CacheConfig {
            backend: CacheBackendType::Memory,
            redis_url: None,
            max_entries: 1000,
        })
    }

    #[tokio::test]
    async fn test_get_set() {
        let cache = test_cache();
        cache.set("k1", b"v1".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = test_cache();
        cache.set("k1", b"old".to_vec(), None).await.unwrap();
        cache.set("k1", b"new".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = test_cache();
        cache.set("k1", b"v1".to_vec(), None).await.unwrap();
        assert!(cache.delete("k1").await.unwrap());
        assert!(!cache.delete("k1").await.unwrap());
        assert_eq!(cache.get("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = test_cache();
        cache
            .set("short", b"v".to_vec(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(cache.exists("short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_remaining() {
        let cache = test_cache();
        cache
            .set("k1", b"v".to_vec(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let remaining = cache.ttl("k1").await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));

        cache.set("forever", b"v".to_vec(), None).await.unwrap();
        assert_eq!(cache.ttl("forever").await.unwrap(), None);
    }
}
