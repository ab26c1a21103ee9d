//! Key-value cache backing the session store
//!
//! The session store only needs three operations from its backing cache:
//! `set` with a time-to-live, `get`, and an idempotent `del`. They are
//! expressed as the [`KeyValueCache`] trait so the store can run against
//! any low-latency cache.
//!
//! [`MokaCache`] is the bundled implementation: a concurrent, async-aware
//! in-process cache (moka) with per-entry expiration. Expired entries are
//! never returned, so a record is either present-and-valid or absent.
//! The cache has no size bound: an entry leaves only through `del` or its
//! own TTL, never through capacity eviction.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Cache backend errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Invalid time-to-live: {0:?}")]
    InvalidTtl(Duration),

    #[error("Cache call timed out after {0:?}")]
    Timeout(Duration),
}

/// Minimal key-value contract with per-key time-to-live
///
/// TTL granularity is at least one second for remote backends; no ordering
/// is guaranteed across keys.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Read `key`. A miss (absent or expired) is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct CacheEntry {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

/// Expire each entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process TTL cache backed by moka
#[derive(Clone)]
pub struct MokaCache {
    cache: Cache<String, CacheEntry>,
    stats: Arc<CacheStats>,
}

impl MokaCache {
    /// Create an unbounded cache with per-entry TTL
    pub fn new() -> Self {
        let cache = Cache::builder()
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::new("session")),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current cache size (may lag behind pending writes)
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCache for MokaCache {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl(ttl));
        }

        let entry = CacheEntry {
            bytes: value.into(),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        self.stats.record_write();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let result = self.cache.get(key).await;

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        Ok(result.map(|entry| entry.bytes.to_vec()))
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        self.stats.record_invalidation();
        Ok(())
    }
}

/// Cache statistics tracker
#[derive(Debug)]
pub struct CacheStats {
    /// Cache name for identification
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cache name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let cache = MokaCache::new();

        assert_eq!(cache.get("session_a").await.unwrap(), None);
        assert_eq!(cache.stats().misses(), 1);

        cache
            .set("session_a", b"payload".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("session_a").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().writes(), 1);

        cache.del("session_a").await.unwrap();
        assert_eq!(cache.get("session_a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_del_absent_key_is_ok() {
        let cache = MokaCache::new();
        assert!(cache.del("never-written").await.is_ok());
        assert!(cache.del("never-written").await.is_ok());
        assert_eq!(cache.stats().invalidations(), 2);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = MokaCache::new();

        cache
            .set("short", b"x".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        cache
            .set("long", b"y".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap(), Some(b"y".to_vec()));
    }

    #[tokio::test]
    async fn test_live_entries_survive_heavy_write_load() {
        let cache = MokaCache::new();
        let ttl = Duration::from_secs(3600);

        for i in 0..3000 {
            cache
                .set(&format!("session_{i}"), i.to_string().into_bytes(), ttl)
                .await
                .unwrap();
        }
        cache.cache.run_pending_tasks().await;

        for i in 0..3000 {
            let value = cache.get(&format!("session_{i}")).await.unwrap();
            assert_eq!(value, Some(i.to_string().into_bytes()), "session_{i} was evicted");
        }
        assert_eq!(cache.entry_count(), 3000);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let cache = MokaCache::new();
        let result = cache.set("k", b"v".to_vec(), Duration::ZERO).await;
        assert!(matches!(result, Err(CacheError::InvalidTtl(_))));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new("test");
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_miss();
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.name(), "test");
    }
}
