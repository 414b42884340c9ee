//! Short-lived parse result cache.
//!
//! Parsing is a pure function of the URL plus the live remote page, so
//! results are safe to reuse within a short window. Keyed by normalized URL,
//! TTL + LRU bounded via moka. Scoped to its owner; never a process-global.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config;
use crate::media::MediaItem;

/// Cached value: the media items derived from one successful parse.
pub type CachedItems = Arc<Vec<MediaItem>>;

/// TTL + LRU bounded cache of parse results, keyed by normalized link.
pub struct ParseCache {
    cache: Cache<String, CachedItems>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(config::parse::CACHE_TTL_SECS),
            config::parse::CACHE_CAPACITY,
        )
    }
}

impl ParseCache {
    /// Creates a cache with the given TTL and entry capacity.
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Returns the cached media list for `key` if a live entry exists.
    pub async fn get(&self, key: &str) -> Option<CachedItems> {
        match self.cache.get(key).await {
            Some(items) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(items)
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores the media list for `key`.
    pub async fn insert(&self, key: String, items: impl Into<CachedItems>) {
        self.cache.insert(key, items.into()).await;
    }

    /// Drops the entry for `key`, if any.
    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Hit/miss counters since construction.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats { hits, misses, hit_rate }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
