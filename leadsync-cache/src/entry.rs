//! Cache entries and usage statistics.

use std::time::Duration;
use tokio::time::Instant;

/// A cached value with its expiry and access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    /// Reads served from this entry. Only used for eviction ranking.
    pub access_count: u64,
    /// Last read (or insertion) time. Only used for eviction ranking.
    pub last_accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(key: impl Into<String>, value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
        }
    }

    /// Expired strictly after `created_at + ttl`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including reads of expired entries).
    pub misses: u64,
    /// Entries purged because they were read after their TTL.
    pub expirations: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Entries removed by explicit invalidation.
    pub invalidations: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
