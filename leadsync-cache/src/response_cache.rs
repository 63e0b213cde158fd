//! In-memory response cache with per-entry TTL and bounded size.
//!
//! Expiry is lazy: an expired entry is purged by the read that finds it,
//! there is no background sweep. Size is bounded by evicting after every
//! insertion that pushes the table past `max_entries`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, CacheStats};
use crate::eviction::{select_victims, EvictionCandidate};

/// What to drop from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Exactly this key.
    Key(String),
    /// Every key containing this substring.
    Pattern(String),
    /// The whole table.
    All,
}

impl Invalidation {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }

    /// Build from the optional `(key, pattern)` pair. A key takes precedence;
    /// neither means everything.
    pub fn from_parts(key: Option<&str>, pattern: Option<&str>) -> Self {
        match (key, pattern) {
            (Some(key), _) => Self::Key(key.to_string()),
            (None, Some(pattern)) => Self::Pattern(pattern.to_string()),
            (None, None) => Self::All,
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Key(k) => k == key,
            Self::Pattern(p) => key.contains(p.as_str()),
            Self::All => true,
        }
    }
}

struct CacheTable<V> {
    entries: HashMap<String, CacheEntry<V>>,
    stats: CacheStats,
}

/// Key to value store with TTL expiry and approximate LRU eviction.
///
/// The table is only ever locked for synchronous bookkeeping, never across an
/// await point.
pub struct ResponseCache<V> {
    table: Mutex<CacheTable<V>>,
    config: CacheConfig,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            table: Mutex::new(CacheTable {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached value for `key` if present and unexpired.
    ///
    /// An expired entry is removed as a side effect. A hit bumps the entry's
    /// access count and access time.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut table = self.lock();
        let table = &mut *table;

        match table.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                table.stats.hits += 1;
                trace!(key, access_count = entry.access_count, "Cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => {}
            None => {
                table.stats.misses += 1;
                trace!(key, "Cache miss");
                return None;
            }
        }

        table.entries.remove(key);
        table.stats.misses += 1;
        table.stats.expirations += 1;
        table.stats.entry_count = table.entries.len() as u64;
        debug!(key, "Cache entry expired");
        None
    }

    /// Insert or replace `key`.
    ///
    /// The TTL is `ttl_override` when given, otherwise looked up in the
    /// key-pattern table. Returns the keys evicted to get back under the
    /// ceiling.
    ///
    /// The key just written is left out of the eviction ranking and is never
    /// evicted by its own insert. A plain lowest-score policy would pick it
    /// almost every time, since a fresh entry has no reads. When the table
    /// is already at its ceiling, an older entry is evicted instead, even one
    /// that scores higher than the new entry.
    pub fn set(&self, key: &str, value: V, ttl_override: Option<Duration>) -> Vec<String> {
        let now = Instant::now();
        let ttl = ttl_override.unwrap_or_else(|| self.config.ttl_policy.ttl_for(key));

        let mut table = self.lock();
        table
            .entries
            .insert(key.to_string(), CacheEntry::new(key, value, ttl, now));
        trace!(key, ttl_ms = ttl.as_millis() as u64, "Cache set");

        let evicted = self.evict_over_capacity(&mut table, key);
        table.stats.entry_count = table.entries.len() as u64;
        evicted
    }

    /// Drop entries matching `target`. Returns how many were removed.
    pub fn invalidate(&self, target: &Invalidation) -> usize {
        let mut table = self.lock();
        let before = table.entries.len();
        match target {
            Invalidation::Key(key) => {
                table.entries.remove(key);
            }
            Invalidation::Pattern(pattern) => {
                table.entries.retain(|key, _| !key.contains(pattern.as_str()));
            }
            Invalidation::All => table.entries.clear(),
        }
        let removed = before - table.entries.len();
        table.stats.invalidations += removed as u64;
        table.stats.entry_count = table.entries.len() as u64;
        debug!(invalidation = ?target, removed, "Cache invalidated");
        removed
    }

    pub fn invalidate_key(&self, key: &str) -> usize {
        self.invalidate(&Invalidation::key(key))
    }

    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.invalidate(&Invalidation::pattern(pattern))
    }

    pub fn clear(&self) -> usize {
        self.invalidate(&Invalidation::All)
    }

    /// Whether a live entry exists, without touching stats or bookkeeping.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Stored entry count, including expired entries not yet read.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    fn evict_over_capacity(&self, table: &mut CacheTable<V>, inserted: &str) -> Vec<String> {
        let surplus = table.entries.len().saturating_sub(self.config.max_entries);
        if surplus == 0 {
            return Vec::new();
        }

        let candidates = table
            .entries
            .values()
            .filter(|entry| entry.key != inserted)
            .map(|entry| EvictionCandidate {
                key: entry.key.clone(),
                last_accessed_at: entry.last_accessed_at,
                access_count: entry.access_count,
            })
            .collect();

        let victims = select_victims(candidates, surplus, self.config.eviction_tolerance);
        for key in &victims {
            table.entries.remove(key);
        }
        table.stats.evictions += victims.len() as u64;
        debug!(evicted = victims.len(), keys = ?victims, "Cache evicted entries");
        victims
    }

    fn lock(&self) -> MutexGuard<'_, CacheTable<V>> {
        // bookkeeping only; a panicked writer cannot leave it half-updated
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::with_defaults()
    }
}
