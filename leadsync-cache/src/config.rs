//! Cache configuration and the key-pattern TTL table.

use leadsync_core::keys;
use std::time::Duration;

/// One row of the TTL table: keys containing `pattern` live for `ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlRule {
    pub pattern: String,
    pub ttl: Duration,
}

impl TtlRule {
    pub fn new(pattern: impl Into<String>, ttl: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            ttl,
        }
    }
}

/// Ordered key-pattern to TTL table. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    rules: Vec<TtlRule>,
    default_ttl: Duration,
}

impl TtlPolicy {
    pub fn new(rules: Vec<TtlRule>, default_ttl: Duration) -> Self {
        Self { rules, default_ttl }
    }

    /// TTL for `key`: first rule whose pattern the key contains, else the default.
    pub fn ttl_for(&self, key: &str) -> Duration {
        self.rules
            .iter()
            .find(|rule| key.contains(rule.pattern.as_str()))
            .map(|rule| rule.ttl)
            .unwrap_or(self.default_ttl)
    }

    pub fn rules(&self) -> &[TtlRule] {
        &self.rules
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                TtlRule::new(keys::DASHBOARD_DATA, Duration::from_secs(120)),
                TtlRule::new("stats", Duration::from_secs(120)),
                TtlRule::new(keys::SUBMISSION_DETAIL_PREFIX, Duration::from_secs(300)),
                TtlRule::new(keys::SUBMISSIONS_GROUP, Duration::from_secs(60)),
            ],
            default_ttl: Duration::from_secs(300),
        }
    }
}

/// Configuration for the response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry count ceiling; inserting past it triggers eviction.
    pub max_entries: usize,
    /// Access timestamps closer than this are considered ties during
    /// eviction and ranked by access count instead.
    pub eviction_tolerance: Duration,
    /// Key-pattern TTL table.
    pub ttl_policy: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            eviction_tolerance: Duration::from_secs(60),
            ttl_policy: TtlPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry ceiling.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the eviction tie-break tolerance.
    pub fn with_eviction_tolerance(mut self, tolerance: Duration) -> Self {
        self.eviction_tolerance = tolerance;
        self
    }

    /// Replace the TTL table.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }
}
