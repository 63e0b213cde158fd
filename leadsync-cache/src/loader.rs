//! Read-through loader combining the response cache with request coalescing.
//!
//! This is the path every cached read takes: a live cache entry is returned
//! directly, a miss joins or starts the single in-flight fetch for the key,
//! and a successful fetch populates the cache before any caller sees it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::coalescer::RequestCoalescer;
use crate::response_cache::{Invalidation, ResponseCache};

/// Read-through cache over a [`ResponseCache`] and a [`RequestCoalescer`].
///
/// A fetch that is still running when its key is invalidated is allowed to
/// finish and populate the cache; only its registration is dropped so that
/// new callers start a fresh fetch.
pub struct CachedLoader<V, E> {
    cache: Arc<ResponseCache<V>>,
    coalescer: RequestCoalescer<V, E>,
}

impl<V, E> CachedLoader<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(cache: Arc<ResponseCache<V>>) -> Self {
        Self {
            cache,
            coalescer: RequestCoalescer::new(),
        }
    }

    pub fn cache(&self) -> &ResponseCache<V> {
        &self.cache
    }

    pub fn coalescer(&self) -> &RequestCoalescer<V, E> {
        &self.coalescer
    }

    /// Cached value for `key`, fetching through `producer` on a miss.
    pub async fn load<F, Fut>(&self, key: &str, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.load_with_ttl(key, None, producer).await
    }

    /// Like [`load`](Self::load) with an explicit TTL for the stored entry.
    pub async fn load_with_ttl<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(key) {
            return Ok(value);
        }

        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();
        self.coalescer
            .dedupe(key, move || {
                let fetch = producer();
                async move {
                    let value = fetch.await?;
                    cache.set(&owned_key, value.clone(), ttl);
                    Ok(value)
                }
            })
            .await
    }

    /// Drop matching cache entries and in-flight registrations.
    pub fn invalidate(&self, target: &Invalidation) -> usize {
        let removed = self.cache.invalidate(target);
        let forgotten = self.coalescer.forget_where(|key| target.matches(key));
        if forgotten > 0 {
            debug!(invalidation = ?target, forgotten, "Dropped in-flight registrations");
        }
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
}

impl<V, E> Clone for CachedLoader<V, E> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            coalescer: self.coalescer.clone(),
        }
    }
}
