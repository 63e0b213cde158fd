//! In-flight request de-duplication.
//!
//! At most one fetch per key is in flight. A caller asking for a key that is
//! already being fetched joins the existing shared future and observes the
//! same success or the same error as the caller that started it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A registered in-flight fetch.
struct InFlightRequest<V, E> {
    /// Registration id; a settling fetch only removes its own registration.
    id: u64,
    future: SharedFetch<V, E>,
}

type Registry<V, E> = Arc<Mutex<HashMap<String, InFlightRequest<V, E>>>>;

/// Shares one in-flight future per key among concurrent callers.
pub struct RequestCoalescer<V, E> {
    in_flight: Registry<V, E>,
    next_id: Arc<AtomicU64>,
}

impl<V, E> RequestCoalescer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `producer` for `key` unless a fetch for `key` is already in flight,
    /// in which case wait for that one instead.
    ///
    /// The registration is dropped as soon as the fetch settles, whatever the
    /// outcome, so a failed fetch can be retried by the next caller. The fetch
    /// is driven on its own task: it completes even if every caller goes away.
    ///
    /// `producer` is called synchronously while the registry is locked and
    /// must not re-enter the coalescer before returning its future.
    pub async fn dedupe<F, Fut>(&self, key: &str, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let future = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(existing) => {
                    debug!(key, "Joining in-flight request");
                    existing.future.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = self.register(key, id, producer());
                    in_flight.insert(
                        key.to_string(),
                        InFlightRequest {
                            id,
                            future: future.clone(),
                        },
                    );
                    tokio::spawn(future.clone().map(|_| ()));
                    future
                }
            }
        };

        future.await
    }

    fn register<Fut>(&self, key: &str, id: u64, fetch: Fut) -> SharedFetch<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let registry = Arc::clone(&self.in_flight);
        let key = key.to_string();
        async move {
            let result = fetch.await;
            let mut in_flight = lock(&registry);
            if in_flight.get(&key).is_some_and(|entry| entry.id == id) {
                in_flight.remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Whether a fetch for `key` is currently registered.
    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Forget registrations whose key satisfies `predicate`.
    ///
    /// Forgotten fetches still run to completion and their current callers
    /// still get the result; new callers start a fresh fetch.
    pub fn forget_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut in_flight = lock(&self.in_flight);
        let before = in_flight.len();
        in_flight.retain(|key, _| !predicate(key));
        before - in_flight.len()
    }

    pub fn clear(&self) -> usize {
        self.forget_where(|_| true)
    }
}

impl<V, E> Default for RequestCoalescer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> Clone for RequestCoalescer<V, E> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Arc::clone(&self.in_flight),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

fn lock<V, E>(registry: &Registry<V, E>) -> MutexGuard<'_, HashMap<String, InFlightRequest<V, E>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Coalescer = RequestCoalescer<String, String>;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let first = {
            let calls = Arc::clone(&calls);
            coalescer.dedupe("submissions:page=1", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = rx.await;
                Ok("page-1".to_string())
            })
        };
        let second = {
            let calls = Arc::clone(&calls);
            coalescer.dedupe("submissions:page=1", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("duplicate".to_string())
            })
        };

        let release = async {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        };
        let (a, b, ()) = tokio::join!(first, second, release);

        assert_eq!(a, Ok("page-1".to_string()));
        assert_eq!(b, Ok("page-1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_joiners_observe_the_same_error_and_retry_is_possible() {
        let coalescer = Coalescer::new();
        let (tx, rx) = oneshot::channel::<()>();

        let first = coalescer.dedupe("k", move || async move {
            let _ = rx.await;
            Err("boom".to_string())
        });
        let second = coalescer.dedupe("k", || async { Ok("never".to_string()) });
        let release = async {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        };
        let (a, b, ()) = tokio::join!(first, second, release);

        assert_eq!(a, Err("boom".to_string()));
        assert_eq!(b, Err("boom".to_string()));
        assert!(!coalescer.is_in_flight("k"));

        let retry = coalescer.dedupe("k", || async { Ok("ok".to_string()) }).await;
        assert_eq!(retry, Ok("ok".to_string()));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let coalescer = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let make = |value: &'static str| {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value.to_string())
            }
        };
        let (a, b) = tokio::join!(coalescer.dedupe("a", make("a")), coalescer.dedupe("b", make("b")));
        assert_eq!(a, Ok("a".to_string()));
        assert_eq!(b, Ok("b".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forgotten_fetch_does_not_remove_newer_registration() {
        let coalescer = Coalescer::new();
        let (old_tx, old_rx) = oneshot::channel::<()>();
        let (new_tx, new_rx) = oneshot::channel::<()>();

        let old = tokio::spawn({
            let coalescer = coalescer.clone();
            async move {
                coalescer
                    .dedupe("k", move || async move {
                        let _ = old_rx.await;
                        Ok("old".to_string())
                    })
                    .await
            }
        });
        tokio::task::yield_now().await;
        assert!(coalescer.is_in_flight("k"));

        assert_eq!(coalescer.forget_where(|key| key == "k"), 1);
        let new = tokio::spawn({
            let coalescer = coalescer.clone();
            async move {
                coalescer
                    .dedupe("k", move || async move {
                        let _ = new_rx.await;
                        Ok("new".to_string())
                    })
                    .await
            }
        });
        tokio::task::yield_now().await;

        let _ = old_tx.send(());
        assert_eq!(old.await.unwrap(), Ok("old".to_string()));
        // the old fetch settled but the new registration is still in place
        assert!(coalescer.is_in_flight("k"));

        let _ = new_tx.send(());
        assert_eq!(new.await.unwrap(), Ok("new".to_string()));
        assert!(!coalescer.is_in_flight("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_completes_after_caller_is_dropped() {
        let coalescer = Coalescer::new();
        let done = Arc::new(AtomicUsize::new(0));

        let caller = {
            let done = Arc::clone(&done);
            coalescer.dedupe("k", move || async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok("v".to_string())
            })
        };
        // start the fetch, then abandon the caller
        let _ = tokio::time::timeout(Duration::from_millis(10), caller).await;
        assert_eq!(done.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(!coalescer.is_in_flight("k"));
    }
}
