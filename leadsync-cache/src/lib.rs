//! Response cache layer for the leadsync admin client.
//!
//! - [`ResponseCache`]: key to value table with per-entry TTL, lazy expiry
//!   and approximate LRU eviction with an access-frequency tie-break.
//! - [`RequestCoalescer`]: one shared in-flight future per key.
//! - [`CachedLoader`]: the read-through path combining both.
//!
//! # Example
//!
//! ```ignore
//! let loader: CachedLoader<Value, GatewayError> =
//!     CachedLoader::new(Arc::new(ResponseCache::new(CacheConfig::default())));
//!
//! // Concurrent callers for the same key share one request
//! let dashboard = loader
//!     .load(keys::DASHBOARD_DATA, || fetch_dashboard(gateway.clone()))
//!     .await?;
//!
//! // Drop every list page after a status change
//! loader.invalidate_pattern(keys::SUBMISSIONS_GROUP);
//! ```

pub mod coalescer;
pub mod config;
pub mod entry;
pub mod eviction;
pub mod loader;
pub mod response_cache;

pub use coalescer::RequestCoalescer;
pub use config::{CacheConfig, TtlPolicy, TtlRule};
pub use entry::{CacheEntry, CacheStats};
pub use loader::CachedLoader;
pub use response_cache::{Invalidation, ResponseCache};
