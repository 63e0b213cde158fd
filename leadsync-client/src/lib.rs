//! leadsync client - admin dashboard synchronization.
//!
//! Wires the cached read path from `leadsync-cache` to a live notification
//! feed:
//! - [`HttpSessionGateway`]: authenticated requests with refresh-and-retry on `401`
//! - [`NotificationChannel`]: push transport with backoff, polling fallback
//! - [`SyncCoordinator`]: throttled refresh and event-driven invalidation
//! - [`AdminApp`]: one of each per operator session

pub mod admin;
pub mod app;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod session;
pub mod telemetry;
pub mod ws;

pub use admin::{AdminApi, DataLoader, SubmissionPage};
pub use app::AdminApp;
pub use channel::{backoff_delay, ChannelConfig, ChannelMode, NotificationChannel};
pub use config::{ClientConfig, ConfigError};
pub use coordinator::{SyncConfig, SyncCoordinator, SyncUpdate};
pub use error::{ClientError, ClientResult};
pub use session::HttpSessionGateway;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use ws::WsPushTransport;
