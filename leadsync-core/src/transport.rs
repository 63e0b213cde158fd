//! Push transport abstraction.
//!
//! A push transport opens a long-lived connection carrying the last known
//! heartbeat cursor and yields raw text payloads until the peer closes. An
//! environment without push support simply has no transport instance; the
//! notification channel then goes straight to polling.

use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

/// Stream of raw payloads from an open push connection.
///
/// Each item is one transport frame; it may hold several newline-delimited
/// records. The stream ending means the connection closed.
pub type PushStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a connection resuming from `cursor`.
    async fn connect(&self, cursor: Option<DateTime<Utc>>) -> Result<PushStream, TransportError>;
}
