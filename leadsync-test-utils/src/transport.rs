//! Scripted [`PushTransport`] for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use leadsync_core::{PushStream, PushTransport, TransportError};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Outcome of one `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectScript {
    /// Fail the connect with this error.
    Fail(TransportError),
    /// Open a connection driven through a [`PushHandle`].
    Open,
}

/// Server side of an open mock connection.
#[derive(Debug, Clone)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl PushHandle {
    /// Deliver one payload frame. Returns false if the client hung up.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        self.tx.send(Ok(payload.into())).is_ok()
    }

    /// Deliver a stream error.
    pub fn fail(&self, err: TransportError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }

    /// Whether the client side has dropped the stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Default)]
struct TransportLog {
    script: VecDeque<ConnectScript>,
    cursors: Vec<Option<DateTime<Utc>>>,
    handles: Vec<PushHandle>,
}

/// Mock push transport.
///
/// Each `connect` consumes the next scripted outcome; once the script is
/// exhausted the fallback outcome is used. Dropping every clone of a
/// connection's [`PushHandle`] ends its stream, which the client sees as a
/// close.
pub struct MockPushTransport {
    log: Mutex<TransportLog>,
    fallback: ConnectScript,
}

impl MockPushTransport {
    /// Transport whose connects succeed unless scripted otherwise.
    pub fn accepting() -> Self {
        Self::with_fallback(ConnectScript::Open)
    }

    /// Transport whose connects fail unless scripted otherwise.
    pub fn refusing() -> Self {
        Self::with_fallback(ConnectScript::Fail(TransportError::Connect(
            "connection refused".to_string(),
        )))
    }

    pub fn with_fallback(fallback: ConnectScript) -> Self {
        Self {
            log: Mutex::new(TransportLog::default()),
            fallback,
        }
    }

    /// Queue the outcome of a future connect.
    pub fn script(&self, outcome: ConnectScript) -> &Self {
        self.log.lock().unwrap().script.push_back(outcome);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.log.lock().unwrap().cursors.len()
    }

    /// Cursor passed to each connect, in order.
    pub fn cursors(&self) -> Vec<Option<DateTime<Utc>>> {
        self.log.lock().unwrap().cursors.clone()
    }

    /// Handle for the most recently opened connection.
    pub fn latest(&self) -> Option<PushHandle> {
        self.log.lock().unwrap().handles.last().cloned()
    }

    /// Drop the mock's own handles so that streams end once test-held
    /// clones are gone.
    pub fn drop_handles(&self) {
        self.log.lock().unwrap().handles.clear();
    }
}

#[async_trait]
impl PushTransport for MockPushTransport {
    async fn connect(&self, cursor: Option<DateTime<Utc>>) -> Result<PushStream, TransportError> {
        let mut log = self.log.lock().unwrap();
        log.cursors.push(cursor);
        let outcome = log.script.pop_front().unwrap_or_else(|| self.fallback.clone());

        match outcome {
            ConnectScript::Fail(err) => Err(err),
            ConnectScript::Open => {
                let (tx, rx) = mpsc::unbounded_channel();
                log.handles.push(PushHandle { tx });
                let stream = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(stream.boxed())
            }
        }
    }
}
