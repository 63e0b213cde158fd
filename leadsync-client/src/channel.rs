//! Live notification channel with push transport, backoff and poll fallback.
//!
//! ```text
//!            start()                      connect ok
//!  Closed ───────────► Connecting ─────────────────► Live
//!    ▲    (no push)        ▲  │                        │
//!    │        │    backoff │  │ failure                │ error / close
//!    │        │            └──┤◄───────────────────────┘
//!    │        ▼               │ attempts == max
//!    │     Polling ◄──────────┘
//!    │        │
//!    └────────┘ stop() (from any state)
//! ```
//!
//! Exactly one transport is active at a time. Once the reconnect ceiling is
//! reached the channel stays in `Polling` until it is stopped; only an
//! explicit `start()` tries push again.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use leadsync_core::{
    format_cursor, parse_event_stream, parse_push_payload, NotificationEvent, PushStream,
    PushTransport, RequestOptions, SessionGateway, TransportError, CURSOR_PARAM,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::admin::paths;

/// Transport state of the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    Closed,
    Connecting,
    Live,
    Polling,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Polling => "polling",
        };
        f.write_str(name)
    }
}

/// Channel tuning.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Consecutive push failures tolerated before falling back to polling.
    pub max_reconnect_attempts: u32,
    /// Upper bound for the exponential reconnect delay.
    pub backoff_cap: Duration,
    /// Interval between polls once polling.
    pub poll_interval: Duration,
    /// Gateway path of the polling endpoint.
    pub poll_path: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            backoff_cap: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            poll_path: paths::POLL.to_string(),
        }
    }
}

/// Reconnect delay after the `attempts`-th consecutive failure:
/// `min(2^attempts, cap)` seconds.
pub fn backoff_delay(attempts: u32, cap: Duration) -> Duration {
    let secs = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(cap)
}

/// State shared between the channel handle and its worker task.
struct ChannelState {
    mode: watch::Sender<ChannelMode>,
    reconnect_attempts: AtomicU32,
    cursor: Mutex<Option<DateTime<Utc>>>,
}

impl ChannelState {
    fn set_mode(&self, mode: ChannelMode) {
        let mut previous = mode;
        let changed = self.mode.send_if_modified(|current| {
            previous = std::mem::replace(current, mode);
            previous != mode
        });
        if changed {
            info!(from = %previous, to = %mode, "Notification channel mode changed");
        }
    }

    fn cursor(&self) -> Option<DateTime<Utc>> {
        *lock(&self.cursor)
    }

    fn advance_cursor(&self, timestamp: DateTime<Utc>) {
        *lock(&self.cursor) = Some(timestamp);
    }

    fn reset_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::SeqCst);
    }
}

struct RunningWorker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Maintains the live update feed and hands every event to one consumer.
pub struct NotificationChannel {
    gateway: Arc<dyn SessionGateway>,
    transport: Option<Arc<dyn PushTransport>>,
    config: ChannelConfig,
    events: mpsc::Sender<NotificationEvent>,
    state: Arc<ChannelState>,
    worker: Mutex<Option<RunningWorker>>,
}

impl NotificationChannel {
    /// Create a closed channel.
    ///
    /// `transport` is `None` when the environment has no push support; the
    /// channel then only ever polls.
    pub fn new(
        gateway: Arc<dyn SessionGateway>,
        transport: Option<Arc<dyn PushTransport>>,
        config: ChannelConfig,
        events: mpsc::Sender<NotificationEvent>,
    ) -> Self {
        let (mode, _) = watch::channel(ChannelMode::Closed);
        Self {
            gateway,
            transport,
            config,
            events,
            state: Arc::new(ChannelState {
                mode,
                reconnect_attempts: AtomicU32::new(0),
                cursor: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the feed, restarting it if it is already running.
    ///
    /// The mode is `Connecting` (push available) or `Polling` (no push) by
    /// the time this returns.
    pub async fn start(&self) {
        self.stop().await;

        let initial = if self.transport.is_some() {
            ChannelMode::Connecting
        } else {
            ChannelMode::Polling
        };
        self.state.set_mode(initial);

        let worker = ChannelWorker {
            gateway: Arc::clone(&self.gateway),
            transport: self.transport.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            state: Arc::clone(&self.state),
        };
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    debug!("Notification worker shutting down");
                }
                _ = worker.run() => {}
            }
        });

        *lock(&self.worker) = Some(RunningWorker { handle, shutdown });
    }

    /// Tear down the active transport and any pending timer.
    ///
    /// Safe to call repeatedly and from any state.
    pub async fn stop(&self) {
        let running = lock(&self.worker).take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            if let Err(err) = running.handle.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "Notification worker ended abnormally");
                }
            }
        }
        self.state.reset_attempts();
        self.state.set_mode(ChannelMode::Closed);
    }

    pub fn mode(&self) -> ChannelMode {
        *self.state.mode.borrow()
    }

    /// Receiver that observes every mode transition.
    pub fn subscribe_mode(&self) -> watch::Receiver<ChannelMode> {
        self.state.mode.subscribe()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.state.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Freshness cursor sent as `lastCheck` on the next poll or reconnect.
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.state.cursor()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub fn supports_push(&self) -> bool {
        self.transport.is_some()
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.worker).take() {
            running.handle.abort();
        }
    }
}

struct ChannelWorker {
    gateway: Arc<dyn SessionGateway>,
    transport: Option<Arc<dyn PushTransport>>,
    config: ChannelConfig,
    events: mpsc::Sender<NotificationEvent>,
    state: Arc<ChannelState>,
}

impl ChannelWorker {
    async fn run(self) {
        if let Some(transport) = self.transport.clone() {
            self.run_push(transport.as_ref()).await;
        }
        self.run_polling().await;
    }

    /// Push loop. Returns once the channel has to fall back to polling.
    async fn run_push(&self, transport: &dyn PushTransport) {
        loop {
            let failure = match transport.connect(self.state.cursor()).await {
                Ok(stream) => {
                    self.state.reset_attempts();
                    self.state.set_mode(ChannelMode::Live);
                    self.consume(stream).await
                }
                Err(err) => err,
            };

            if failure == TransportError::Unsupported {
                warn!("Push transport unsupported, switching to polling");
                return;
            }
            self.state.set_mode(ChannelMode::Connecting);

            let attempts = self.state.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempts >= self.config.max_reconnect_attempts {
                warn!(
                    error = %failure,
                    attempts,
                    "Push reconnect ceiling reached, falling back to polling"
                );
                return;
            }

            let delay = backoff_delay(attempts, self.config.backoff_cap);
            warn!(
                error = %failure,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Push transport failed, scheduling reconnect"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Drain an open connection; returns why it ended.
    async fn consume(&self, mut stream: PushStream) -> TransportError {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(payload) => {
                    self.state.reset_attempts();
                    for event in parse_push_payload(&payload) {
                        self.dispatch(event).await;
                    }
                }
                Err(err) => return err,
            }
        }
        TransportError::Closed
    }

    async fn run_polling(&self) {
        self.state.set_mode(ChannelMode::Polling);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    async fn poll_once(&self) {
        let mut options = RequestOptions::get();
        if let Some(cursor) = self.state.cursor() {
            options = options.with_query(CURSOR_PARAM, format_cursor(cursor));
        }

        let response = self
            .gateway
            .request(&self.config.poll_path, options)
            .await
            .and_then(|response| response.error_for_status());

        match response {
            Ok(response) => {
                let events = parse_event_stream(&response.body);
                debug!(count = events.len(), "Poll returned events");
                for event in events {
                    self.dispatch(event).await;
                }
            }
            Err(err) => {
                // retried on the next tick; never surfaced
                debug!(error = %err, "Poll failed");
            }
        }
    }

    async fn dispatch(&self, event: NotificationEvent) {
        if let NotificationEvent::Heartbeat { timestamp } = &event {
            self.state.advance_cursor(*timestamp);
        }
        let event_type = event.event_type();
        if self.events.send(event).await.is_err() {
            debug!(event_type, "No consumer for notification event");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles_then_caps() {
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(0, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(4, cap), Duration::from_secs(16));
        assert_eq!(backoff_delay(5, cap), Duration::from_secs(30));
        assert_eq!(backoff_delay(200, cap), Duration::from_secs(30));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(ChannelMode::Polling.to_string(), "polling");
        assert_eq!(ChannelMode::Live.to_string(), "live");
    }

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.backoff_cap, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.poll_path, paths::POLL);
    }
}
