//! Refresh throttling and notification-driven cache maintenance.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use leadsync_core::{keys, GatewayResult, NotificationEvent, SubmissionId};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::admin::AdminApi;
use crate::channel::ChannelMode;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum spacing between non-forced full refreshes.
    pub min_refresh_interval: Duration,
    /// Delay before the background stats prefetch after a refresh.
    pub prefetch_delay: Duration,
    /// Capacity of the UI update broadcast channel.
    pub update_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::from_secs(30),
            prefetch_delay: Duration::from_millis(1000),
            update_buffer: 64,
        }
    }
}

/// Update published to UI subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    DashboardRefreshed(Value),
    RefreshFailed(String),
    EntityInvalidated(SubmissionId),
    /// Informational only; falling back to polling is not an error.
    ChannelMode(ChannelMode),
}

/// Sole consumer of notification events and sole writer of the
/// last-refresh timestamp.
pub struct SyncCoordinator {
    api: Arc<AdminApi>,
    config: SyncConfig,
    last_refresh: Mutex<Option<Instant>>,
    /// Held for the whole of a refresh; overlapping callers queue here.
    refresh_gate: AsyncMutex<()>,
    last_heartbeat: Mutex<Option<DateTime<Utc>>>,
    prefetch: Mutex<Option<JoinHandle<()>>>,
    updates: broadcast::Sender<SyncUpdate>,
}

impl SyncCoordinator {
    pub fn new(api: Arc<AdminApi>, config: SyncConfig) -> Self {
        let (updates, _) = broadcast::channel(config.update_buffer.max(1));
        Self {
            api,
            config,
            last_refresh: Mutex::new(None),
            refresh_gate: AsyncMutex::new(()),
            last_heartbeat: Mutex::new(None),
            prefetch: Mutex::new(None),
            updates,
        }
    }

    pub fn api(&self) -> &Arc<AdminApi> {
        &self.api
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates.subscribe()
    }

    pub fn last_refresh_at(&self) -> Option<Instant> {
        *lock(&self.last_refresh)
    }

    /// Latest heartbeat timestamp seen on the notification feed.
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_heartbeat)
    }

    /// Dashboard data, refreshed from the server unless throttled.
    ///
    /// Without `force`, a call within the minimum interval of the last
    /// successful refresh returns the cached dashboard. Errors propagate.
    ///
    /// Refreshes never overlap. A caller arriving while another refresh is
    /// running waits for it, then applies the throttle against the result,
    /// so concurrent unforced calls share a single fetch.
    pub async fn refresh(&self, force: bool) -> GatewayResult<Value> {
        let _gate = self.refresh_gate.lock().await;
        if !force && self.is_throttled() {
            if let Some(cached) = self.api.loader().cache().get(keys::DASHBOARD_DATA) {
                debug!("Refresh throttled, serving cached dashboard");
                return Ok(cached);
            }
            // Throttled but the entry is gone: a cached load, not a full refresh.
            return self.api.dashboard().await;
        }

        let removed = self.api.invalidate_groups();
        debug!(removed, force, "Starting full refresh");

        match self.api.dashboard().await {
            Ok(data) => {
                *lock(&self.last_refresh) = Some(Instant::now());
                self.publish(SyncUpdate::DashboardRefreshed(data.clone()));
                self.schedule_prefetch();
                Ok(data)
            }
            Err(err) => {
                error!(error = %err, "Dashboard refresh failed");
                self.publish(SyncUpdate::RefreshFailed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Apply one notification event.
    pub async fn on_notification(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::NewItems { items } => {
                info!(count = items.len(), "New submissions received");
                // the forced refresh drops the list and dashboard groups
                if let Err(err) = self.refresh(true).await {
                    warn!(error = %err, "Refresh after new submissions failed");
                }
            }
            NotificationEvent::Heartbeat { timestamp } => {
                *lock(&self.last_heartbeat) = Some(timestamp);
            }
            NotificationEvent::StatusChanged { id, .. } | NotificationEvent::ResponseSent { id } => {
                let removed = self.api.invalidate_submission(id);
                debug!(submission_id = %id, removed, "Submission entries invalidated");
                self.publish(SyncUpdate::EntityInvalidated(id));
            }
        }
    }

    /// Consume notification events until the channel closes, forwarding
    /// mode changes to subscribers.
    pub async fn run(
        &self,
        events: &mut mpsc::Receiver<NotificationEvent>,
        mut mode: watch::Receiver<ChannelMode>,
    ) {
        let mut watching_mode = true;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_notification(event).await,
                    None => break,
                },
                changed = mode.changed(), if watching_mode => {
                    if changed.is_ok() {
                        let current = *mode.borrow_and_update();
                        self.publish(SyncUpdate::ChannelMode(current));
                    } else {
                        watching_mode = false;
                    }
                }
            }
        }
        debug!("Notification event stream ended");
    }

    /// Abort a pending prefetch.
    pub fn cancel_prefetch(&self) {
        if let Some(handle) = lock(&self.prefetch).take() {
            handle.abort();
        }
    }

    fn is_throttled(&self) -> bool {
        lock(&self.last_refresh)
            .is_some_and(|at| at.elapsed() < self.config.min_refresh_interval)
    }

    fn schedule_prefetch(&self) {
        let api = Arc::clone(&self.api);
        let delay = self.config.prefetch_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match api.stats().await {
                Ok(_) => debug!("Stats prefetched"),
                Err(err) => debug!(error = %err, "Stats prefetch failed"),
            }
        });

        if let Some(previous) = lock(&self.prefetch).replace(handle) {
            previous.abort();
        }
    }

    fn publish(&self, update: SyncUpdate) {
        // no subscribers is fine
        let _ = self.updates.send(update);
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.cancel_prefetch();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{paths, DataLoader};
    use leadsync_cache::ResponseCache;
    use leadsync_core::SessionGateway;
    use leadsync_test_utils::{fixtures, MockGateway};

    fn coordinator(gateway: &Arc<MockGateway>) -> SyncCoordinator {
        let gateway: Arc<dyn SessionGateway> = gateway.clone();
        let loader = DataLoader::new(Arc::new(ResponseCache::with_defaults()));
        SyncCoordinator::new(Arc::new(AdminApi::new(gateway, loader)), SyncConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_only_moves_cursor() {
        let gateway = Arc::new(MockGateway::new());
        let coordinator = coordinator(&gateway);
        let at = fixtures::reference_time();

        coordinator.on_notification(fixtures::heartbeat(at)).await;

        assert_eq!(coordinator.last_heartbeat(), Some(at));
        assert_eq!(gateway.total_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_publishes_update() {
        let gateway = Arc::new(MockGateway::new());
        gateway.respond_json(paths::DASHBOARD, fixtures::dashboard_json(3));
        let coordinator = coordinator(&gateway);
        let mut updates = coordinator.subscribe();

        coordinator.refresh(true).await.unwrap();

        assert_eq!(
            updates.recv().await.unwrap(),
            SyncUpdate::DashboardRefreshed(fixtures::dashboard_json(3))
        );
        assert!(coordinator.last_refresh_at().is_some());
    }
}
