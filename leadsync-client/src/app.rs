//! Composition root: one gateway, cache, channel and coordinator per session.

use std::sync::{Arc, Mutex, MutexGuard};

use leadsync_cache::ResponseCache;
use leadsync_core::{NotificationEvent, PushTransport, SessionGateway};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::admin::{AdminApi, DataLoader};
use crate::channel::NotificationChannel;
use crate::config::ClientConfig;
use crate::coordinator::{SyncCoordinator, SyncUpdate};
use crate::error::ClientResult;
use crate::session::HttpSessionGateway;
use crate::ws::WsPushTransport;

pub struct AdminApp {
    api: Arc<AdminApi>,
    channel: NotificationChannel,
    coordinator: Arc<SyncCoordinator>,
    events: Arc<tokio::sync::Mutex<mpsc::Receiver<NotificationEvent>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl AdminApp {
    /// Log in over HTTP and wire the session components.
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let session = Arc::new(HttpSessionGateway::new(config)?);
        session.login().await?;

        let gateway: Arc<dyn SessionGateway> = session;
        let transport = config.push_endpoint.as_ref().map(|endpoint| {
            Arc::new(WsPushTransport::new(endpoint.clone(), Arc::clone(&gateway)))
                as Arc<dyn PushTransport>
        });
        Ok(Self::from_parts(gateway, transport, config))
    }

    /// Wire the session around existing collaborators.
    pub fn from_parts(
        gateway: Arc<dyn SessionGateway>,
        transport: Option<Arc<dyn PushTransport>>,
        config: &ClientConfig,
    ) -> Self {
        let loader = DataLoader::new(Arc::new(ResponseCache::new(config.cache_config())));
        let api = Arc::new(AdminApi::new(Arc::clone(&gateway), loader));
        let coordinator = Arc::new(SyncCoordinator::new(Arc::clone(&api), config.sync_config()));

        let (events_tx, events_rx) = mpsc::channel(config.channel.event_buffer.max(1));
        let channel = NotificationChannel::new(gateway, transport, config.channel_config(), events_tx);

        Self {
            api,
            channel,
            coordinator,
            events: Arc::new(tokio::sync::Mutex::new(events_rx)),
            consumer: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &Arc<AdminApi> {
        &self.api
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn channel(&self) -> &NotificationChannel {
        &self.channel
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.coordinator.subscribe()
    }

    /// Start the event consumer and the live channel.
    pub async fn start(&self) {
        {
            let mut consumer = lock(&self.consumer);
            if consumer.as_ref().map_or(true, JoinHandle::is_finished) {
                let coordinator = Arc::clone(&self.coordinator);
                let events = Arc::clone(&self.events);
                let mode = self.channel.subscribe_mode();
                *consumer = Some(tokio::spawn(async move {
                    let mut events = events.lock().await;
                    coordinator.run(&mut events, mode).await;
                }));
            }
        }
        self.channel.start().await;
        info!(push = self.channel.supports_push(), "Admin session started");
    }

    /// Stop the channel, the event consumer and any pending prefetch.
    pub async fn shutdown(&self) {
        self.channel.stop().await;
        let consumer = lock(&self.consumer).take();
        if let Some(consumer) = consumer {
            consumer.abort();
            let _ = consumer.await;
        }
        self.coordinator.cancel_prefetch();
        info!("Admin session stopped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
