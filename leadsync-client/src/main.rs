//! leadsync entry point.

use leadsync_client::{init_tracing, AdminApp, ClientConfig, ClientError, SyncUpdate, TelemetryConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    init_tracing(&TelemetryConfig::default())?;
    let config = ClientConfig::load()?;

    let app = AdminApp::connect(&config).await?;
    let mut updates = app.subscribe();

    if let Err(err) = app.coordinator().refresh(true).await {
        error!(error = %err, "Initial refresh failed");
    }
    app.start().await;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => log_update(&update),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Update subscriber lagged"),
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "Failed to listen for shutdown signal");
                }
                info!("Shutting down");
                break;
            }
        }
    }

    app.shutdown().await;
    Ok(())
}

fn log_update(update: &SyncUpdate) {
    match update {
        SyncUpdate::DashboardRefreshed(data) => {
            let unread = data.pointer("/stats/new").and_then(|v| v.as_u64());
            info!(unread = ?unread, "Dashboard refreshed");
        }
        SyncUpdate::RefreshFailed(reason) => warn!(reason = %reason, "Dashboard refresh failed"),
        SyncUpdate::EntityInvalidated(id) => info!(submission_id = %id, "Submission changed"),
        SyncUpdate::ChannelMode(mode) => info!(mode = %mode, "Live updates"),
    }
}
