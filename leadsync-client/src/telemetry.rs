//! Tracing subscriber initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ClientError, ClientResult};

const DEFAULT_FILTER: &str = "leadsync=info,leadsync_client=info,leadsync_cache=info,warn";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive string (`LEADSYNC_LOG`).
    pub filter: String,
    /// Output format (`LEADSYNC_LOG_FORMAT=json|pretty`).
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var("LEADSYNC_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            format: std::env::var("LEADSYNC_LOG_FORMAT")
                .map(|value| LogFormat::parse(&value))
                .unwrap_or(LogFormat::Pretty),
        }
    }
}

/// Install the global tracing subscriber. Fails if one is already set.
pub fn init_tracing(config: &TelemetryConfig) -> ClientResult<()> {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| ClientError::Telemetry(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(filter = %config.filter, format = ?config.format, "Telemetry initialized");
    Ok(())
}
