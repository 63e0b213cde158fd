//! Error types for the client.

use leadsync_core::{GatewayError, TransportError};

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
