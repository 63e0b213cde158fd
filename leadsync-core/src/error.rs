//! Error types shared by the leadsync crates

use thiserror::Error;

/// Failures reported by a [`SessionGateway`](crate::SessionGateway).
///
/// Cloneable so that every caller attached to a coalesced fetch observes the
/// same error value as the caller that issued it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Unauthorized: credentials rejected after refresh")]
    Unauthorized,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl GatewayError {
    /// Network-level failures that background work may swallow and retry.
    ///
    /// Everything else is a hard request error that user-initiated calls must
    /// surface.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Push transport lifecycle failures.
///
/// These never reach the UI; the notification channel turns them into
/// reconnect attempts or a fallback to polling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Push transport is not supported in this environment")]
    Unsupported,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Connection closed by peer")]
    Closed,
}

/// Result type alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;
