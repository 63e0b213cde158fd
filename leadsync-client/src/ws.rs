//! WebSocket push transport.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{future, StreamExt};
use leadsync_core::{
    format_cursor, PushStream, PushTransport, SessionGateway, TransportError, CURSOR_PARAM,
};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Push transport over a WebSocket connection.
///
/// Every text frame is handed to the channel as one payload. Binary and
/// control frames are dropped; a close frame ends the stream.
pub struct WsPushTransport {
    endpoint: String,
    session: Arc<dyn SessionGateway>,
}

impl WsPushTransport {
    pub fn new(endpoint: impl Into<String>, session: Arc<dyn SessionGateway>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PushTransport for WsPushTransport {
    async fn connect(&self, cursor: Option<DateTime<Utc>>) -> Result<PushStream, TransportError> {
        let url = cursor_url(&self.endpoint, cursor);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if let Some(token) = self.session.bearer_token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(endpoint = %self.endpoint, "WebSocket connected");

        let payloads = stream
            .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
            .filter_map(|frame| {
                future::ready(match frame {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(err) => Some(Err(TransportError::Stream(err.to_string()))),
                })
            });
        Ok(payloads.boxed())
    }
}

/// `endpoint` with the freshness cursor appended as `lastCheck`.
pub fn cursor_url(endpoint: &str, cursor: Option<DateTime<Utc>>) -> String {
    match cursor {
        None => endpoint.to_string(),
        Some(cursor) => {
            let separator = if endpoint.contains('?') { '&' } else { '?' };
            format!(
                "{}{}{}={}",
                endpoint,
                separator,
                CURSOR_PARAM,
                urlencoding::encode(&format_cursor(cursor))
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_url_without_cursor() {
        assert_eq!(cursor_url("wss://x/ws", None), "wss://x/ws");
    }

    #[test]
    fn test_cursor_url_encodes_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(
            cursor_url("wss://x/ws", Some(at)),
            "wss://x/ws?lastCheck=2026-10-19T12%3A00%3A00.000Z"
        );
        assert_eq!(
            cursor_url("wss://x/ws?v=2", Some(at)),
            "wss://x/ws?v=2&lastCheck=2026-10-19T12%3A00%3A00.000Z"
        );
    }
}
