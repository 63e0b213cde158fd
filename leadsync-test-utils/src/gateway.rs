//! Scripted [`SessionGateway`] for tests.

use async_trait::async_trait;
use leadsync_core::{GatewayError, GatewayResponse, GatewayResult, RequestOptions, SessionGateway};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::watch;

/// A request observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub path: String,
    pub options: RequestOptions,
}

#[derive(Default)]
struct Script {
    sticky: HashMap<String, GatewayResult<GatewayResponse>>,
    once: HashMap<String, VecDeque<GatewayResult<GatewayResponse>>>,
}

/// Mock gateway answering per path.
///
/// One-shot replies queued with [`respond_once`](Self::respond_once) are used
/// first, then the sticky reply set with [`respond`](Self::respond). Unknown
/// paths answer `404`. Every request is recorded before it is answered.
pub struct MockGateway {
    script: Mutex<Script>,
    requests: Mutex<Vec<RecordedRequest>>,
    open: watch::Sender<bool>,
}

impl MockGateway {
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            script: Mutex::new(Script::default()),
            requests: Mutex::new(Vec::new()),
            open,
        }
    }

    /// Always answer `path` with `reply`.
    pub fn respond(&self, path: &str, reply: GatewayResult<GatewayResponse>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .sticky
            .insert(path.to_string(), reply);
        self
    }

    /// Always answer `path` with `200` and `body` as JSON.
    pub fn respond_json(&self, path: &str, body: Value) -> &Self {
        self.respond(path, Ok(GatewayResponse::ok(body.to_string())))
    }

    /// Answer the next request to `path` with `reply`.
    pub fn respond_once(&self, path: &str, reply: GatewayResult<GatewayResponse>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .once
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Hold every request until [`release`](Self::release).
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn reply_for(&self, path: &str) -> GatewayResult<GatewayResponse> {
        let mut script = self.script.lock().unwrap();
        if let Some(reply) = script.once.get_mut(path).and_then(VecDeque::pop_front) {
            return reply;
        }
        script.sticky.get(path).cloned().unwrap_or_else(|| {
            Err(GatewayError::Status {
                status: 404,
                body: format!("no mock reply for {}", path),
            })
        })
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionGateway for MockGateway {
    async fn request(&self, path: &str, options: RequestOptions) -> GatewayResult<GatewayResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            path: path.to_string(),
            options,
        });

        let mut open = self.open.subscribe();
        // the sender lives in self, so wait_for only fails if self is gone
        let _ = open.wait_for(|open| *open).await;

        self.reply_for(path)
    }

    fn bearer_token(&self) -> Option<String> {
        Some("mock-token".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_once_replies_take_precedence() {
        let gateway = MockGateway::new();
        gateway
            .respond_json("/a", json!({"n": 1}))
            .respond_once("/a", Ok(GatewayResponse::new(500, "boom")));

        let first = gateway.request("/a", RequestOptions::get()).await.unwrap();
        assert_eq!(first.status, 500);
        let second = gateway.request("/a", RequestOptions::get()).await.unwrap();
        assert_eq!(second.body, r#"{"n":1}"#);
        assert_eq!(gateway.request_count("/a"), 2);
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let gateway = MockGateway::new();
        let err = gateway.request("/missing", RequestOptions::get()).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let gateway = std::sync::Arc::new(MockGateway::new());
        gateway.respond_json("/slow", json!(true));
        gateway.hold();

        let pending = tokio::spawn({
            let gateway = std::sync::Arc::clone(&gateway);
            async move { gateway.request("/slow", RequestOptions::get()).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(gateway.request_count("/slow"), 1);
        assert!(!pending.is_finished());

        gateway.release();
        assert!(pending.await.unwrap().is_ok());
    }
}
