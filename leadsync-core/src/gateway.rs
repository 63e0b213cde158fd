//! Authenticated request gateway.
//!
//! The sync core never talks HTTP directly. It issues requests through a
//! [`SessionGateway`], which owns the operator's credentials and is expected
//! to refresh them on a `401` and retry once before giving up.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// HTTP method subset used by the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: JsonValue) -> Self {
        Self {
            method: Method::Post,
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn patch(body: JsonValue) -> Self {
        Self {
            method: Method::Patch,
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response handed back by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: String,
}

impl GatewayResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with a hard error unless the status is 2xx.
    pub fn error_for_status(self) -> GatewayResult<Self> {
        match self.status {
            s if (200..300).contains(&s) => Ok(self),
            401 => Err(GatewayError::Unauthorized),
            status => Err(GatewayError::Status {
                status,
                body: self.body,
            }),
        }
    }

    /// Decode a 2xx body as JSON. `204 No Content` decodes as `null`.
    pub fn json<T: DeserializeOwned>(self) -> GatewayResult<T> {
        let response = self.error_for_status()?;
        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(serde_json::from_value(JsonValue::Null)?);
        }
        Ok(serde_json::from_str(&response.body)?)
    }
}

/// Authenticated access to the admin API.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Issue a request against `path` (relative to the API base URL).
    ///
    /// Implementations include credentials, refresh them transparently on a
    /// `401` and retry once. Non-2xx responses are returned as-is; callers
    /// decide whether they are fatal.
    async fn request(&self, path: &str, options: RequestOptions) -> GatewayResult<GatewayResponse>;

    /// Current bearer token, if the session is authenticated.
    ///
    /// Used by the push transport to authenticate its handshake.
    fn bearer_token(&self) -> Option<String> {
        None
    }
}
