//! HTTP session gateway backed by reqwest.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use leadsync_core::{
    GatewayError, GatewayResponse, GatewayResult, Method, RequestOptions, SessionGateway,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{AuthConfig, ClientConfig};
use crate::error::ClientResult;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionTokens {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Authenticated operator session.
///
/// Every request carries the bearer token. A `401` triggers one credential
/// refresh and one retry of the original request.
pub struct HttpSessionGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: AuthConfig,
    tokens: RwLock<Option<SessionTokens>>,
}

impl HttpSessionGateway {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            credentials: config.auth.clone(),
            tokens: RwLock::new(None),
        })
    }

    /// Exchange the configured credentials for a session token pair.
    pub async fn login(&self) -> GatewayResult<()> {
        let body = json!({
            "email": self.credentials.email,
            "password": self.credentials.password,
        });
        let tokens = self.obtain_tokens(LOGIN_PATH, body).await?;
        self.store_tokens(tokens);
        info!(email = %self.credentials.email, "Operator logged in");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Renew the session: refresh token when we have one, else log in again.
    async fn refresh_session(&self) -> GatewayResult<()> {
        let refresh_token = self
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|tokens| tokens.refresh_token.clone());

        match refresh_token {
            Some(refresh_token) => {
                let tokens = self
                    .obtain_tokens(REFRESH_PATH, json!({ "refreshToken": refresh_token }))
                    .await?;
                self.store_tokens(tokens);
                debug!("Session token refreshed");
                Ok(())
            }
            None => self.login().await,
        }
    }

    async fn obtain_tokens(&self, path: &str, body: serde_json::Value) -> GatewayResult<SessionTokens> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::Auth(format!(
                "{} returned {}: {}",
                path, status, text
            )));
        }
        let tokens: SessionTokens = serde_json::from_str(&text)?;
        Ok(tokens)
    }

    fn store_tokens(&self, tokens: SessionTokens) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
    }

    async fn send(&self, path: &str, options: &RequestOptions) -> GatewayResult<GatewayResponse> {
        let url = format!("{}{}", self.base_url, path);
        let method = match options.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        };

        let mut request = self.client.request(method, url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }
        if let Some(token) = self.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        Ok(GatewayResponse::new(status, body))
    }
}

#[async_trait]
impl SessionGateway for HttpSessionGateway {
    async fn request(&self, path: &str, options: RequestOptions) -> GatewayResult<GatewayResponse> {
        let response = self.send(path, &options).await?;
        if response.status != 401 {
            return Ok(response);
        }

        debug!(path, "Request unauthorized, refreshing session");
        if let Err(err) = self.refresh_session().await {
            warn!(error = %err, "Session refresh failed");
            return Err(GatewayError::Unauthorized);
        }

        let retried = self.send(path, &options).await?;
        if retried.status == 401 {
            return Err(GatewayError::Unauthorized);
        }
        Ok(retried)
    }

    fn bearer_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tokens| tokens.token.clone())
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}
