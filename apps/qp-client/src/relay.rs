//! HTTP relay client.
//!
//! The `Relay` trait is the seam between the engines and the network;
//! integration tests swap in an in-memory relay. `RelayError::Timeout`
//! is the one transport failure the sync loop reacts to (it flips the
//! connection state); everything else is reported and retried next
//! cycle.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use qp_proto::wire::{
    FetchRequest, FetchResponse, PostExchangeKeyRequest, PostExchangeKeyResponse,
    PostMessageRequest, PostMessageResponse,
};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("request timed out")]
    Timeout,

    #[error("server returned status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response body: {0}")]
    BadBody(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_decode() {
            return Self::BadBody(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait Relay: Send + Sync {
    /// Liveness probe. Success means "start syncing".
    async fn ping(&self) -> Result<(), RelayError>;

    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse, RelayError>;

    async fn post_exchange_key(
        &self,
        req: &PostExchangeKeyRequest,
    ) -> Result<PostExchangeKeyResponse, RelayError>;

    async fn post_message(
        &self,
        req: &PostMessageRequest,
    ) -> Result<PostMessageResponse, RelayError>;
}

pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
    ping_timeout: std::time::Duration,
}

impl RelayClient {
    pub fn new(config: &crate::config::ServerConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("qp-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ping_timeout: config.ping_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn check_status(status: StatusCode) -> Result<(), RelayError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(RelayError::Status(status.as_u16()))
    }
}

#[async_trait]
impl Relay for RelayClient {
    async fn ping(&self) -> Result<(), RelayError> {
        let resp = self
            .client
            .get(self.url("/ping"))
            .timeout(self.ping_timeout)
            .send()
            .await?;
        check_status(resp.status())
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse, RelayError> {
        let resp = self
            .client
            .post(self.url("/fetch"))
            .json(req)
            .send()
            .await?;
        check_status(resp.status())?;
        Ok(resp.json().await?)
    }

    async fn post_exchange_key(
        &self,
        req: &PostExchangeKeyRequest,
    ) -> Result<PostExchangeKeyResponse, RelayError> {
        let resp = self
            .client
            .post(self.url("/exchange-keys"))
            .json(req)
            .send()
            .await?;
        check_status(resp.status())?;
        Ok(resp.json().await?)
    }

    async fn post_message(
        &self,
        req: &PostMessageRequest,
    ) -> Result<PostMessageResponse, RelayError> {
        let resp = self
            .client
            .post(self.url("/messages"))
            .json(req)
            .send()
            .await?;
        check_status(resp.status())?;
        Ok(resp.json().await?)
    }
}
