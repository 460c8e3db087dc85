//! HTTP JSON-RPC transport backed by `reqwest`, with bounded retry of
//! transient failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chainstream_core::Backoff;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

/// Configuration for `HttpTransport`.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Retries after the first attempt for transient errors.
    pub num_retries: u32,
    pub backoff: Backoff,
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            num_retries: 10,
            backoff: Backoff::exponential(Duration::from_millis(200), Duration::from_secs(10), 2.0),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP JSON-RPC client for a single node.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    config: HttpConfig,
    ids: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, config: HttpConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            config,
            ids: AtomicU64::new(1),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpConfig::default())
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self.http.post(&self.url).json(req).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    ms: self.config.request_timeout.as_millis() as u64,
                }
            } else {
                TransportError::Http(e.to_string())
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp.bytes().await.map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(serde_json::from_slice::<JsonRpcResponse>(&body)?)
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt <= self.config.num_retries => {
                    let delay = self.config.backoff.delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        url = %self.url,
                        method = %req.method,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(attempt, error = %e, url = %self.url, "max retries exceeded");
                    }
                    return Err(e);
                }
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }
}
