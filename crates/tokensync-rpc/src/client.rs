//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Transient failures (connection errors, timeouts, non-2xx statuses) are
//! retried with exponential backoff. JSON-RPC error objects are returned to
//! the caller untouched.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::policy::{RetryConfig, RetryPolicy};
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP JSON-RPC client.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl HttpRpcClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            request_timeout: config.request_timeout,
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpClientConfig::default())
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
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

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(serde_json::from_slice::<JsonRpcResponse>(&body)?)
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            method = %req.method,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}
