//! HTTP client utilities for forwarding requests
//!
//! One shared `reqwest` client per process. The number of upstream requests
//! in flight is bounded by a semaphore; each request holds one permit until
//! its response has been fully consumed or dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{header::HeaderMap, Client, Response};
use serde_json::{json, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::{ForwardError, ForwardResult};
use super::relay::RelayFault;
use crate::config::HttpConfig;
use crate::transform::JsonBody;

/// Upstream error bodies are truncated to this many characters in details
/// and logs.
const ERROR_PREVIEW_CHARS: usize = 500;

pub fn create_client(cfg: &HttpConfig) -> ForwardResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(cfg.idle_timeout_secs))
        .pool_max_idle_per_host(cfg.max_idle_per_host)
        .build()
        .map_err(|e| ForwardError::Internal(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn preview(text: &str) -> String {
    text.chars().take(ERROR_PREVIEW_CHARS).collect()
}

/// Shared, size-bounded upstream connection pool.
pub struct UpstreamPool {
    client: Client,
    permits: Arc<Semaphore>,
    pool_timeout: Duration,
    read_timeout: Duration,
}

impl UpstreamPool {
    pub fn new(cfg: &HttpConfig) -> ForwardResult<Self> {
        Ok(Self {
            client: create_client(cfg)?,
            permits: Arc::new(Semaphore::new(cfg.max_connections.max(1))),
            pool_timeout: Duration::from_secs(cfg.pool_timeout_secs),
            read_timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot, at most `pool_timeout`.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, RelayFault> {
        let permits = Arc::clone(&self.permits);
        match tokio::time::timeout(self.pool_timeout, permits.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(RelayFault::Unexpected("connection pool closed".to_string())),
            Err(_) => Err(RelayFault::PoolExhausted),
        }
    }

    /// POST `body` and wait for the response head.
    pub async fn send(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &JsonBody,
    ) -> Result<Response, RelayFault> {
        let start = Instant::now();
        crate::logger::debug("client", &format!("Sending request to: {}", url));

        let request = self.client.post(url).headers(headers).json(body).send();
        let response = match tokio::time::timeout(self.read_timeout, request).await {
            Err(_) => Err(RelayFault::Timeout),
            Ok(result) => result.map_err(RelayFault::from),
        }
        .map_err(|fault| {
            crate::logger::error("client", &format!("Request failed: {}", fault));
            fault
        })?;

        crate::logger::debug(
            "client",
            &format!(
                "Response status: {} ({}ms)",
                response.status(),
                start.elapsed().as_millis()
            ),
        );
        Ok(response)
    }

    /// Read a whole response body, bounded by the read timeout.
    pub async fn read_text(&self, response: Response) -> Result<String, RelayFault> {
        match tokio::time::timeout(self.read_timeout, response.text()).await {
            Err(_) => Err(RelayFault::Timeout),
            Ok(result) => result.map_err(RelayFault::from),
        }
    }

    /// Single-shot JSON exchange: one attempt, no retries.
    pub async fn post_json(
        &self,
        service: &str,
        url: &str,
        headers: HeaderMap,
        body: &JsonBody,
    ) -> ForwardResult<Value> {
        let _permit = self
            .acquire()
            .await
            .map_err(|f| f.into_forward_error(service))?;

        let response = self
            .send(url, headers, body)
            .await
            .map_err(|f| f.into_forward_error(service))?;
        let status = response.status();
        let text = self
            .read_text(response)
            .await
            .map_err(|f| f.into_forward_error(service))?;

        if !status.is_success() {
            return Err(RelayFault::Status {
                code: status.as_u16(),
                body: text,
            }
            .into_forward_error(service));
        }

        if text.trim().is_empty() {
            return Err(ForwardError::InvalidRequest {
                message: "API returned empty response".to_string(),
                details: Some(json!({ "status_code": status.as_u16() })),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            crate::logger::error(
                "client",
                &format!("Failed to parse upstream response: {} body={}", e, preview(&text)),
            );
            ForwardError::InvalidRequest {
                message: format!("Failed to parse API response: {}", e),
                details: Some(json!({ "response_text": preview(&text) })),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_connections: usize, pool_timeout_secs: u64) -> HttpConfig {
        HttpConfig {
            max_connections,
            pool_timeout_secs,
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let pool = UpstreamPool::new(&cfg(2, 1)).unwrap();
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.available_permits(), 0);
        drop(a);
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = UpstreamPool::new(&cfg(1, 0)).unwrap();
        let _held = pool.acquire().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(RelayFault::PoolExhausted)));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_service_unavailable() {
        // bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let pool = UpstreamPool::new(&cfg(4, 1)).unwrap();
        let err = pool
            .post_json("openai", &format!("http://{}/v1/responses", addr), HeaderMap::new(), &JsonBody::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::ServiceUnavailable { .. }));
        assert_eq!(pool.available_permits(), 4);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(600);
        assert_eq!(preview(&long).chars().count(), 500);
    }
}
