//! Streaming relay
//!
//! Forwards upstream response bytes to the caller as they arrive. Every
//! stream ends in exactly one of two ways:
//!
//! ```text
//! STREAMING --upstream EOF-----------------------------> DONE
//! STREAMING --fault--> emit `event: error` frame --> ERROR_SENT --> DONE
//! ```
//!
//! Once bytes have been sent the response status is fixed, so any fault
//! after that point is reported in-band. Dropping the stream (caller gone)
//! drops the upstream response and its pool permit.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use futures_util::{stream, Stream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::Response;
use serde_json::{json, Value};
use tokio::sync::OwnedSemaphorePermit;

use super::client::{preview, UpstreamPool};
use super::error::{ForwardError, ForwardResult};
use crate::logger;
use crate::transform::JsonBody;

/// Upstream byte source as seen by the relay.
pub type UpstreamStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayFault>> + Send>>;

/// Why an upstream exchange stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFault {
    Status { code: u16, body: String },
    Timeout,
    Network(String),
    PoolExhausted,
    Unexpected(String),
}

impl RelayFault {
    /// Text carried in the synthetic error frame.
    pub fn message(&self) -> String {
        match self {
            RelayFault::Status { code, .. } => {
                let reason = reqwest::StatusCode::from_u16(*code)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Upstream error");
                format!("HTTP {}: {}", code, reason)
            }
            RelayFault::Timeout => "Stream read timeout".to_string(),
            RelayFault::Network(_) => "Network error during streaming".to_string(),
            RelayFault::PoolExhausted => "Connection pool exhausted".to_string(),
            RelayFault::Unexpected(_) => "Stream interrupted unexpectedly".to_string(),
        }
    }

    /// Map a fault that happened before any byte was sent.
    pub fn into_forward_error(self, service: &str) -> ForwardError {
        match self {
            RelayFault::Status { code, .. } if code >= 500 => {
                ForwardError::unavailable(service, format!("upstream returned HTTP {}", code))
            }
            RelayFault::Status { code, body } => {
                let details = serde_json::from_str::<Value>(&body)
                    .unwrap_or_else(|_| json!({ "response": preview(&body) }));
                let message = details
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} API error: {}", service, code));
                ForwardError::InvalidRequest {
                    message,
                    details: Some(details),
                }
            }
            RelayFault::Timeout => ForwardError::unavailable(service, "timeout"),
            RelayFault::Network(reason) => ForwardError::unavailable(service, reason),
            RelayFault::PoolExhausted => {
                ForwardError::unavailable(service, "connection pool exhausted")
            }
            RelayFault::Unexpected(reason) => ForwardError::Internal(reason),
        }
    }
}

impl std::fmt::Display for RelayFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayFault::Status { code, body } => write!(f, "HTTP {}: {}", code, preview(body)),
            RelayFault::Timeout => write!(f, "timeout"),
            RelayFault::Network(reason) => write!(f, "network error: {}", reason),
            RelayFault::PoolExhausted => write!(f, "connection pool exhausted"),
            RelayFault::Unexpected(reason) => write!(f, "unexpected error: {}", reason),
        }
    }
}

impl std::error::Error for RelayFault {}

impl From<reqwest::Error> for RelayFault {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RelayFault::Timeout
        } else if e.is_connect() {
            RelayFault::Network(format!("Connection failed: {}", e))
        } else if e.is_request() || e.is_body() || e.is_decode() {
            RelayFault::Network(e.to_string())
        } else {
            RelayFault::Unexpected(e.to_string())
        }
    }
}

/// `event: error` frame in the same SSE framing as upstream events.
pub fn error_frame(message: &str) -> Bytes {
    Bytes::from(format!(
        "event: error\ndata: {{\"error\": {}}}\n\n",
        Value::String(message.to_string())
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Streaming,
    ErrorSent,
    Done,
}

/// Byte stream handed to the HTTP layer. Never yields an error; faults
/// become a terminal error frame.
pub struct RelayStream {
    inner: Option<UpstreamStream>,
    state: RelayState,
    label: String,
    chunks: u64,
    bytes: u64,
    started: Instant,
}

impl RelayStream {
    pub fn new(label: impl Into<String>, inner: UpstreamStream) -> Self {
        Self {
            inner: Some(inner),
            state: RelayState::Streaming,
            label: label.into(),
            chunks: 0,
            bytes: 0,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn finish(&mut self) {
        self.inner = None;
        self.state = RelayState::Done;
        logger::info(
            "relay",
            &format!(
                "Stream complete: {} chunks={} bytes={} elapsed={}ms",
                self.label,
                self.chunks,
                self.bytes,
                self.started.elapsed().as_millis()
            ),
        );
    }

    fn fail(&mut self, fault: &RelayFault) -> Bytes {
        self.inner = None;
        self.state = RelayState::ErrorSent;
        logger::error(
            "relay",
            &format!(
                "Stream fault: {} error={} chunks_received={}",
                self.label, fault, self.chunks
            ),
        );
        error_frame(&fault.message())
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            match this.state {
                RelayState::Done => return Poll::Ready(None),
                RelayState::ErrorSent => {
                    this.state = RelayState::Done;
                    return Poll::Ready(None);
                }
                RelayState::Streaming => {}
            }

            let Some(inner) = this.inner.as_mut() else {
                this.state = RelayState::Done;
                return Poll::Ready(None);
            };

            return match inner.as_mut().poll_next(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    this.chunks += 1;
                    this.bytes += chunk.len() as u64;
                    Poll::Ready(Some(Ok(chunk)))
                }
                Poll::Ready(Some(Err(fault))) => Poll::Ready(Some(Ok(this.fail(&fault)))),
                Poll::Ready(None) => {
                    this.finish();
                    Poll::Ready(None)
                }
            };
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        if self.state == RelayState::Streaming && self.inner.is_some() {
            logger::warn(
                "relay",
                &format!(
                    "Stream cancelled by client: {} chunks_sent={}",
                    self.label, self.chunks
                ),
            );
        }
    }
}

/// Response body chunks, each read bounded by `read_timeout`. The permit is
/// owned by the stream and released with it.
fn upstream_chunks(
    response: Response,
    read_timeout: Duration,
    permit: OwnedSemaphorePermit,
) -> UpstreamStream {
    let body = Box::pin(response.bytes_stream());
    Box::pin(stream::unfold(
        (body, permit),
        move |(mut body, permit)| async move {
            match tokio::time::timeout(read_timeout, body.next()).await {
                Err(_) => Some((Err(RelayFault::Timeout), (body, permit))),
                Ok(None) => None,
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), (body, permit))),
                Ok(Some(Err(e))) => Some((Err(RelayFault::from(e)), (body, permit))),
            }
        },
    ))
}

/// Head of an eagerly opened stream.
pub struct OpenedStream {
    pub headers: HeaderMap,
    pub stream: RelayStream,
}

pub struct StreamingRelay {
    pool: Arc<UpstreamPool>,
}

impl StreamingRelay {
    pub fn new(pool: Arc<UpstreamPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &UpstreamPool {
        &self.pool
    }

    /// Connect and check the status before committing to a stream. Faults up
    /// to that point are ordinary errors; later ones go in-band.
    pub async fn open(
        &self,
        service: &str,
        url: &str,
        headers: HeaderMap,
        body: &JsonBody,
    ) -> ForwardResult<OpenedStream> {
        let permit = self
            .pool
            .acquire()
            .await
            .map_err(|f| f.into_forward_error(service))?;
        let response = self
            .pool
            .send(url, headers, body)
            .await
            .map_err(|f| f.into_forward_error(service))?;

        let status = response.status();
        if !status.is_success() {
            let text = self.pool.read_text(response).await.unwrap_or_default();
            logger::error(
                "relay",
                &format!(
                    "Upstream refused stream: service={} status={} body={}",
                    service,
                    status.as_u16(),
                    preview(&text)
                ),
            );
            return Err(RelayFault::Status {
                code: status.as_u16(),
                body: text,
            }
            .into_forward_error(service));
        }

        let headers = response.headers().clone();
        let chunks = upstream_chunks(response, self.pool.read_timeout(), permit);
        Ok(OpenedStream {
            headers,
            stream: RelayStream::new(format!("{} {}", service, url), chunks),
        })
    }

    /// Stream whose connection is opened on first poll. Every fault,
    /// including a non-success status, is reported in-band.
    pub fn deferred(
        &self,
        service: &str,
        url: String,
        headers: HeaderMap,
        body: JsonBody,
    ) -> RelayStream {
        let pool = Arc::clone(&self.pool);
        let label = format!("{} {}", service, url);

        let connect = async move {
            let permit = pool.acquire().await?;
            let response = pool.send(&url, headers, &body).await?;
            let status = response.status();
            if !status.is_success() {
                let text = pool.read_text(response).await.unwrap_or_default();
                return Err(RelayFault::Status {
                    code: status.as_u16(),
                    body: text,
                });
            }
            Ok::<_, RelayFault>(upstream_chunks(response, pool.read_timeout(), permit))
        };

        RelayStream::new(label, Box::pin(stream::once(connect).try_flatten()))
    }
}
