//! Forward handlers module
//!
//! One handler per upstream dialect.

pub mod anthropic;
pub mod openai;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::header::HeaderMap;
use serde_json::Value;

use super::context::ForwardContext;
use super::error::ForwardResult;
use super::relay::{RelayStream, StreamingRelay};
use crate::logger;
use crate::transform::JsonBody;

/// Trait interface for implementing upstream-specific behavior
pub trait UpstreamHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_url(&self, ctx: &ForwardContext) -> String;

    fn build_headers(&self, ctx: &ForwardContext) -> HeaderMap;

    /// Handle non-streaming request
    fn handle_request(
        &self,
        relay: &StreamingRelay,
        ctx: ForwardContext,
        body: JsonBody,
    ) -> impl std::future::Future<Output = ForwardResult<Value>> + Send;

    /// Handle streaming request
    fn handle_stream(
        &self,
        relay: &StreamingRelay,
        ctx: ForwardContext,
        body: JsonBody,
    ) -> impl std::future::Future<Output = ForwardResult<Response>> + Send;
}

/// SSE response around a relay stream. `passthrough` headers from upstream
/// override the defaults.
pub(crate) fn sse_response(
    source: &str,
    stream: RelayStream,
    passthrough: &[(&'static str, HeaderValue)],
) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive");

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in passthrough {
            headers.insert(*name, value.clone());
        }
    }

    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| {
            logger::error(source, &format!("Failed to build stream response: {}", e));
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
