//! Anthropic (Claude) API handler
//!
//! Forwards to the Messages API with the official CLI's headers. Streams are
//! opened lazily, so even an upstream refusal is reported as an in-band
//! error frame.

use axum::response::Response;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::forward::context::ForwardContext;
use crate::forward::error::ForwardResult;
use crate::forward::relay::StreamingRelay;
use crate::formats::claude_code;
use crate::logger;
use crate::transform::JsonBody;

use super::{sse_response, UpstreamHandler};

/// Anthropic API handler
pub struct AnthropicHandler;

impl UpstreamHandler for AnthropicHandler {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn build_url(&self, ctx: &ForwardContext) -> String {
        ctx.url(claude_code::MESSAGES_PATH)
    }

    fn build_headers(&self, ctx: &ForwardContext) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", ctx.api_key)) {
            headers.insert("authorization", value);
        }
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(claude_code::ANTHROPIC_VERSION),
        );
        let beta = claude_code::merge_beta(ctx.extra_header("anthropic-beta"));
        if let Ok(value) = HeaderValue::from_str(&beta) {
            headers.insert("anthropic-beta", value);
        }
        headers.insert("user-agent", HeaderValue::from_static(claude_code::USER_AGENT));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        for (name, value) in &ctx.extra_headers {
            if name.eq_ignore_ascii_case("anthropic-beta") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        headers
    }

    async fn handle_request(
        &self,
        relay: &StreamingRelay,
        ctx: ForwardContext,
        body: JsonBody,
    ) -> ForwardResult<Value> {
        let url = self.build_url(&ctx);
        logger::info(
            "anthropic",
            &format!(
                "Forwarding request: request_id={}, adapter={}, model={}",
                ctx.request_id,
                ctx.adapter,
                body.get("model").and_then(Value::as_str).unwrap_or("-")
            ),
        );

        relay
            .pool()
            .post_json(self.name(), &url, self.build_headers(&ctx), &body)
            .await
    }

    async fn handle_stream(
        &self,
        relay: &StreamingRelay,
        ctx: ForwardContext,
        body: JsonBody,
    ) -> ForwardResult<Response> {
        let url = self.build_url(&ctx);
        logger::info(
            "anthropic",
            &format!(
                "Forwarding stream: request_id={}, adapter={}, model={}",
                ctx.request_id,
                ctx.adapter,
                body.get("model").and_then(Value::as_str).unwrap_or("-")
            ),
        );

        let stream = relay.deferred(self.name(), url, self.build_headers(&ctx), body);
        Ok(sse_response("anthropic", stream, &[]))
    }
}
