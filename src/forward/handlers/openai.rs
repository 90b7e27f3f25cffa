//! OpenAI Responses API handler
//!
//! Streams are opened eagerly: connect and status are checked before the
//! response is committed, so an upstream refusal becomes a normal error
//! response. Only faults after that point go in-band.

use axum::response::Response;
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};

use crate::formats::codex;
use crate::forward::context::ForwardContext;
use crate::forward::error::{ForwardError, ForwardResult};
use crate::forward::relay::StreamingRelay;
use crate::logger;
use crate::transform::JsonBody;

use super::{sse_response, UpstreamHandler};

const DEFAULT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// OpenAI API handler
pub struct OpenAIHandler;

/// Fill in the fields clients rely on; anything else the upstream sent is
/// kept.
pub fn normalize_response(response: Value) -> ForwardResult<Value> {
    let Value::Object(raw) = response else {
        return Err(ForwardError::InvalidRequest {
            message: "Upstream response is not a JSON object".to_string(),
            details: Some(json!({ "response": response })),
        });
    };

    let mut parsed = Map::new();
    let defaults = [
        ("id", json!("")),
        ("object", json!("response")),
        ("created_at", json!(0)),
        ("status", json!("completed")),
        ("output", json!([])),
        ("usage", json!({})),
    ];
    for (key, default) in defaults {
        parsed.insert(key.to_string(), raw.get(key).cloned().unwrap_or(default));
    }
    for (key, value) in raw {
        if !parsed.contains_key(&key) {
            parsed.insert(key, value);
        }
    }
    Ok(Value::Object(parsed))
}

impl UpstreamHandler for OpenAIHandler {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn build_url(&self, ctx: &ForwardContext) -> String {
        ctx.url(codex::RESPONSES_PATH)
    }

    fn build_headers(&self, ctx: &ForwardContext) -> HeaderMap {
        codex::build_headers(&ctx.api_key, &ctx.extra_headers)
    }

    async fn handle_request(
        &self,
        relay: &StreamingRelay,
        ctx: ForwardContext,
        body: JsonBody,
    ) -> ForwardResult<Value> {
        let url = self.build_url(&ctx);
        logger::info(
            "openai",
            &format!(
                "Forwarding request: request_id={}, adapter={}, model={}",
                ctx.request_id,
                ctx.adapter,
                body.get("model").and_then(Value::as_str).unwrap_or("-")
            ),
        );

        let response = relay
            .pool()
            .post_json(self.name(), &url, self.build_headers(&ctx), &body)
            .await?;
        normalize_response(response)
    }

    async fn handle_stream(
        &self,
        relay: &StreamingRelay,
        ctx: ForwardContext,
        body: JsonBody,
    ) -> ForwardResult<Response> {
        let url = self.build_url(&ctx);
        logger::info(
            "openai",
            &format!(
                "Forwarding stream: request_id={}, adapter={}, model={}",
                ctx.request_id,
                ctx.adapter,
                body.get("model").and_then(Value::as_str).unwrap_or("-")
            ),
        );

        let opened = relay
            .open(self.name(), &url, self.build_headers(&ctx), &body)
            .await?;

        let mut passthrough = Vec::new();
        for name in ["x-request-id", "cache-control", "content-type"] {
            if let Some(value) = opened.headers.get(name) {
                passthrough.push((name, value.clone()));
            }
        }
        if opened.headers.get("content-type").is_none() {
            passthrough.push((
                "content-type",
                reqwest::header::HeaderValue::from_static(DEFAULT_STREAM_CONTENT_TYPE),
            ));
        }

        Ok(sse_response("openai", opened.stream, &passthrough))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_fills_defaults_and_keeps_extras() {
        let out = normalize_response(json!({"id": "resp_1", "model": "gpt-5", "output": [1]})).unwrap();
        assert_eq!(out["id"], json!("resp_1"));
        assert_eq!(out["object"], json!("response"));
        assert_eq!(out["created_at"], json!(0));
        assert_eq!(out["status"], json!("completed"));
        assert_eq!(out["output"], json!([1]));
        assert_eq!(out["usage"], json!({}));
        assert_eq!(out["model"], json!("gpt-5"));
    }

    #[test]
    fn normalize_rejects_non_objects() {
        assert!(matches!(
            normalize_response(json!([1, 2])),
            Err(ForwardError::InvalidRequest { .. })
        ));
    }
}
