//! Forward module
//!
//! Client-facing endpoints of the gateway.
//!
//! ## Architecture
//!
//! ```text
//! Request -> Middleware -> AdapterRegistry -> Handler -> Upstream
//!              |                 |               |
//!              v                 v               v
//!         credential,      TransformResult   single-shot JSON
//!         body checks      (body, headers)   or StreamingRelay
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /v1/messages` - Anthropic Messages API
//! - `POST /v1/responses` - OpenAI Responses API
//! - `GET /v1` - API info

pub mod client;
pub mod context;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod relay;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::logger;
use crate::server::AppState;
use crate::transform::JsonBody;

pub use context::{ForwardContext, Upstream};
pub use error::{ForwardError, ForwardResult};
use handlers::{anthropic::AnthropicHandler, openai::OpenAIHandler, UpstreamHandler};

fn log_inbound(state: &AppState, source: &str, body: &JsonBody) {
    if state.settings.is_test_environment() {
        logger::debug(
            source,
            &format!(
                "Inbound body: {}",
                serde_json::to_string(body).unwrap_or_default()
            ),
        );
    }
}

/// Run a handler in single-shot or streaming mode.
async fn dispatch<H: UpstreamHandler>(
    handler: &H,
    state: &AppState,
    ctx: ForwardContext,
    body: JsonBody,
    streaming: bool,
) -> ForwardResult<Response> {
    if streaming {
        handler.handle_stream(&state.relay, ctx, body).await
    } else {
        let value = handler.handle_request(&state.relay, ctx, body).await?;
        Ok(Json(value).into_response())
    }
}

/// Anthropic messages endpoint
///
/// Route: POST /v1/messages
pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    match forward_messages(&state, &headers, &raw).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn forward_messages(
    state: &AppState,
    headers: &HeaderMap,
    raw: &[u8],
) -> ForwardResult<Response> {
    let api_key = middleware::extract_claude_api_key(headers)?;
    let body = middleware::parse_body(raw)?;
    log_inbound(state, "anthropic", &body);
    middleware::validate_claude_body(&body)?;

    let adapter_ctx = middleware::build_adapter_context(headers, body);
    let result = state.claude_adapters.transform(&adapter_ctx)?;
    let streaming = result.is_stream();

    let ctx = ForwardContext::new(
        Upstream::Anthropic,
        &state.settings.upstream.anthropic_base_url,
        api_key,
        adapter_ctx.request_id.clone().unwrap_or_default(),
        &result,
    );
    dispatch(&AnthropicHandler, state, ctx, result.body, streaming).await
}

/// OpenAI Responses endpoint
///
/// Route: POST /v1/responses
pub async fn responses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    match forward_responses(&state, &headers, &raw).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn forward_responses(
    state: &AppState,
    headers: &HeaderMap,
    raw: &[u8],
) -> ForwardResult<Response> {
    let api_key = middleware::extract_openai_api_key(headers)?;
    let body = middleware::parse_body(raw)?;
    log_inbound(state, "openai", &body);

    let adapter_ctx = middleware::build_adapter_context(headers, body);
    let result = state.codex_adapters.transform(&adapter_ctx)?;
    middleware::validate_responses_body(&result.body)?;
    let streaming = result.is_stream();

    let ctx = ForwardContext::new(
        Upstream::OpenAI,
        &state.settings.upstream.openai_base_url,
        api_key,
        adapter_ctx.request_id.clone().unwrap_or_default(),
        &result,
    );
    dispatch(&OpenAIHandler, state, ctx, result.body, streaming).await
}

/// Route: GET /v1
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "api": "responses",
        "version": "v1",
        "supported": true
    }))
}
