//! Forward middleware
//!
//! Credential extraction, inbound body checks and adapter-context assembly.

use axum::http::HeaderMap;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::adapters::AdapterContext;
use crate::transform::JsonBody;

use super::error::{ForwardError, ForwardResult};

/// Extract and trim a header value
fn extract_header_value(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `Bearer` is optional and matched case-insensitively; a lone `Bearer`
/// yields an empty token.
fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {
            let rest = &raw[6..];
            if rest.is_empty() || rest.starts_with(' ') {
                rest.trim()
            } else {
                raw
            }
        }
        _ => raw,
    }
}

/// Messages API credential.
///
/// Priority order:
/// 1. x-api-key
/// 2. Authorization, with or without a `Bearer ` prefix
pub fn extract_claude_api_key(headers: &HeaderMap) -> ForwardResult<String> {
    if let Some(key) = extract_header_value(headers, "x-api-key") {
        return Ok(key);
    }
    extract_openai_api_key(headers)
        .map_err(|_| ForwardError::Authentication("Missing API key".to_string()))
}

/// Responses API credential: Authorization only.
pub fn extract_openai_api_key(headers: &HeaderMap) -> ForwardResult<String> {
    let raw = extract_header_value(headers, "authorization")
        .ok_or_else(|| ForwardError::Authentication("Missing Authorization header".to_string()))?;
    let token = strip_bearer(&raw);
    if token.is_empty() {
        return Err(ForwardError::Authentication("Empty bearer token".to_string()));
    }
    Ok(token.to_string())
}

/// Snapshot the inbound request for adapter detection.
pub fn build_adapter_context(headers: &HeaderMap, body: JsonBody) -> AdapterContext {
    let raw_headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let client_ip = extract_header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty());
    let request_id = extract_header_value(headers, "x-request-id")
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut ctx = AdapterContext::new(body, raw_headers);
    ctx.client_ip = client_ip;
    ctx.request_id = Some(request_id);
    ctx
}

/// Parse the raw body as a JSON object.
pub fn parse_body(bytes: &[u8]) -> ForwardResult<JsonBody> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ForwardError::invalid("Request body must be a JSON object")),
        Err(e) => Err(ForwardError::InvalidRequest {
            message: "Request body is not valid JSON".to_string(),
            details: Some(json!({ "error": e.to_string() })),
        }),
    }
}

fn missing(field: &str, expected: &str) -> ForwardError {
    ForwardError::InvalidRequest {
        message: format!("Field '{}' is required and must be {}", field, expected),
        details: Some(json!({ "field": field })),
    }
}

fn check_optional_bool(body: &JsonBody, field: &str) -> ForwardResult<()> {
    match body.get(field) {
        None | Some(Value::Bool(_)) => Ok(()),
        Some(_) => Err(missing(field, "a boolean")),
    }
}

/// Shape check for `/v1/messages` bodies.
pub fn validate_claude_body(body: &JsonBody) -> ForwardResult<()> {
    if !body.get("model").map_or(false, Value::is_string) {
        return Err(missing("model", "a string"));
    }
    if !body.get("messages").map_or(false, Value::is_array) {
        return Err(missing("messages", "an array"));
    }
    if let Some(max_tokens) = body.get("max_tokens") {
        if !max_tokens.as_u64().map_or(false, |n| n > 0) {
            return Err(missing("max_tokens", "a positive integer"));
        }
    }
    check_optional_bool(body, "stream")
}

/// Shape check for `/v1/responses` bodies, applied after transformation.
pub fn validate_responses_body(body: &JsonBody) -> ForwardResult<()> {
    if !body.get("model").map_or(false, Value::is_string) {
        return Err(missing("model", "a string"));
    }
    match body.get("input") {
        Some(Value::String(_)) | Some(Value::Array(_)) => {}
        _ => return Err(missing("input", "a string or an array")),
    }
    check_optional_bool(body, "stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(*v));
        }
        map
    }

    fn obj(v: Value) -> JsonBody {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn claude_key_prefers_x_api_key() {
        let h = headers(&[("x-api-key", " sk-a "), ("authorization", "Bearer sk-b")]);
        assert_eq!(extract_claude_api_key(&h).unwrap(), "sk-a");

        let h = headers(&[("authorization", "Bearer sk-b")]);
        assert_eq!(extract_claude_api_key(&h).unwrap(), "sk-b");

        let h = headers(&[("authorization", "sk-raw")]);
        assert_eq!(extract_claude_api_key(&h).unwrap(), "sk-raw");

        assert!(matches!(
            extract_claude_api_key(&HeaderMap::new()),
            Err(ForwardError::Authentication(_))
        ));
    }

    #[test]
    fn openai_key_ignores_x_api_key() {
        let h = headers(&[("x-api-key", "sk-a")]);
        assert!(extract_openai_api_key(&h).is_err());

        let h = headers(&[("authorization", "bearer sk-c")]);
        assert_eq!(extract_openai_api_key(&h).unwrap(), "sk-c");

        let h = headers(&[("authorization", "Bearer  ")]);
        assert!(matches!(
            extract_openai_api_key(&h),
            Err(ForwardError::Authentication(_))
        ));
    }

    #[test]
    fn adapter_context_from_headers() {
        let h = headers(&[
            ("user-agent", "CherryStudio/1.6"),
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("x-request-id", "req-1"),
        ]);
        let ctx = build_adapter_context(&h, obj(json!({"model": "m"})));
        assert_eq!(ctx.header("user-agent"), Some("CherryStudio/1.6"));
        assert_eq!(ctx.client_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));

        let ctx = build_adapter_context(&HeaderMap::new(), JsonBody::new());
        assert!(ctx.client_ip.is_none());
        assert!(uuid::Uuid::parse_str(ctx.request_id.as_deref().unwrap()).is_ok());
    }

    #[test]
    fn parse_body_requires_object() {
        assert!(parse_body(br#"{"a":1}"#).is_ok());
        assert!(parse_body(b"[1]").is_err());
        assert!(matches!(
            parse_body(b"{nope"),
            Err(ForwardError::InvalidRequest { details: Some(_), .. })
        ));
    }

    #[test]
    fn claude_body_validation() {
        assert!(validate_claude_body(&obj(json!({"model": "m", "messages": []}))).is_ok());
        assert!(validate_claude_body(&obj(json!({"messages": []}))).is_err());
        assert!(validate_claude_body(&obj(json!({"model": "m", "messages": {}}))).is_err());
        assert!(validate_claude_body(&obj(
            json!({"model": "m", "messages": [], "max_tokens": 0})
        ))
        .is_err());
        assert!(validate_claude_body(&obj(
            json!({"model": "m", "messages": [], "stream": "yes"})
        ))
        .is_err());
    }

    #[test]
    fn responses_body_validation() {
        assert!(validate_responses_body(&obj(json!({"model": "m", "input": "hi"}))).is_ok());
        assert!(validate_responses_body(&obj(json!({"model": "m", "input": []}))).is_ok());
        assert!(validate_responses_body(&obj(json!({"model": "m", "input": 3}))).is_err());
        assert!(validate_responses_body(&obj(json!({"input": "hi"}))).is_err());
    }
}
