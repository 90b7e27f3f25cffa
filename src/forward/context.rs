//! Forward context structures
//!
//! What the endpoint layer hands to an upstream handler once the adapter
//! has run.

use crate::adapters::TransformResult;

/// The two upstream dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Anthropic,
    OpenAI,
}

impl Upstream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Upstream::Anthropic => "anthropic",
            Upstream::OpenAI => "openai",
        }
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ForwardContext {
    pub upstream: Upstream,
    /// Base URL without the API path
    pub base_url: String,
    /// Caller's credential, forwarded as a bearer token
    pub api_key: String,
    pub request_id: String,
    /// Adapter-supplied headers, applied after the fixed ones
    pub extra_headers: Vec<(String, String)>,
    pub adapter: String,
}

impl ForwardContext {
    pub fn new(
        upstream: Upstream,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_id: impl Into<String>,
        result: &TransformResult,
    ) -> Self {
        Self {
            upstream,
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_id: request_id.into(),
            extra_headers: result.extra_headers.clone(),
            adapter: result
                .metadata
                .get("adapter")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        }
    }

    pub fn extra_header(&self, name: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_joins_without_double_slash() {
        let mut result = TransformResult::default();
        result.metadata.insert("adapter".into(), json!("cherry_studio"));
        result
            .extra_headers
            .push(("Anthropic-Beta".into(), "prompt-caching-2024-07-31".into()));

        let ctx = ForwardContext::new(Upstream::Anthropic, "http://up/", "k", "r", &result);
        assert_eq!(ctx.url("/v1/messages"), "http://up/v1/messages");
        assert_eq!(ctx.adapter, "cherry_studio");
        assert_eq!(ctx.extra_header("anthropic-beta"), Some("prompt-caching-2024-07-31"));
    }
}
