//! Client adapters
//!
//! An adapter recognises one inbound client dialect and rewrites its body for
//! the upstream. Adapters are registered once at startup into an
//! [`AdapterRegistry`] per upstream; the registry picks the first adapter
//! (by priority) whose `detect` matches, falling back to [`DefaultAdapter`].

pub mod anthropic;
pub mod openai;
pub mod registry;

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::transform::{JsonBody, TransformError};

pub use registry::{AdapterInfo, AdapterRegistry, RegistryError};

/// Priority reserved for the fallback adapter.
pub const DEFAULT_PRIORITY: i32 = i32::MIN;

/// Inbound request as seen by adapters. Header names are lower-case.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub raw_body: JsonBody,
    pub raw_headers: HashMap<String, String>,
    pub client_ip: Option<String>,
    pub request_id: Option<String>,
}

impl AdapterContext {
    pub fn new(raw_body: JsonBody, raw_headers: HashMap<String, String>) -> Self {
        Self {
            raw_body,
            raw_headers,
            client_ip: None,
            request_id: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw_headers.get(name).map(String::as_str)
    }

    /// Case-insensitive substring test against a header value.
    pub fn header_contains(&self, name: &str, needle: &str) -> bool {
        self.header(name)
            .map(|v| v.to_lowercase().contains(needle))
            .unwrap_or(false)
    }
}

/// What an adapter hands back to the forwarding layer.
#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    pub body: JsonBody,
    pub extra_headers: Vec<(String, String)>,
    pub metadata: Map<String, Value>,
}

impl TransformResult {
    pub fn passthrough(body: JsonBody) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    pub fn extra_header(&self, name: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `stream: true` in the final body.
    pub fn is_stream(&self) -> bool {
        self.body.get("stream").and_then(Value::as_bool).unwrap_or(false)
    }
}

pub trait ClientAdapter: Send + Sync {
    /// Unique within a registry
    fn name(&self) -> &'static str;

    /// Higher wins
    fn priority(&self) -> i32;

    fn version(&self) -> &'static str;

    /// Must be pure: the same context always gives the same answer.
    fn detect(&self, ctx: &AdapterContext) -> bool;

    fn transform(&self, ctx: &AdapterContext) -> Result<TransformResult, TransformError>;
}

/// Matches everything. Copies the body and coerces `stream` to a boolean.
pub struct DefaultAdapter;

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

impl ClientAdapter for DefaultAdapter {
    fn name(&self) -> &'static str {
        "default"
    }

    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn detect(&self, _ctx: &AdapterContext) -> bool {
        true
    }

    fn transform(&self, ctx: &AdapterContext) -> Result<TransformResult, TransformError> {
        let mut body = ctx.raw_body.clone();
        let stream = body.get("stream").map_or(false, truthy);
        body.insert("stream".to_string(), Value::Bool(stream));

        let mut result = TransformResult::passthrough(body);
        result
            .metadata
            .insert("adapter".to_string(), Value::String(self.name().to_string()));
        Ok(result)
    }
}
