//! Transform pipeline
//!
//! Request bodies are rewritten by an ordered list of small, stateless
//! [`Transformer`] steps. Each step sees only the output of the step before
//! it; a step whose output fails its own validation aborts the pipeline.
//!
//! ```text
//! raw body --clone--> step 1 --validate--> step 2 --validate--> ... --> body
//!                       |                    |
//!                       +---- TransformContext (target, headers, metadata)
//! ```

pub mod environment_context;
pub mod field_resolver;
pub mod message_normalizer;
pub mod pipeline;
pub mod session;
pub mod system_prompt;
pub mod tools_merger;

use std::collections::HashMap;

use serde_json::{Map, Value};

pub use environment_context::EnvironmentContextInjector;
pub use field_resolver::FieldResolver;
pub use message_normalizer::MessageNormalizer;
pub use pipeline::TransformPipeline;
pub use session::{SessionSource, SessionStamper};
pub use system_prompt::{SystemPrompt, SystemPromptInjector};
pub use tools_merger::ToolsMerger;

/// Open, order-preserving JSON object used for request bodies.
pub type JsonBody = Map<String, Value>;

/// Error type a step may return from `transform`
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Upstream dialect a pipeline is producing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetApi {
    Claude,
    OpenAI,
}

impl TargetApi {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetApi::Claude => "claude",
            TargetApi::OpenAI => "openai",
        }
    }
}

impl std::fmt::Display for TargetApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-execution context shared by every step of one pipeline run.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub target: TargetApi,
    pub client_type: String,
    raw_headers: HashMap<String, String>,
    metadata: Map<String, Value>,
}

impl TransformContext {
    pub fn new(
        target: TargetApi,
        client_type: impl Into<String>,
        raw_headers: HashMap<String, String>,
    ) -> Self {
        Self {
            target,
            client_type: client_type.into(),
            raw_headers,
            metadata: Map::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw_headers.get(name).map(String::as_str)
    }

    /// Side channel for values the response layer needs but that must not go
    /// into the body. Entries are only ever added or overwritten.
    pub fn publish(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// One named, stateless rewrite step.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, data: JsonBody, ctx: &mut TransformContext) -> Result<JsonBody, StepError>;

    /// Checked after every `transform`; `false` aborts the pipeline.
    fn validate(&self, _data: &JsonBody) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Validation failed in transformer: {step}")]
    ValidationFailed { step: &'static str },

    #[error("Transformer '{step}' failed: {source}")]
    StepFailed {
        step: &'static str,
        #[source]
        source: StepError,
    },
}

impl TransformError {
    pub fn step(&self) -> &'static str {
        match self {
            TransformError::ValidationFailed { step } => step,
            TransformError::StepFailed { step, .. } => step,
        }
    }
}

/// Text rendering for scalar values that end up inside text blocks.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_publish_overwrites_but_never_drops() {
        let mut ctx = TransformContext::new(TargetApi::OpenAI, "test", HashMap::new());
        ctx.publish("conversation_id", json!("a"));
        ctx.publish("session_id", json!("b"));
        ctx.publish("conversation_id", json!("c"));

        assert_eq!(ctx.metadata().len(), 2);
        assert_eq!(ctx.metadata_str("conversation_id"), Some("c"));
        assert_eq!(ctx.metadata_str("session_id"), Some("b"));
    }

    #[test]
    fn scalar_text_keeps_strings_bare() {
        assert_eq!(scalar_text(&json!("hi")), "hi");
        assert_eq!(scalar_text(&json!(42)), "42");
        assert_eq!(scalar_text(&json!(true)), "true");
    }
}
