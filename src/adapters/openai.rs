//! Adapters for the Responses API (openai upstream).

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::CodexEnvConfig;
use crate::formats::codex;
use crate::session::CodexSessionCache;
use crate::transform::{
    EnvironmentContextInjector, FieldResolver, MessageNormalizer, SessionSource, SessionStamper,
    SystemPrompt, SystemPromptInjector, TargetApi, TransformContext, TransformError,
    TransformPipeline, ToolsMerger,
};

use super::{AdapterContext, AdapterRegistry, ClientAdapter, RegistryError, TransformResult};

pub struct CodexCliAdapter;

impl ClientAdapter for CodexCliAdapter {
    fn name(&self) -> &'static str {
        "codex_cli"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn detect(&self, ctx: &AdapterContext) -> bool {
        ctx.header_contains("user-agent", codex::ORIGINATOR)
            || ctx.header_contains("originator", codex::ORIGINATOR)
    }

    fn transform(&self, ctx: &AdapterContext) -> Result<TransformResult, TransformError> {
        let mut result = TransformResult::passthrough(ctx.raw_body.clone());
        result.metadata.insert("adapter".to_string(), json!(self.name()));
        result.metadata.insert("official_client".to_string(), json!(true));
        result.metadata.insert("passthrough".to_string(), json!(true));
        Ok(result)
    }
}

/// Cherry Studio talking to the Responses API. Its chat-style bodies are
/// rebuilt into what the Codex CLI would have sent.
pub struct CherryStudioAdapter {
    pipeline: TransformPipeline,
}

impl CherryStudioAdapter {
    pub fn new(sessions: Arc<CodexSessionCache>, env: CodexEnvConfig) -> Self {
        let pipeline = TransformPipeline::new(vec![
            Arc::new(SystemPromptInjector::new(SystemPrompt::Text(
                codex::INSTRUCTIONS.to_string(),
            ))),
            Arc::new(MessageNormalizer),
            Arc::new(ToolsMerger::new(codex::DEFAULT_TOOLS.clone())),
            Arc::new(FieldResolver),
            Arc::new(SessionStamper::new(SessionSource::Codex(sessions))),
            Arc::new(EnvironmentContextInjector::new(env)),
        ]);
        Self { pipeline }
    }
}

impl ClientAdapter for CherryStudioAdapter {
    fn name(&self) -> &'static str {
        "cherry_studio"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn version(&self) -> &'static str {
        "3.0.0"
    }

    fn detect(&self, ctx: &AdapterContext) -> bool {
        ctx.header_contains("user-agent", "cherrystudio")
    }

    fn transform(&self, ctx: &AdapterContext) -> Result<TransformResult, TransformError> {
        let mut tctx = TransformContext::new(TargetApi::OpenAI, self.name(), ctx.raw_headers.clone());
        let body = self.pipeline.execute(&ctx.raw_body, &mut tctx)?;

        let mut result = TransformResult::passthrough(body);
        for key in ["conversation_id", "session_id"] {
            if let Some(id) = tctx.metadata_str(key) {
                result.extra_headers.push((key.to_string(), id.to_string()));
                result.metadata.insert(key.to_string(), json!(id));
            }
        }

        let has_reasoning = result.body.contains_key("reasoning");
        crate::logger::info(
            "cherry_studio",
            &format!(
                "Transformed responses request: input_items={}, tools={}, conversation_id={}",
                result.body.get("input").and_then(Value::as_array).map_or(0, Vec::len),
                result.body.get("tools").and_then(Value::as_array).map_or(0, Vec::len),
                tctx.metadata_str("conversation_id").unwrap_or("-")
            ),
        );

        result.metadata.insert("adapter".to_string(), json!(self.name()));
        result.metadata.insert("version".to_string(), json!(self.version()));
        result
            .metadata
            .insert("reasoning_enabled".to_string(), json!(has_reasoning));
        Ok(result)
    }
}

/// Registry for `/v1/responses`: Codex CLI, then Cherry Studio, then the
/// default.
pub fn codex_registry(
    sessions: Arc<CodexSessionCache>,
    env: CodexEnvConfig,
) -> Result<AdapterRegistry, RegistryError> {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(CodexCliAdapter))?;
    registry.register(Arc::new(CherryStudioAdapter::new(sessions, env)))?;
    Ok(registry)
}
