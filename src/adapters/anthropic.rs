//! Adapters for the Messages API (claude upstream).

use std::sync::Arc;

use serde_json::{json, Value};

use crate::formats::claude_code;
use crate::session::ClaudeSessionCache;
use crate::transform::{
    FieldResolver, JsonBody, SessionSource, SessionStamper, SystemPrompt, SystemPromptInjector,
    TargetApi, TransformContext, TransformError, TransformPipeline,
};

use super::{AdapterContext, AdapterRegistry, ClientAdapter, RegistryError, TransformResult};

/// The official CLI already speaks the upstream dialect.
pub struct ClaudeCodeAdapter;

impl ClientAdapter for ClaudeCodeAdapter {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn detect(&self, ctx: &AdapterContext) -> bool {
        ctx.header_contains("user-agent", "claude-cli")
            || ctx.header_contains("anthropic-beta", "claude-code-")
    }

    fn transform(&self, ctx: &AdapterContext) -> Result<TransformResult, TransformError> {
        let mut result = TransformResult::passthrough(ctx.raw_body.clone());
        result.metadata.insert("adapter".to_string(), json!(self.name()));
        result.metadata.insert("official_client".to_string(), json!(true));
        result.metadata.insert("passthrough".to_string(), json!(true));
        Ok(result)
    }
}

/// Cherry Studio talking to the Messages API: inject the official system
/// prompt, stamp a 12h session id and mark the tail for prompt caching.
pub struct CherryStudioAdapter {
    pipeline: TransformPipeline,
}

impl CherryStudioAdapter {
    pub fn new(sessions: Arc<ClaudeSessionCache>) -> Self {
        let pipeline = TransformPipeline::new(vec![
            Arc::new(SystemPromptInjector::new(SystemPrompt::Blocks(
                claude_code::official_system_blocks(),
            ))),
            Arc::new(FieldResolver),
            Arc::new(SessionStamper::new(SessionSource::Claude(sessions))),
        ]);
        Self { pipeline }
    }
}

/// `cache_control: ephemeral` on the last block of the last message, when
/// that message's content is a block list.
fn mark_cache_breakpoint(body: &mut JsonBody) -> bool {
    let last_block = body
        .get_mut("messages")
        .and_then(Value::as_array_mut)
        .and_then(|messages| messages.last_mut())
        .and_then(|msg| msg.get_mut("content"))
        .and_then(Value::as_array_mut)
        .and_then(|blocks| blocks.last_mut())
        .and_then(Value::as_object_mut);

    match last_block {
        Some(block) => {
            block.insert("cache_control".to_string(), json!({"type": "ephemeral"}));
            true
        }
        None => false,
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
        let mut tctx = TransformContext::new(TargetApi::Claude, self.name(), ctx.raw_headers.clone());
        let mut body = self.pipeline.execute(&ctx.raw_body, &mut tctx)?;

        let cached = mark_cache_breakpoint(&mut body);
        let thinking_enabled = body.contains_key("thinking");
        let user_id = body
            .get("metadata")
            .and_then(|m| m.get("user_id"))
            .cloned()
            .unwrap_or(Value::Null);

        crate::logger::info(
            "cherry_studio",
            &format!(
                "Transformed claude request: system_blocks={}, thinking={}, cache_breakpoint={}",
                body.get("system").and_then(Value::as_array).map_or(0, Vec::len),
                thinking_enabled,
                cached
            ),
        );

        let mut result = TransformResult::passthrough(body);
        result.extra_headers.push((
            "anthropic-beta".to_string(),
            claude_code::PROMPT_CACHING_BETA.to_string(),
        ));
        result.metadata.insert("adapter".to_string(), json!(self.name()));
        result.metadata.insert("version".to_string(), json!(self.version()));
        result.metadata.insert("session_id".to_string(), user_id);
        result
            .metadata
            .insert("thinking_enabled".to_string(), json!(thinking_enabled));
        Ok(result)
    }
}

/// Registry for `/v1/messages`: official CLI, then Cherry Studio, then the
/// default.
pub fn claude_registry(sessions: Arc<ClaudeSessionCache>) -> Result<AdapterRegistry, RegistryError> {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(ClaudeCodeAdapter))?;
    registry.register(Arc::new(CherryStudioAdapter::new(sessions)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx(headers: &[(&str, &str)], body: Value) -> AdapterContext {
        let headers: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AdapterContext::new(body.as_object().cloned().unwrap(), headers)
    }

    fn registry() -> AdapterRegistry {
        claude_registry(Arc::new(ClaudeSessionCache::claude(43200))).unwrap()
    }

    #[test]
    fn detection_by_header() {
        let r = registry();
        let body = json!({});
        assert_eq!(
            r.select(&ctx(&[("user-agent", "claude-cli/2.0.24 (external, cli)")], body.clone())).name(),
            "claude_code"
        );
        assert_eq!(
            r.select(&ctx(&[("anthropic-beta", "Claude-Code-20250219")], body.clone())).name(),
            "claude_code"
        );
        assert_eq!(
            r.select(&ctx(&[("user-agent", "Mozilla CherryStudio/1.6")], body.clone())).name(),
            "cherry_studio"
        );
        assert_eq!(r.select(&ctx(&[("user-agent", "curl/8")], body)).name(), "default");
    }

    #[test]
    fn official_client_is_passthrough() {
        let body = json!({"model": "claude-sonnet", "messages": [], "stream": "maybe"});
        let context = ctx(&[("user-agent", "claude-cli/2.0")], body.clone());
        let result = registry().transform(&context).unwrap();
        assert_eq!(Value::Object(result.body), body);
        assert!(result.extra_headers.is_empty());
        assert_eq!(result.metadata["passthrough"], json!(true));
    }

    #[test]
    fn cherry_studio_rewrites_for_claude() {
        let body = json!({
            "model": "claude-sonnet",
            "system": "be brief",
            "thinking": {"type": "enabled", "budget_tokens": 1024},
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "user", "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}
            ]
        });
        let context = ctx(&[("user-agent", "CherryStudio/1.6")], body);
        let result = registry().transform(&context).unwrap();

        let system = result.body["system"].as_array().unwrap();
        assert_eq!(system.len(), 2);
        assert_eq!(system[0]["text"], json!(claude_code::OFFICIAL_SYSTEM_TEXT));
        assert_eq!(system[1], json!({"type": "text", "text": "be brief"}));

        let last = &result.body["messages"][1]["content"];
        assert_eq!(last[1]["cache_control"], json!({"type": "ephemeral"}));
        assert!(last[0].get("cache_control").is_none());

        let user_id = result.body["metadata"]["user_id"].as_str().unwrap();
        assert!(user_id.starts_with("user_proxy_account__session_"));
        assert_eq!(result.metadata["session_id"], json!(user_id));
        assert_eq!(result.metadata["thinking_enabled"], json!(true));
        assert_eq!(
            result.extra_header("anthropic-beta"),
            Some(claude_code::PROMPT_CACHING_BETA)
        );
        // claude target leaves the openai fields alone
        assert!(!result.body.contains_key("reasoning"));
    }

    #[test]
    fn string_content_gets_no_breakpoint() {
        let mut body = json!({"messages": [{"role": "user", "content": "plain"}]})
            .as_object()
            .cloned()
            .unwrap();
        assert!(!mark_cache_breakpoint(&mut body));
        assert_eq!(body["messages"][0]["content"], json!("plain"));
    }
}
