use serde_json::Value;

use crate::config::CodexEnvConfig;
use crate::formats::codex;

use super::{JsonBody, StepError, TargetApi, TransformContext, Transformer};

/// Prepends the environment-context user message unless the first message
/// already carries it. Running it twice inserts one message.
pub struct EnvironmentContextInjector {
    env: CodexEnvConfig,
}

impl EnvironmentContextInjector {
    pub fn new(env: CodexEnvConfig) -> Self {
        Self { env }
    }
}

impl Transformer for EnvironmentContextInjector {
    fn name(&self) -> &'static str {
        "environment_context"
    }

    fn transform(&self, mut data: JsonBody, ctx: &mut TransformContext) -> Result<JsonBody, StepError> {
        if ctx.target != TargetApi::OpenAI {
            return Ok(data);
        }

        let input = data
            .entry("input")
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(messages) = input else {
            return Err("input must be a list of messages".into());
        };

        if !codex::has_environment_context(messages) {
            messages.insert(0, codex::environment_context_message(&self.env));
        }
        Ok(data)
    }

    fn validate(&self, data: &JsonBody) -> bool {
        data.get("input")
            .and_then(Value::as_array)
            .map_or(true, |messages| codex::has_environment_context(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx(target: TargetApi) -> TransformContext {
        TransformContext::new(target, "test", HashMap::new())
    }

    #[test]
    fn injects_once_across_repeated_runs() {
        let step = EnvironmentContextInjector::new(CodexEnvConfig::default());
        let body = json!({"input": [
            {"type": "message", "role": "user", "content": [{"type": "input_text", "text": "hi"}]}
        ]})
        .as_object()
        .cloned()
        .unwrap();

        let once = step.transform(body, &mut ctx(TargetApi::OpenAI)).unwrap();
        let twice = step.transform(once.clone(), &mut ctx(TargetApi::OpenAI)).unwrap();
        assert!(step.validate(&twice));
        assert_eq!(once, twice);

        let input = twice["input"].as_array().unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input[1]["content"][0]["text"], json!("hi"));
    }

    #[test]
    fn missing_input_gets_marker_only() {
        let step = EnvironmentContextInjector::new(CodexEnvConfig::default());
        let out = step.transform(JsonBody::new(), &mut ctx(TargetApi::OpenAI)).unwrap();
        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert!(codex::has_environment_context(input));
    }

    #[test]
    fn string_input_fails_the_step() {
        let step = EnvironmentContextInjector::new(CodexEnvConfig::default());
        let body = json!({"input": "hello"}).as_object().cloned().unwrap();
        assert!(step.transform(body, &mut ctx(TargetApi::OpenAI)).is_err());
    }

    #[test]
    fn claude_target_skipped() {
        let step = EnvironmentContextInjector::new(CodexEnvConfig::default());
        let out = step.transform(JsonBody::new(), &mut ctx(TargetApi::Claude)).unwrap();
        assert!(out.is_empty());
    }
}
