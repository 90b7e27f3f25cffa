use serde_json::{json, Value};

use super::{JsonBody, StepError, TargetApi, TransformContext, Transformer};

/// Prompt to inject: a plain string or a list of content blocks.
#[derive(Debug, Clone)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<Value>),
}

impl SystemPrompt {
    fn as_blocks(&self) -> Vec<Value> {
        match self {
            SystemPrompt::Text(text) => vec![json!({"type": "text", "text": text})],
            SystemPrompt::Blocks(blocks) => blocks.clone(),
        }
    }

    fn as_instructions(&self) -> String {
        match self {
            SystemPrompt::Text(text) => text.clone(),
            SystemPrompt::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => obj.get("text").map(super::scalar_text),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Puts the configured prompt ahead of whatever system content the caller
/// sent (claude), or replaces `instructions` outright (openai).
pub struct SystemPromptInjector {
    prompt: SystemPrompt,
}

impl SystemPromptInjector {
    pub fn new(prompt: SystemPrompt) -> Self {
        Self { prompt }
    }
}

impl Transformer for SystemPromptInjector {
    fn name(&self) -> &'static str {
        "system_prompt"
    }

    fn transform(&self, mut data: JsonBody, ctx: &mut TransformContext) -> Result<JsonBody, StepError> {
        match ctx.target {
            TargetApi::Claude => {
                let existing = match data.remove("system") {
                    Some(Value::String(text)) => vec![json!({"type": "text", "text": text})],
                    Some(Value::Array(blocks)) => blocks,
                    _ => Vec::new(),
                };
                let mut system = self.prompt.as_blocks();
                system.extend(existing);
                data.insert("system".to_string(), Value::Array(system));
            }
            TargetApi::OpenAI => {
                data.insert(
                    "instructions".to_string(),
                    Value::String(self.prompt.as_instructions()),
                );
            }
        }
        Ok(data)
    }

    fn validate(&self, data: &JsonBody) -> bool {
        data.get("system").map_or(true, Value::is_array)
            && data.get("instructions").map_or(true, Value::is_string)
    }
}
