use std::sync::Arc;

use serde_json::{Map, Value};

use crate::session::{ClaudeSessionCache, CodexSessionCache};

use super::{JsonBody, StepError, TargetApi, TransformContext, Transformer};

/// Which identity cache a stamper draws from.
#[derive(Clone)]
pub enum SessionSource {
    Claude(Arc<ClaudeSessionCache>),
    Codex(Arc<CodexSessionCache>),
}

/// Stamps the current windowed session identity onto the request.
///
/// claude: `metadata.user_id`. openai: `prompt_cache_key` in the body, plus
/// `conversation_id`/`session_id` published to the context for the
/// outbound headers.
pub struct SessionStamper {
    source: SessionSource,
}

impl SessionStamper {
    pub fn new(source: SessionSource) -> Self {
        Self { source }
    }
}

impl Transformer for SessionStamper {
    fn name(&self) -> &'static str {
        "session"
    }

    fn transform(&self, mut data: JsonBody, ctx: &mut TransformContext) -> Result<JsonBody, StepError> {
        match (ctx.target, &self.source) {
            (TargetApi::Claude, SessionSource::Claude(cache)) => {
                let session = cache.get();
                let metadata = data
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !metadata.is_object() {
                    *metadata = Value::Object(Map::new());
                }
                if let Value::Object(metadata) = metadata {
                    metadata.insert("user_id".to_string(), Value::String(session.user_id));
                }
            }
            (TargetApi::OpenAI, SessionSource::Codex(cache)) => {
                let session = cache.get();
                data.insert(
                    "prompt_cache_key".to_string(),
                    Value::String(session.prompt_cache_key),
                );
                ctx.publish("conversation_id", Value::String(session.conversation_id));
                ctx.publish("session_id", Value::String(session.session_id));
            }
            (target, _) => {
                return Err(format!("no session source configured for target {}", target).into());
            }
        }
        Ok(data)
    }

    fn validate(&self, data: &JsonBody) -> bool {
        match self.source {
            SessionSource::Claude(_) => data
                .get("metadata")
                .and_then(|m| m.get("user_id"))
                .map_or(false, Value::is_string),
            SessionSource::Codex(_) => data
                .get("prompt_cache_key")
                .map_or(false, Value::is_string),
        }
    }
}
