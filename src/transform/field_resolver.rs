use serde_json::{json, Value};

use super::{JsonBody, StepError, TargetApi, TransformContext, Transformer};

const ENCRYPTED_REASONING: &str = "reasoning.encrypted_content";

/// Fills in the Responses-API request fields the official CLI always sends.
///
/// Only the openai target is touched. Fields are normalised only when the
/// caller supplied them; `stream` is always forced on.
pub struct FieldResolver;

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn resolve_reasoning(caller: Option<&Value>) -> Value {
    let effort = caller
        .and_then(|r| r.get("effort"))
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .filter(|e| matches!(e.as_str(), "low" | "medium" | "high"))
        .unwrap_or_else(|| "high".to_string());
    let summary = non_empty_str(caller.and_then(|r| r.get("summary"))).unwrap_or("auto");

    json!({"effort": effort, "summary": summary})
}

fn resolve_include(caller: Option<&Value>) -> Value {
    let mut include = vec![ENCRYPTED_REASONING.to_string()];
    if let Some(items) = caller.and_then(Value::as_array) {
        for item in items.iter().filter_map(Value::as_str) {
            if !item.is_empty() && !include.iter().any(|i| i == item) {
                include.push(item.to_string());
            }
        }
    }
    json!(include)
}

fn bool_or_false(value: Option<&Value>) -> Value {
    Value::Bool(value.and_then(Value::as_bool).unwrap_or(false))
}

impl Transformer for FieldResolver {
    fn name(&self) -> &'static str {
        "field_resolver"
    }

    fn transform(&self, mut data: JsonBody, ctx: &mut TransformContext) -> Result<JsonBody, StepError> {
        if ctx.target != TargetApi::OpenAI {
            return Ok(data);
        }

        if data.contains_key("tool_choice") {
            let tool_choice = non_empty_str(data.get("tool_choice")).unwrap_or("auto").to_string();
            data.insert("tool_choice".to_string(), Value::String(tool_choice));
        }
        if data.contains_key("parallel_tool_calls") {
            let parallel = bool_or_false(data.get("parallel_tool_calls"));
            data.insert("parallel_tool_calls".to_string(), parallel);
        }
        if data.contains_key("reasoning") {
            let reasoning = resolve_reasoning(data.get("reasoning"));
            data.insert("reasoning".to_string(), reasoning);
        }
        if data.contains_key("include") {
            let include = resolve_include(data.get("include"));
            data.insert("include".to_string(), include);
        }
        data.insert("stream".to_string(), Value::Bool(true));
        if data.contains_key("store") {
            let store = bool_or_false(data.get("store"));
            data.insert("store".to_string(), store);
        }

        Ok(data)
    }

    fn validate(&self, data: &JsonBody) -> bool {
        // only fields this step normalises are checked; claude bodies carry neither
        let include_ok = data.get("include").map_or(true, |include| {
            include
                .as_array()
                .and_then(|items| items.first())
                .and_then(Value::as_str)
                == Some(ENCRYPTED_REASONING)
        });
        let reasoning_ok = data
            .get("reasoning")
            .map_or(true, |r| r.get("effort").map_or(false, Value::is_string));
        include_ok && reasoning_ok
    }
}
