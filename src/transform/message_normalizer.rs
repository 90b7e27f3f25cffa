//! Canonical Responses-API message list.
//!
//! Third-party clients send `input` as a bare string, a list of strings, or a
//! list of chat-style messages with string content and roles the upstream
//! rejects. Everything comes out as
//! `{"type": "message", "role": .., "content": [blocks]}`.

use serde_json::{json, Map, Value};

use super::{scalar_text, JsonBody, StepError, TargetApi, TransformContext, Transformer};

pub struct MessageNormalizer;

fn normalize_role(role: Option<&Value>) -> String {
    let Some(role) = role.and_then(Value::as_str) else {
        return "user".to_string();
    };
    match role.to_lowercase().as_str() {
        r @ ("assistant" | "user" | "tool") => r.to_string(),
        // developer/system and anything unrecognised
        _ => "user".to_string(),
    }
}

fn text_block(text: String) -> Value {
    json!({"type": "input_text", "text": text})
}

fn normalize_content(content: Option<Value>) -> Vec<Value> {
    let mut blocks = match content {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(_) => item,
                other => text_block(scalar_text(&other)),
            })
            .collect(),
        Some(Value::String(text)) => vec![text_block(text)],
        Some(other) => vec![text_block(scalar_text(&other))],
    };

    if blocks.is_empty() {
        blocks.push(text_block(String::new()));
    }
    blocks
}

fn user_message(text: String) -> Value {
    json!({
        "type": "message",
        "role": "user",
        "content": [text_block(text)]
    })
}

fn normalize_message(mut msg: Map<String, Value>) -> Value {
    let role = normalize_role(msg.get("role"));
    let content = normalize_content(msg.remove("content"));

    let mut out = Map::new();
    out.insert("type".to_string(), json!("message"));
    out.insert("role".to_string(), Value::String(role));
    out.insert("content".to_string(), Value::Array(content));
    for (key, value) in msg {
        if !matches!(key.as_str(), "type" | "role" | "content") {
            out.insert(key, value);
        }
    }
    Value::Object(out)
}

impl Transformer for MessageNormalizer {
    fn name(&self) -> &'static str {
        "message_normalizer"
    }

    fn transform(&self, mut data: JsonBody, ctx: &mut TransformContext) -> Result<JsonBody, StepError> {
        if ctx.target != TargetApi::OpenAI {
            return Ok(data);
        }

        let normalized = match data.remove("input") {
            None => return Ok(data),
            Some(Value::String(text)) => vec![user_message(text)],
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(user_message(text)),
                    Value::Object(msg) => Some(normalize_message(msg)),
                    _ => None,
                })
                .collect(),
            // scalars and objects carry no messages
            Some(_) => Vec::new(),
        };

        data.insert("input".to_string(), Value::Array(normalized));
        Ok(data)
    }

    fn validate(&self, data: &JsonBody) -> bool {
        match data.get("input") {
            None => true,
            Some(Value::Array(items)) => items.iter().all(|m| {
                m.get("type").and_then(Value::as_str) == Some("message")
                    && m.get("role").and_then(Value::as_str).is_some()
                    && m.get("content").map_or(false, Value::is_array)
            }),
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn normalize(target: TargetApi, body: Value) -> JsonBody {
        let mut ctx = TransformContext::new(target, "test", HashMap::new());
        let out = MessageNormalizer
            .transform(body.as_object().cloned().unwrap(), &mut ctx)
            .unwrap();
        if target == TargetApi::OpenAI {
            assert!(MessageNormalizer.validate(&out));
        }
        out
    }

    #[test]
    fn bare_string_becomes_one_user_message() {
        let out = normalize(TargetApi::OpenAI, json!({"input": "hello"}));
        assert_eq!(
            out["input"],
            json!([{"type": "message", "role": "user", "content": [{"type": "input_text", "text": "hello"}]}])
        );
    }

    #[test]
    fn developer_and_unknown_roles_become_user() {
        let out = normalize(
            TargetApi::OpenAI,
            json!({"input": [
                {"role": "developer", "content": "sys"},
                {"role": "SYSTEM", "content": "s2"},
                {"role": "Assistant", "content": "a"},
                {"role": "narrator", "content": "n"},
                {"content": "no role"},
                {"role": 5, "content": "bad role"}
            ]}),
        );
        let roles: Vec<&str> = out["input"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "user", "assistant", "user", "user", "user"]);
    }

    #[test]
    fn content_blocks_are_coerced_and_extras_kept() {
        let out = normalize(
            TargetApi::OpenAI,
            json!({"input": [
                {"role": "user", "content": [{"type": "input_image", "image_url": "u"}, "txt", 3], "id": "m1"},
                {"role": "assistant", "content": null},
                {"role": "user", "content": []},
                "plain",
                42
            ]}),
        );
        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 4);
        assert_eq!(
            input[0]["content"],
            json!([
                {"type": "input_image", "image_url": "u"},
                {"type": "input_text", "text": "txt"},
                {"type": "input_text", "text": "3"}
            ])
        );
        assert_eq!(input[0]["id"], json!("m1"));
        assert_eq!(input[1]["content"], json!([{"type": "input_text", "text": ""}]));
        assert_eq!(input[2]["content"], json!([{"type": "input_text", "text": ""}]));
        assert_eq!(input[3]["content"][0]["text"], json!("plain"));
    }

    #[test]
    fn claude_target_is_untouched() {
        let out = normalize(TargetApi::Claude, json!({"input": "hello"}));
        assert_eq!(out["input"], json!("hello"));
    }

    #[test]
    fn non_list_input_becomes_empty_list() {
        for input in [json!({"role": "user"}), json!(42), json!(true)] {
            let out = normalize(TargetApi::OpenAI, json!({"model": "m", "input": input}));
            assert_eq!(out["input"], json!([]));
            assert_eq!(out["model"], json!("m"));
        }
    }
}
