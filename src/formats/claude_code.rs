use serde_json::{json, Value};

pub const MESSAGES_PATH: &str = "/v1/messages";

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_BETA: &str = "claude-code-20250219";
pub const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";
pub const USER_AGENT: &str = "claude-cli/2.0.24 (external, cli)";

pub const OFFICIAL_SYSTEM_TEXT: &str = "You are Claude Code, Anthropic's official CLI for Claude.";

/// System blocks the official CLI prepends to every conversation.
pub fn official_system_blocks() -> Vec<Value> {
    vec![json!({
        "type": "text",
        "text": OFFICIAL_SYSTEM_TEXT,
        "cache_control": {"type": "ephemeral"}
    })]
}

/// Join the fixed beta marker with any adapter-supplied value, skipping
/// duplicates and blanks.
pub fn merge_beta(extra: Option<&str>) -> String {
    let mut parts: Vec<&str> = vec![ANTHROPIC_BETA];
    if let Some(extra) = extra {
        for part in extra.split(',').map(str::trim) {
            if !part.is_empty() && !parts.contains(&part) {
                parts.push(part);
            }
        }
    }
    parts.join(",")
}
