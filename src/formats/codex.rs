//! Codex CLI wire facts for the Responses API.

use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};

use crate::config::CodexEnvConfig;

pub const RESPONSES_PATH: &str = "/v1/responses";

pub const OPENAI_BETA: &str = "responses=experimental";
pub const USER_AGENT: &str = "codex_cli_rs/0.50.0 (Mac OS 26.0.1; arm64) ghostty/1.2.2";
pub const ORIGINATOR: &str = "codex_cli_rs";
pub const TASK_TYPE: &str = "standard";

/// Marker that identifies a synthesized environment-context message.
pub const ENV_CONTEXT_MARKER: &str = "<environment_context>";

pub const INSTRUCTIONS: &str = "You are Codex, based on GPT-5. You are running as a coding agent in the Codex CLI on a user's computer.

## General

- The arguments to `shell` will be passed to execvp(). Most terminal commands should be prefixed with [\"bash\", \"-lc\"].
- Always set the `workdir` param when using the shell function. Do not use `cd` unless absolutely necessary.
- When searching for text or files, prefer using `rg` or `rg --files` because `rg` is much faster than alternatives like `grep`.

## Editing constraints

- Default to ASCII when editing or creating files.
- Use `apply_patch` for single file edits.
- You may be in a dirty git worktree. NEVER revert existing changes you did not make unless explicitly requested.

## Plan tool

When using the planning tool, skip it for straightforward tasks, do not make single-step plans, and update the plan after completing one of the sub-tasks.

## Presenting your work

You are producing plain text that will later be styled by the CLI. Be concise; friendly coding teammate tone. Reference files with inline code paths so they are clickable.";

const APPLY_PATCH_GRAMMAR: &str = r#"start: begin_patch hunk+ end_patch
begin_patch: "*** Begin Patch" LF
end_patch: "*** End Patch" LF?

hunk: add_hunk | delete_hunk | update_hunk
add_hunk: "*** Add File: " filename LF add_line+
delete_hunk: "*** Delete File: " filename LF
update_hunk: "*** Update File: " filename LF change_move? change?

filename: /(.+)/
add_line: "+" /(.*)/ LF -> line

change_move: "*** Move to: " filename LF
change: (change_context | change_line)+ eof_line?
change_context: ("@@" | "@@ " /(.+)/) LF
change_line: ("+" | "-" | " ") /(.*)/ LF
eof_line: "*** End of File" LF

%import common.LF
"#;

/// Built-in tools the official CLI advertises on every request.
pub static DEFAULT_TOOLS: Lazy<Vec<Value>> = Lazy::new(|| {
    vec![
        json!({
            "type": "function",
            "name": "shell",
            "description": "Runs a shell command and returns its output.",
            "strict": false,
            "parameters": {
                "type": "object",
                "properties": {
                    "command": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "The command to execute"
                    },
                    "justification": {
                        "type": "string",
                        "description": "Only set if with_escalated_permissions is true. 1-sentence explanation of why we want to run this command."
                    },
                    "timeout_ms": {
                        "type": "number",
                        "description": "The timeout for the command in milliseconds"
                    },
                    "with_escalated_permissions": {
                        "type": "boolean",
                        "description": "Whether to request escalated permissions. Set to true if command needs to be run without sandbox restrictions"
                    },
                    "workdir": {
                        "type": "string",
                        "description": "The working directory to execute the command in"
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }
        }),
        json!({
            "type": "function",
            "name": "list_mcp_resources",
            "description": "Lists resources provided by MCP servers. Resources allow servers to share data that provides context to language models, such as files, database schemas, or application-specific information. Prefer resources over web search when possible.",
            "strict": false,
            "parameters": {
                "type": "object",
                "properties": {
                    "cursor": {
                        "type": "string",
                        "description": "Opaque cursor returned by a previous list_mcp_resources call for the same server."
                    },
                    "server": {
                        "type": "string",
                        "description": "Optional MCP server name. When omitted, lists resources from every configured server."
                    }
                },
                "additionalProperties": false
            }
        }),
        json!({
            "type": "function",
            "name": "list_mcp_resource_templates",
            "description": "Lists resource templates provided by MCP servers. Parameterized resource templates allow servers to share data that takes parameters and provides context to language models, such as files, database schemas, or application-specific information. Prefer resource templates over web search when possible.",
            "strict": false,
            "parameters": {
                "type": "object",
                "properties": {
                    "cursor": {
                        "type": "string",
                        "description": "Opaque cursor returned by a previous list_mcp_resource_templates call for the same server."
                    },
                    "server": {
                        "type": "string",
                        "description": "Optional MCP server name. When omitted, lists resource templates from all configured servers."
                    }
                },
                "additionalProperties": false
            }
        }),
        json!({
            "type": "function",
            "name": "read_mcp_resource",
            "description": "Read a specific resource from an MCP server given the server name and resource URI.",
            "strict": false,
            "parameters": {
                "type": "object",
                "properties": {
                    "server": {
                        "type": "string",
                        "description": "MCP server name exactly as configured. Must match the 'server' field returned by list_mcp_resources."
                    },
                    "uri": {
                        "type": "string",
                        "description": "Resource URI to read. Must be one of the URIs returned by list_mcp_resources."
                    }
                },
                "required": ["server", "uri"],
                "additionalProperties": false
            }
        }),
        json!({
            "type": "function",
            "name": "update_plan",
            "description": "Updates the task plan.\nProvide an optional explanation and a list of plan items, each with a step and status.\nAt most one step can be in_progress at a time.\n",
            "strict": false,
            "parameters": {
                "type": "object",
                "properties": {
                    "explanation": {"type": "string"},
                    "plan": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "status": {
                                    "type": "string",
                                    "description": "One of: pending, in_progress, completed"
                                },
                                "step": {"type": "string"}
                            },
                            "required": ["step", "status"],
                            "additionalProperties": false
                        },
                        "description": "The list of steps"
                    }
                },
                "required": ["plan"],
                "additionalProperties": false
            }
        }),
        json!({
            "type": "custom",
            "name": "apply_patch",
            "description": "Use the `apply_patch` tool to edit files. This is a FREEFORM tool, so do not wrap the patch in JSON.",
            "format": {
                "type": "grammar",
                "syntax": "lark",
                "definition": APPLY_PATCH_GRAMMAR
            }
        }),
        json!({
            "type": "function",
            "name": "view_image",
            "description": "Attach a local image (by filesystem path) to the conversation context for this turn.",
            "strict": false,
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Local filesystem path to an image file"
                    }
                },
                "required": ["path"],
                "additionalProperties": false
            }
        }),
    ]
});

/// Outbound headers matching the official CLI. `extra` is applied last and
/// may override any of the fixed values.
pub fn build_headers(api_key: &str, extra: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
        headers.insert("authorization", value);
    }
    headers.insert("openai-beta", HeaderValue::from_static(OPENAI_BETA));
    headers.insert("accept", HeaderValue::from_static("text/event-stream"));
    headers.insert("codex-task-type", HeaderValue::from_static(TASK_TYPE));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    headers.insert("originator", HeaderValue::from_static(ORIGINATOR));

    for (name, value) in extra {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        headers.insert(name, value);
    }

    headers
}

/// The user message the official CLI sends first in every conversation.
pub fn environment_context_message(env: &CodexEnvConfig) -> Value {
    let text = format!(
        "{marker}\n  <cwd>{}</cwd>\n  <approval_policy>{}</approval_policy>\n  <sandbox_mode>{}</sandbox_mode>\n  <network_access>{}</network_access>\n  <shell>{}</shell>\n</environment_context>",
        env.cwd,
        env.approval_policy,
        env.sandbox_mode,
        env.network_access,
        env.shell,
        marker = ENV_CONTEXT_MARKER,
    );

    json!({
        "type": "message",
        "role": "user",
        "content": [{"type": "input_text", "text": text}]
    })
}

/// True when the first message's first content block already carries the
/// environment-context marker.
pub fn has_environment_context(input: &[Value]) -> bool {
    input
        .first()
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .map(|text| text.contains(ENV_CONTEXT_MARKER))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tools_are_named_and_typed() {
        let names: Vec<&str> = DEFAULT_TOOLS
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .collect();
        assert_eq!(
            names,
            vec![
                "shell",
                "list_mcp_resources",
                "list_mcp_resource_templates",
                "read_mcp_resource",
                "update_plan",
                "apply_patch",
                "view_image"
            ]
        );
        assert!(DEFAULT_TOOLS
            .iter()
            .all(|t| t.get("type").and_then(Value::as_str).is_some()));
    }

    #[test]
    fn extra_headers_override_fixed_ones() {
        let extra = vec![
            ("conversation_id".to_string(), "abc".to_string()),
            ("accept".to_string(), "application/json".to_string()),
            ("bad header".to_string(), "ignored".to_string()),
        ];
        let headers = build_headers("sk-test", &extra);

        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert_eq!(headers["originator"], "codex_cli_rs");
        assert_eq!(headers["conversation_id"], "abc");
        assert_eq!(headers["accept"], "application/json");
        assert_eq!(headers.len(), 8);
    }

    #[test]
    fn environment_message_is_detected() {
        let env = CodexEnvConfig::default();
        let msg = environment_context_message(&env);
        let text = msg["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with(ENV_CONTEXT_MARKER));
        assert!(text.contains("<cwd>/home/user</cwd>"));
        assert!(text.contains("<shell>bash</shell>"));

        assert!(has_environment_context(&[msg]));
        assert!(!has_environment_context(&[]));
        assert!(!has_environment_context(&[json!({"role": "user", "content": "x"})]));
    }
}
