//! Fixed wire facts of the two upstream dialects: headers the official
//! clients send, their default prompts and tool sets.

pub mod claude_code;
pub mod codex;
