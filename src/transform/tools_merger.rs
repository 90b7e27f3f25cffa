use serde_json::Value;

use super::{JsonBody, StepError, TransformContext, Transformer};

/// Prepends a fixed tool set to whatever tools the caller declared.
///
/// Caller entries that are not objects are dropped. Names are not
/// de-duplicated.
pub struct ToolsMerger {
    defaults: Vec<Value>,
}

impl ToolsMerger {
    pub fn new(defaults: Vec<Value>) -> Self {
        Self { defaults }
    }
}

impl Transformer for ToolsMerger {
    fn name(&self) -> &'static str {
        "tools_merger"
    }

    fn transform(&self, mut data: JsonBody, _ctx: &mut TransformContext) -> Result<JsonBody, StepError> {
        let mut tools = self.defaults.clone();
        if let Some(Value::Array(caller)) = data.remove("tools") {
            tools.extend(caller.into_iter().filter(Value::is_object));
        }
        data.insert("tools".to_string(), Value::Array(tools));
        Ok(data)
    }

    fn validate(&self, data: &JsonBody) -> bool {
        data.get("tools").map_or(false, Value::is_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TargetApi;
    use serde_json::json;
    use std::collections::HashMap;

    fn merge(merger: &ToolsMerger, body: Value) -> JsonBody {
        let mut ctx = TransformContext::new(TargetApi::OpenAI, "test", HashMap::new());
        let out = merger
            .transform(body.as_object().cloned().unwrap(), &mut ctx)
            .unwrap();
        assert!(merger.validate(&out));
        out
    }

    #[test]
    fn defaults_come_first_and_stay_independent() {
        let t1 = json!({"type": "function", "name": "shell"});
        let t2 = json!({"type": "function", "name": "search"});
        let merger = ToolsMerger::new(vec![t1.clone()]);

        let mut out = merge(&merger, json!({"tools": [t2.clone()]}));
        assert_eq!(out["tools"], json!([t1.clone(), t2]));

        if let Some(Value::Array(tools)) = out.get_mut("tools") {
            tools[0]["name"] = json!("mutated");
            tools.clear();
        }
        assert_eq!(merger.defaults, vec![t1]);
    }

    #[test]
    fn non_object_entries_dropped_and_duplicates_kept() {
        let t1 = json!({"type": "function", "name": "shell"});
        let merger = ToolsMerger::new(vec![t1.clone()]);

        let out = merge(&merger, json!({"tools": ["x", 1, t1.clone(), null]}));
        assert_eq!(out["tools"], json!([t1.clone(), t1]));
    }

    #[test]
    fn missing_or_invalid_tools_yield_defaults() {
        let t1 = json!({"type": "function", "name": "shell"});
        let merger = ToolsMerger::new(vec![t1.clone()]);

        assert_eq!(merge(&merger, json!({}))["tools"], json!([t1.clone()]));
        assert_eq!(merge(&merger, json!({"tools": "nope"}))["tools"], json!([t1]));
    }
}
