//! Types shared between the Executor and the ToolRegistry at the tool
//! call boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-call context handed to a tool. Identifies where in the plan the
/// call originates and which context snapshot it reads against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub chat_id: String,
    pub plan_id: String,
    pub task_id: String,
    pub ctx_id: Option<String>,
}

/// Output of a single tool invocation.
///
/// `ops` is opaque to the tool registry and the executor — its shape is
/// defined by whatever ContextStore semantics the ops will be committed
/// under. `metadata` carries recognized keys the Executor extracts for
/// attempt finalization: `usage.total_tokens`, `provider`, `model`,
/// `input_hash`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: Value,
    #[serde(default)]
    pub ops: Vec<Value>,
    #[serde(default)]
    pub metadata: Value,
}

impl ToolResult {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            ops: Vec::new(),
            metadata: Value::Null,
        }
    }

    pub fn with_ops(mut self, ops: Vec<Value>) -> Self {
        self.ops = ops;
        self
    }

    pub fn total_tokens(&self) -> Option<u64> {
        self.metadata.get("usage")?.get("total_tokens")?.as_u64()
    }

    pub fn provider(&self) -> Option<&str> {
        self.metadata.get("provider")?.as_str()
    }

    pub fn model(&self) -> Option<&str> {
        self.metadata.get("model")?.as_str()
    }

    pub fn input_hash(&self) -> Option<&str> {
        self.metadata.get("input_hash")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_ops_sets_the_ops_list() {
        let result = ToolResult::new(Value::String("out".into()))
            .with_ops(vec![Value::String("op1".into())]);
        assert_eq!(result.ops.len(), 1);
    }

    #[test]
    fn total_tokens_extracts_from_nested_metadata() {
        let result = ToolResult {
            output: Value::Null,
            ops: vec![],
            metadata: serde_json::json!({ "usage": { "total_tokens": 42 } }),
        };
        assert_eq!(result.total_tokens(), Some(42));
    }

    #[test]
    fn total_tokens_missing_is_none() {
        let result = ToolResult::new(Value::Null);
        assert_eq!(result.total_tokens(), None);
    }

    #[test]
    fn provider_and_model_extraction() {
        let result = ToolResult {
            output: Value::Null,
            ops: vec![],
            metadata: serde_json::json!({ "provider": "openai", "model": "gpt-4" }),
        };
        assert_eq!(result.provider(), Some("openai"));
        assert_eq!(result.model(), Some("gpt-4"));
    }
}
