use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a tool that can be called by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name, e.g. "get_patent_analysis".
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// A request from the LLM to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait implemented by anything that can execute tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// List all tools this executor provides (the tool catalog).
    fn tools(&self) -> Vec<Tool>;

    /// Execute a single tool call and return the observation.
    async fn execute(&self, call: &ToolCall) -> crate::Result<ToolResult>;
}
