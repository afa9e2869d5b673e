use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message exchanged with a chat-completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: Vec<MessageContent>,
    pub timestamp: DateTime<Utc>,
    /// Tool calls requested by the assistant in this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<super::tool::ToolCall>,
}

/// Who produced a message or a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::StrataError;

    /// Parses a role name. `agent` is accepted as an alias of `assistant`.
    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" | "agent" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(crate::StrataError::InvalidRequest(format!(
                "unknown role '{other}'"
            ))),
        }
    }
}

/// A single content block within a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },
}

impl Message {
    /// Create a simple text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: vec![MessageContent::Text { text: text.into() }],
            timestamp: Utc::now(),
            tool_calls: vec![],
        }
    }

    /// Create a tool-role message carrying the observation of one tool call.
    pub fn tool_result(result: &super::tool::ToolResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Tool,
            content: vec![MessageContent::ToolResult {
                tool_call_id: result.tool_call_id.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            }],
            timestamp: Utc::now(),
            tool_calls: vec![],
        }
    }

    /// Extract all text content joined together.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.as_str()),
                MessageContent::ToolResult { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
