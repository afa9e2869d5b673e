use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::{Message, Result, Tool};

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The model to use, e.g. "qwen-plus".
    pub model: String,
    /// Conversation history.
    pub messages: Vec<Message>,
    /// Available tools.
    pub tools: Vec<Tool>,
    /// System prompt (sent ahead of the messages).
    pub system: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the endpoint for a JSON object instead of free text.
    pub json_mode: bool,
}

impl LlmRequest {
    /// A single-user-message request with no tools.
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::text(strata_core::Role::User, prompt)],
            tools: vec![],
            system: None,
            max_tokens: 800,
            temperature: 0.7,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

/// A complete response from an LLM.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Usage,
    /// Whether the model wants tools run before it continues.
    pub has_tool_calls: bool,
    pub stop_reason: StopReason,
}

impl LlmResponse {
    pub fn text(&self) -> String {
        self.message.text_content()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Trait implemented by each chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, e.g. "qwen", "openai".
    fn name(&self) -> &str;

    /// List available models.
    fn models(&self) -> Vec<String>;

    /// Send a non-streaming request.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is usable.
    async fn health_check(&self) -> Result<()>;
}
