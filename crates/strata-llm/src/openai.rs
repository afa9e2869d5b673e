use async_trait::async_trait;
use strata_core::{Message, MessageContent, Result, Role, StrataError, ToolCall};
use tracing::{debug, info};

use crate::provider::*;

/// OpenAI-compatible chat-completions provider (DashScope/Qwen, OpenAI, vLLM, ...).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            provider_name: "openai".into(),
        }
    }

    /// Use a custom base URL, e.g. DashScope's compatible-mode endpoint.
    pub fn with_base_url(mut self, url: String, name: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self.provider_name = name;
        self
    }

    fn build_messages(request: &LlmRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }

        for msg in &request.messages {
            match msg.role {
                Role::System | Role::User => {
                    messages.push(serde_json::json!({
                        "role": msg.role.as_str(),
                        "content": msg.text_content(),
                    }));
                }
                Role::Assistant if msg.tool_calls.is_empty() => {
                    messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": msg.text_content(),
                    }));
                }
                Role::Assistant => {
                    // Assistant message with tool calls must echo the tool_calls array
                    let tc: Vec<serde_json::Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            serde_json::json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.tool_name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    let text = msg.text_content();
                    let content = if text.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::json!(text)
                    };
                    messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tc,
                    }));
                }
                Role::Tool => {
                    let mut any_result = false;
                    for block in &msg.content {
                        if let MessageContent::ToolResult {
                            tool_call_id,
                            content,
                            ..
                        } = block
                        {
                            any_result = true;
                            messages.push(serde_json::json!({
                                "role": "tool",
                                "tool_call_id": tool_call_id,
                                "content": content,
                            }));
                        }
                    }
                    // No ToolResult blocks: send as user text so the API accepts it
                    if !any_result {
                        messages.push(serde_json::json!({
                            "role": "user",
                            "content": msg.text_content(),
                        }));
                    }
                }
            }
        }
        messages
    }

    /// Build the JSON body for `/chat/completions`.
    pub fn request_body(request: &LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": &request.model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": Self::build_messages(request),
        });

        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }
        body
    }

    /// Parse a `/chat/completions` response body.
    ///
    /// A body without `choices[0].message` is a provider failure, even on 2xx.
    pub fn parse_response(data: &serde_json::Value) -> Result<LlmResponse> {
        let choice = &data["choices"][0];
        if !choice["message"].is_object() {
            let detail = data
                .get("error")
                .map(|e| e.get("message").and_then(|m| m.as_str()).map_or_else(|| e.to_string(), String::from))
                .unwrap_or_else(|| "response has no choices".to_string());
            return Err(StrataError::LlmProvider(detail));
        }
        let content = choice["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let tool_calls: Vec<ToolCall> = choice["message"]["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        Some(ToolCall {
                            id: c["id"].as_str()?.to_string(),
                            tool_name: c["function"]["name"].as_str()?.to_string(),
                            arguments: serde_json::from_str(
                                c["function"]["arguments"].as_str().unwrap_or("{}"),
                            )
                            .unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let has_tool_calls = !tool_calls.is_empty();
        let mut message = Message::text(Role::Assistant, content);
        message.tool_calls = tool_calls;

        let usage_data = &data["usage"];
        let usage = Usage {
            input_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(LlmResponse {
            message,
            usage,
            has_tool_calls,
            stop_reason: match choice["finish_reason"].as_str().unwrap_or("") {
                "length" => StopReason::MaxTokens,
                "content_filter" => StopReason::ContentFilter,
                _ if has_tool_calls => StopReason::ToolUse,
                _ => StopReason::EndTurn,
            },
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn models(&self) -> Vec<String> {
        vec![
            "qwen-plus".into(),
            "qwen-turbo".into(),
            "qwen-max".into(),
            "gpt-4o".into(),
            "gpt-4o-mini".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = Self::request_body(request);
        debug!(provider = %self.provider_name, model = %request.model, "chat completion");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| StrataError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(StrataError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StrataError::LlmProvider(e.to_string()))?;

        Self::parse_response(&data)
    }

    async fn health_check(&self) -> Result<()> {
        info!(provider = self.provider_name, "checking API health");
        if self.api_key.is_empty() {
            return Err(StrataError::LlmProvider(format!(
                "{} API key not set",
                self.provider_name
            )));
        }
        Ok(())
    }
}
