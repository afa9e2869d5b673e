//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::*;
use strata_core::{Message, MessageContent, Result, Role, StrataError, ToolCall};

/// A mock LLM provider that returns queued responses in order.
///
/// # Example
/// ```
/// use strata_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Every request received, for assertions in tests.
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
    delay: Option<Duration>,
}

/// A pre-configured response from the mock provider.
#[derive(Clone, Default)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// If set, the provider returns this error instead.
    pub error: Option<String>,
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
            delay: None,
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push(MockResponse::text(text));
        self
    }

    /// Queue a tool call response.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.responses.lock().push(MockResponse {
            tool_calls: vec![ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                tool_name: name.to_string(),
                arguments: args,
            }],
            ..Default::default()
        });
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push(MockResponse::error(error));
        self
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            MockResponse::text("(mock: no more queued responses)")
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["mock/test-model".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(StrataError::LlmProvider(error));
        }

        let mut msg = Message::text(Role::Assistant, "");
        msg.content = if mock.text.is_empty() {
            vec![]
        } else {
            vec![MessageContent::Text { text: mock.text }]
        };
        let has_tool_calls = !mock.tool_calls.is_empty();
        msg.tool_calls = mock.tool_calls;

        Ok(LlmResponse {
            message: msg,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            has_tool_calls,
            stop_reason: if has_tool_calls {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            },
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_served_in_order() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .with_error("boom")
            .with_tool_call("get_identification", serde_json::json!({"user_id": "u1"}));
        let req = LlmRequest::prompt("m", "q");

        assert_eq!(provider.complete(&req).await.unwrap().text(), "first");
        assert!(provider.complete(&req).await.is_err());
        let third = provider.complete(&req).await.unwrap();
        assert!(third.has_tool_calls);
        assert_eq!(third.stop_reason, StopReason::ToolUse);
        assert!(
            provider
                .complete(&req)
                .await
                .unwrap()
                .text()
                .contains("no more queued")
        );
        assert_eq!(provider.request_count(), 4);
    }
}
