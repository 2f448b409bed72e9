//! Adapter interfaces for external systems.
//!
//! Two seams separate the pipeline from the outside world:
//! - [`CompletionProvider`]: chat completions (effect-free from our side)
//! - [`ActionBackend`]: the one effectful call of a run (create an event)
//!
//! Both are `Send + Sync` so one client can be shared by concurrent runs.

pub mod calendar;
pub mod knowledge_base;
pub mod openai;
pub mod weather;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ActionResult, CalendarRequest};

pub use calendar::{CalendarConfig, DryRunBackend, GoogleCalendarBackend};
pub use knowledge_base::{KnowledgeBase, KnowledgeRecord};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use weather::{OpenMeteoClient, WeatherConfig};

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    /// Text content (absent on assistant turns that only call tools)
    pub content: Option<String>,

    /// Tool invocations requested by the assistant on this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocationRequest>,

    /// For `tool` messages, the invocation this answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn that requested tool invocations
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolInvocationRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Tool output fed back into the conversation
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A callable tool declared to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,

    /// JSON Schema of the arguments object
    pub parameters: Value,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Provider-assigned call id, echoed back in the tool message
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Structured-output hint: the response must match `schema`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
}

/// A completion request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: Option<ResponseFormat>,
    pub tools: Vec<ToolDeclaration>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A completion response: free text, structured JSON text, or tool calls
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocationRequest>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolInvocationRequest>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }

    /// Deserialize the text content as `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProviderError> {
        let content = self
            .content
            .as_deref()
            .ok_or(ProviderError::EmptyResponse)?;
        serde_json::from_str(content).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

/// Completion provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider rate limited the request")]
    RateLimited,

    #[error("provider call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider response does not match the requested shape: {0}")]
    Malformed(String),

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("model refused: {0}")]
    Refused(String),
}

/// Act-stage transport failures.
///
/// A clean rejection is not an error; it is an [`ActionResult`] with
/// `succeeded == false`.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The request may have taken effect; the caller must check
    #[error("action outcome unknown: {0}")]
    Indeterminate(String),
}

/// Chat completion provider
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}

/// Backend that performs the effectful Act stage
#[async_trait]
pub trait ActionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Create the event. Exactly one attempt; never retried here.
    async fn create_event(&self, request: &CalendarRequest) -> Result<ActionResult, ActionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Answer {
        value: u32,
    }

    #[test]
    fn test_response_parse() {
        let response = CompletionResponse::text(r#"{"value": 7}"#);
        let answer: Answer = response.parse().unwrap();
        assert_eq!(answer.value, 7);
    }

    #[test]
    fn test_response_parse_errors() {
        let empty = CompletionResponse::default();
        assert!(matches!(
            empty.parse::<Answer>(),
            Err(ProviderError::EmptyResponse)
        ));

        let malformed = CompletionResponse::text("not json");
        assert!(matches!(
            malformed.parse::<Answer>(),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_tool_message_shape() {
        let message = ChatMessage::tool("call_1", "{}");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("tool_calls").is_none());
    }
}
