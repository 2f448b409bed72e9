//! Tool-calling agent.
//!
//! This module provides:
//! - [`Tool`]: the closed set of tools the model may call
//! - [`ToolRegistry`] for looking tools up by their declared name
//! - [`ToolAgent`]: the request → execute → answer loop

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::safety::SafetyLimits;
use super::stages::complete_with_timeout;
use crate::adapters::weather::WeatherError;
use crate::adapters::{
    ChatMessage, CompletionProvider, CompletionRequest, KnowledgeBase, OpenMeteoClient,
    ProviderError, ResponseFormat, ToolDeclaration, ToolInvocationRequest,
};

/// Output of one tool invocation, fed back to the model as a `tool` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    /// Id of the invocation this answers
    pub id: String,
    pub payload: Value,
}

/// Tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error(transparent)]
    Weather(#[from] WeatherError),
}

/// Arguments of `get_weather`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherArgs {
    pub latitude: f64,
    pub longitude: f64,
}

/// Arguments of `search_kb`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KbArgs {
    pub question: String,
}

fn parse_args<A: DeserializeOwned>(tool: &str, arguments: Value) -> Result<A, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Current conditions for a pair of coordinates
pub struct WeatherTool {
    client: OpenMeteoClient,
}

impl WeatherTool {
    pub const NAME: &'static str = "get_weather";

    pub fn new(client: OpenMeteoClient) -> Self {
        Self { client }
    }

    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: Self::NAME.to_string(),
            description: "Get current temperature for provided coordinates in celsius."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "latitude": {"type": "number"},
                    "longitude": {"type": "number"}
                },
                "required": ["latitude", "longitude"],
                "additionalProperties": false
            }),
        }
    }

    pub async fn call(&self, args: WeatherArgs) -> Result<Value, ToolError> {
        Ok(self.client.current(args.latitude, args.longitude).await?)
    }
}

/// Question lookup in the local knowledge base
pub struct KnowledgeBaseTool {
    kb: Arc<KnowledgeBase>,
    limit: usize,
}

impl KnowledgeBaseTool {
    pub const NAME: &'static str = "search_kb";

    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb, limit: 5 }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: Self::NAME.to_string(),
            description: "Get the answer to the user's question from the knowledge base."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"}
                },
                "required": ["question"],
                "additionalProperties": false
            }),
        }
    }

    pub fn call(&self, args: KbArgs) -> Value {
        let records = self.kb.search(&args.question, self.limit);
        json!({ "records": records })
    }
}

/// Every tool the agent can dispatch to
pub enum Tool {
    Weather(WeatherTool),
    KnowledgeBase(KnowledgeBaseTool),
}

impl Tool {
    pub fn declaration(&self) -> ToolDeclaration {
        match self {
            Tool::Weather(tool) => tool.declaration(),
            Tool::KnowledgeBase(tool) => tool.declaration(),
        }
    }

    /// Deserialize `arguments` into the tool's typed arguments and run it
    pub async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        match self {
            Tool::Weather(tool) => {
                let args = parse_args::<WeatherArgs>(WeatherTool::NAME, arguments)?;
                tool.call(args).await
            }
            Tool::KnowledgeBase(tool) => {
                let args = parse_args::<KbArgs>(KnowledgeBaseTool::NAME, arguments)?;
                Ok(tool.call(args))
            }
        }
    }
}

/// Tools keyed by declared name
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its declared name
    pub fn register(&mut self, tool: Tool) {
        let name = tool.declaration().name;
        self.tools.insert(name, tool);
    }

    pub fn with(mut self, tool: Tool) -> Self {
        self.register(tool);
        self
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(Tool::declaration).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute one requested invocation
    pub async fn execute(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<ToolInvocationResult, ToolError> {
        let tool = self
            .tools
            .get(&request.name)
            .ok_or_else(|| ToolError::UnknownTool(request.name.clone()))?;

        let payload = tool.invoke(request.arguments.clone()).await?;
        Ok(ToolInvocationResult {
            id: request.id.clone(),
            payload,
        })
    }
}

/// Agent errors
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Only unknown tools abort a run; other tool failures are reported
    /// back to the model
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("model kept calling tools after {0} rounds")]
    TooManyRounds(u32),
}

/// Final answer plus the tool traffic that led to it
#[derive(Debug, Clone)]
pub struct ToolRun<T> {
    pub answer: T,
    pub invocations: Vec<ToolInvocationResult>,
}

/// Runs a conversation in which the model may call registered tools
/// before giving a structured answer.
pub struct ToolAgent {
    provider: Arc<dyn CompletionProvider>,
    registry: ToolRegistry,
    model: String,
    max_rounds: u32,
    timeout: Duration,
}

impl ToolAgent {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        registry: ToolRegistry,
        model: impl Into<String>,
        limits: &SafetyLimits,
    ) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            max_rounds: limits.max_tool_rounds,
            timeout: limits.provider_timeout(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Ask `user` under `system`, executing tool calls until the model
    /// answers in the shape of `format`.
    #[instrument(skip(self, system, user, format), fields(format = %format.name))]
    pub async fn run<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
        format: ResponseFormat,
    ) -> Result<ToolRun<T>, AgentError> {
        let mut messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let declarations = self.registry.declarations();
        let mut invocations = Vec::new();

        for round in 1..=self.max_rounds {
            let request = CompletionRequest::new(self.model.clone(), messages.clone())
                .with_tools(declarations.clone())
                .with_response_format(format.clone());
            let response =
                complete_with_timeout(self.provider.as_ref(), request, self.timeout).await?;

            if response.tool_calls.is_empty() {
                debug!(round, "Model answered");
                let answer = response.parse::<T>()?;
                return Ok(ToolRun {
                    answer,
                    invocations,
                });
            }

            info!(round, calls = response.tool_calls.len(), "Model requested tools");
            messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let result = match self.registry.execute(call).await {
                    Ok(result) => result,
                    Err(ToolError::UnknownTool(name)) => {
                        return Err(ToolError::UnknownTool(name).into());
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        ToolInvocationResult {
                            id: call.id.clone(),
                            payload: json!({ "error": e.to_string() }),
                        }
                    }
                };

                messages.push(ChatMessage::tool(
                    result.id.clone(),
                    result.payload.to_string(),
                ));
                invocations.push(result);
            }
        }

        // Rounds exhausted: ask for the answer without offering tools
        warn!(
            max_rounds = self.max_rounds,
            "Tool rounds exhausted, requesting final answer without tools"
        );
        let request =
            CompletionRequest::new(self.model.clone(), messages).with_response_format(format);
        let response = complete_with_timeout(self.provider.as_ref(), request, self.timeout).await?;
        if !response.tool_calls.is_empty() {
            return Err(AgentError::TooManyRounds(self.max_rounds));
        }

        Ok(ToolRun {
            answer: response.parse::<T>()?,
            invocations,
        })
    }
}
