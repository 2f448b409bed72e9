//! Assistant modes and dispatch.
//!
//! A [`Mode`] names one way of answering a prompt. The [`Assistant`] owns a
//! concrete handler for each configured mode; unknown mode names are
//! rejected at parse time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use super::orchestrator::{Orchestrator, PipelineError, PipelineRun};
use super::safety::{SafetyLimits, SafetyViolation};
use super::schema::{self, KbResponse, WeatherResponse};
use super::stages::complete_with_timeout;
use super::tools::{AgentError, ToolAgent};
use crate::adapters::{ChatMessage, CompletionProvider, CompletionRequest, ProviderError};
use crate::domain::ValidationError;

const WEATHER_SYSTEM_PROMPT: &str = "You are a helpful weather assistant.";
const KB_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
     from the knowledge base about our e-commerce store.";

/// Available modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Qa,
    DataAnalysis,
    Calendar,
    Weather,
    KnowledgeBase,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Qa,
        Mode::DataAnalysis,
        Mode::Calendar,
        Mode::Weather,
        Mode::KnowledgeBase,
    ];

    /// Identifier used on the command line
    pub fn id(&self) -> &'static str {
        match self {
            Mode::Qa => "qa",
            Mode::DataAnalysis => "data-analysis",
            Mode::Calendar => "calendar",
            Mode::Weather => "weather",
            Mode::KnowledgeBase => "kb",
        }
    }

    /// Display name
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Qa => "Q&A",
            Mode::DataAnalysis => "Data Analysis",
            Mode::Calendar => "Calendar",
            Mode::Weather => "Weather",
            Mode::KnowledgeBase => "Knowledge Base",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qa" | "q&a" => Ok(Mode::Qa),
            "data-analysis" | "data analysis" => Ok(Mode::DataAnalysis),
            "calendar" => Ok(Mode::Calendar),
            "weather" => Ok(Mode::Weather),
            "kb" | "knowledge-base" | "knowledge base" => Ok(Mode::KnowledgeBase),
            _ => Err(ModeError::Unknown(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("Invalid mode: {0}")]
    Unknown(String),

    #[error("Mode '{0}' is not configured")]
    NotConfigured(Mode),
}

/// Single plain-text completion with a fixed persona
#[derive(Debug, Clone, PartialEq)]
pub struct ChatHandler {
    system_prompt: String,

    /// Send the prompt inside the system message instead of a user turn
    inline_prompt: bool,

    temperature: f32,
    max_tokens: u32,
}

impl ChatHandler {
    pub fn qa() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            inline_prompt: false,
            temperature: 0.5,
            max_tokens: 512,
        }
    }

    pub fn data_analysis() -> Self {
        Self {
            system_prompt: "You are a data analyst. Analyze the following data and provide insights:"
                .to_string(),
            inline_prompt: true,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    pub fn request(&self, model: &str, prompt: &str) -> CompletionRequest {
        let messages = if self.inline_prompt {
            vec![ChatMessage::system(format!("{}\n{}", self.system_prompt, prompt))]
        } else {
            vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(prompt),
            ]
        };

        CompletionRequest::new(model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

/// Answer produced by a mode
#[derive(Debug, Clone)]
pub enum AssistantReply {
    Text(String),
    Calendar(PipelineRun),
    Weather(WeatherResponse),
    KnowledgeBase(KbResponse),
}

impl AssistantReply {
    /// Text shown to the user
    pub fn message(&self) -> String {
        match self {
            AssistantReply::Text(text) => text.clone(),
            AssistantReply::Calendar(run) => run.outcome.user_message(),
            AssistantReply::Weather(weather) => weather.response.clone(),
            AssistantReply::KnowledgeBase(kb) => kb.answer.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error(transparent)]
    Safety(#[from] SafetyViolation),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Dispatches prompts to the handler of the requested mode
pub struct Assistant {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    limits: SafetyLimits,
    qa: ChatHandler,
    data_analysis: ChatHandler,
    calendar: Option<Orchestrator>,
    weather: Option<ToolAgent>,
    knowledge_base: Option<ToolAgent>,
}

impl Assistant {
    /// Assistant with the chat modes only
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: impl Into<String>,
        limits: SafetyLimits,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            limits,
            qa: ChatHandler::qa(),
            data_analysis: ChatHandler::data_analysis(),
            calendar: None,
            weather: None,
            knowledge_base: None,
        }
    }

    pub fn with_calendar(mut self, orchestrator: Orchestrator) -> Self {
        self.calendar = Some(orchestrator);
        self
    }

    pub fn with_weather(mut self, agent: ToolAgent) -> Self {
        self.weather = Some(agent);
        self
    }

    pub fn with_knowledge_base(mut self, agent: ToolAgent) -> Self {
        self.knowledge_base = Some(agent);
        self
    }

    /// Modes that have a handler
    pub fn available_modes(&self) -> Vec<Mode> {
        Mode::ALL
            .into_iter()
            .filter(|mode| match mode {
                Mode::Qa | Mode::DataAnalysis => true,
                Mode::Calendar => self.calendar.is_some(),
                Mode::Weather => self.weather.is_some(),
                Mode::KnowledgeBase => self.knowledge_base.is_some(),
            })
            .collect()
    }

    #[instrument(skip(self, prompt), fields(mode = mode.id()))]
    pub async fn ask(&self, mode: Mode, prompt: &str) -> Result<AssistantReply, AssistantError> {
        info!("Dispatching prompt");

        match mode {
            Mode::Qa => self.chat(&self.qa, prompt).await,
            Mode::DataAnalysis => self.chat(&self.data_analysis, prompt).await,
            Mode::Calendar => {
                let orchestrator = self
                    .calendar
                    .as_ref()
                    .ok_or(ModeError::NotConfigured(mode))?;
                let run = orchestrator.run(prompt, orchestrator.today()).await?;
                Ok(AssistantReply::Calendar(run))
            }
            Mode::Weather => {
                let agent = self
                    .weather
                    .as_ref()
                    .ok_or(ModeError::NotConfigured(mode))?;
                self.limits.validate_input(prompt)?;
                let run = agent
                    .run::<WeatherResponse>(
                        WEATHER_SYSTEM_PROMPT,
                        prompt,
                        schema::weather_response(),
                    )
                    .await?;
                Ok(AssistantReply::Weather(run.answer))
            }
            Mode::KnowledgeBase => {
                let agent = self
                    .knowledge_base
                    .as_ref()
                    .ok_or(ModeError::NotConfigured(mode))?;
                self.limits.validate_input(prompt)?;
                let run = agent
                    .run::<KbResponse>(KB_SYSTEM_PROMPT, prompt, schema::kb_response())
                    .await?;
                Ok(AssistantReply::KnowledgeBase(run.answer))
            }
        }
    }

    async fn chat(
        &self,
        handler: &ChatHandler,
        prompt: &str,
    ) -> Result<AssistantReply, AssistantError> {
        self.limits.validate_input(prompt)?;

        let request = handler.request(&self.model, prompt);
        let timeout: Duration = self.limits.provider_timeout();
        let response = complete_with_timeout(self.provider.as_ref(), request, timeout).await?;

        let text = response
            .content
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ValidationError::EmptyAnswer)?;

        Ok(AssistantReply::Text(text.to_string()))
    }
}
