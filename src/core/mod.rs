//! Core orchestration logic.
//!
//! This module contains:
//! - Pipeline: settings and loading
//! - Safety: input limits and timeouts
//! - Stages: the three completion-backed stages
//! - Orchestrator: the calendar state machine
//! - Tools: the tool-calling agent
//! - Modes: mode dispatch for the assistant

pub mod modes;
pub mod orchestrator;
pub mod pipeline;
pub mod safety;
pub mod schema;
pub mod stages;
pub mod tools;

// Re-export commonly used types
pub use modes::{Assistant, AssistantError, AssistantReply, ChatHandler, Mode, ModeError};
pub use orchestrator::{Orchestrator, PipelineError, PipelineRun};
pub use pipeline::{PipelineSettings, PromptSettings, DEFAULT_GATE_THRESHOLD};
pub use safety::{SafetyLimits, SafetyViolation};
pub use schema::{KbResponse, WeatherResponse};
pub use stages::{date_context, StageError};
pub use tools::{
    AgentError, KbArgs, KnowledgeBaseTool, Tool, ToolAgent, ToolError, ToolInvocationResult,
    ToolRegistry, ToolRun, WeatherArgs, WeatherTool,
};
