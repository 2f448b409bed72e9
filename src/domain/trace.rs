//! In-memory trace of a single pipeline run.
//!
//! Every state transition is recorded as an immutable [`StageEvent`]. The
//! trace is owned by the run and returned with its outcome; it is never
//! persisted or shared between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in a run trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Stage that emitted the event (None for run-level events)
    pub stage: Option<Stage>,

    pub event_type: EventType,

    /// Human-readable summary (no prompts, no credentials)
    pub summary: String,

    /// Time taken in milliseconds (for finished stages)
    pub duration_ms: Option<u64>,

    /// Error message if the stage failed
    pub error: Option<String>,
}

impl StageEvent {
    pub fn new(
        run_id: Uuid,
        stage: Option<Stage>,
        event_type: EventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage,
            event_type,
            summary: summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    DetailParse,
    Act,
    Confirm,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::DetailParse => "detail_parse",
            Stage::Act => "act",
            Stage::Confirm => "confirm",
        }
    }

    /// Whether the stage has an externally visible effect
    pub fn is_effectful(&self) -> bool {
        matches!(self, Stage::Act)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Types of trace events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    GateRejected,
    RunCompleted,
    RunFailed,
    RunCancelled,
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Start,
    Extracted,
    GatedOut,
    Detailed,
    Acted,
    Confirmed,
    ActionFailed,
    Indeterminate,
    /// Aborted by a stage error or cancellation
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::GatedOut
                | PipelineState::Confirmed
                | PipelineState::ActionFailed
                | PipelineState::Indeterminate
                | PipelineState::Aborted
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Start, Extracted) => true,
            (Extracted, GatedOut) | (Extracted, Detailed) => true,
            (Detailed, Acted) => true,
            (Acted, Confirmed) | (Acted, ActionFailed) | (Acted, Indeterminate) => true,
            (state, Aborted) => !state.is_terminal(),
            _ => false,
        }
    }
}

/// Trace of one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub events: Vec<StageEvent>,
}

impl RunTrace {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: PipelineState::Start,
            started_at: Utc::now(),
            completed_at: None,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, event: StageEvent) {
        self.events.push(event);
    }

    /// Move to `next`, stamping completion time on terminal states.
    ///
    /// Illegal transitions are a programming error and are logged, not
    /// applied.
    pub fn transition(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(next) {
            tracing::error!(from = ?self.state, to = ?next, "Illegal pipeline transition");
            return;
        }
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Number of times a stage was started in this run
    pub fn stage_starts(&self, stage: Stage) -> usize {
        self.events
            .iter()
            .filter(|e| e.stage == Some(stage) && e.event_type == EventType::StageStarted)
            .count()
    }
}
