//! Domain types for the prompt chain.
//!
//! This module contains the records exchanged by the pipeline:
//! - Event: Stage 1/2/3 records and their validation
//! - Action: Act-stage request and result
//! - Outcome: terminal result of a run
//! - Trace: in-memory record of state transitions

pub mod action;
pub mod event;
pub mod outcome;
pub mod trace;

pub use action::{request_id, ActionResult, CalendarOptions, CalendarRequest, Visibility};
pub use event::{
    parse_start_time, EventConfirmation, EventDetails, EventExtraction, RawEventDetails,
    ValidationError,
};
pub use outcome::PipelineOutcome;
pub use trace::{EventType, PipelineState, RunTrace, Stage, StageEvent};
