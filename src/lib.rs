//! promptchain - Gated LLM prompt chain for calendar scheduling
//!
//! Turns free-form text into a calendar event through a fixed sequence of
//! structured completion calls, with exactly one external side effect.
//!
//! # Architecture
//!
//! The calendar chain is a small state machine:
//! - Extract: is this an event, and how confident is the model?
//! - Gate: stop cheaply unless `is_event && confidence >= threshold`
//! - Detail-Parse: name, absolute start time, duration, participants
//! - Act: create the event (single attempt, idempotency key)
//! - Confirm: user-facing confirmation message
//!
//! Every run ends in one of four outcomes (Confirmed, NotAnEvent,
//! ActionFailed, Indeterminate) or a typed error.
//!
//! # Modules
//!
//! - `adapters`: External systems (OpenAI, Google Calendar, Open-Meteo, KB file)
//! - `core`: Stages, orchestrator, tool agent, modes
//! - `domain`: Data structures (EventDetails, PipelineOutcome, RunTrace)
//! - `config`: Config file discovery and env overrides
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Schedule from text
//! promptchain schedule "Team sync next Tuesday at 3pm with alice@example.com"
//!
//! # Try it without touching a calendar
//! echo "Lunch with Bob tomorrow at noon" | promptchain schedule --stdin --dry-run
//!
//! # Other modes
//! promptchain ask --mode weather "How warm is it in Lisbon?"
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{Assistant, Mode, Orchestrator, PipelineError, PipelineRun, PipelineSettings};
pub use domain::{EventDetails, EventExtraction, PipelineOutcome, RunTrace};
