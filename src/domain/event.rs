//! Records exchanged between the prompt-chain stages.
//!
//! Each stage asks the provider for a JSON object of a known shape. The raw
//! shape is deserialized first and then validated into the typed record the
//! next stage consumes, so nothing downstream ever sees a half-checked value.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage 1 output: is this text something to put in a calendar?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventExtraction {
    /// Cleaned restatement of the input
    pub description: String,

    /// Whether the text describes a schedulable event
    pub is_event: bool,

    /// Self-reported confidence between 0.0 and 1.0
    pub confidence: f64,
}

impl EventExtraction {
    /// Reject confidences outside [0.0, 1.0] (including NaN).
    pub fn validate(self) -> Result<Self, ValidationError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(self)
    }

    /// Gate check: proceed only for events at or above `threshold`.
    pub fn passes_gate(&self, threshold: f64) -> bool {
        self.is_event && self.confidence >= threshold
    }
}

/// Stage 2 output as the model returns it, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventDetails {
    pub name: String,
    pub start_time: String,
    pub duration_minutes: i64,
    pub participants: Vec<String>,
}

/// Stage 2 output after validation. `start_time` is always absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Title of the event (e.g. "Team Meeting")
    pub name: String,

    /// Resolved start instant
    pub start_time: DateTime<Utc>,

    /// Planned duration, always > 0
    pub duration_minutes: u32,

    /// Attendee identifiers in the order the model listed them
    pub participants: Vec<String>,
}

/// Longest event accepted from the model: one week
pub const MAX_DURATION_MINUTES: u32 = 7 * 24 * 60;

impl RawEventDetails {
    /// Validate into [`EventDetails`], interpreting naive timestamps in `tz`.
    pub fn validate(self, tz: Tz) -> Result<EventDetails, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if self.duration_minutes <= 0 {
            return Err(ValidationError::NonPositiveDuration(self.duration_minutes));
        }
        if self.duration_minutes > i64::from(MAX_DURATION_MINUTES) {
            return Err(ValidationError::DurationTooLarge(self.duration_minutes));
        }
        let duration_minutes = u32::try_from(self.duration_minutes)
            .map_err(|_| ValidationError::DurationTooLarge(self.duration_minutes))?;

        let start_time = parse_start_time(&self.start_time, tz)?;

        let mut participants = Vec::with_capacity(self.participants.len());
        for participant in self.participants {
            let participant = participant.trim();
            if participant.is_empty() {
                continue;
            }
            if !is_address_like(participant) {
                return Err(ValidationError::InvalidParticipant(participant.to_string()));
            }
            participants.push(participant.to_string());
        }

        Ok(EventDetails {
            name,
            start_time,
            duration_minutes,
            participants,
        })
    }
}

/// Stage 3 output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfirmation {
    /// User-facing confirmation text
    pub message: String,

    /// Link to the created event, if any
    #[serde(default)]
    pub reference_link: Option<String>,
}

impl EventConfirmation {
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(self)
    }
}

/// A structurally valid response that breaks a domain rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("confidence {0} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange(f64),

    #[error("event name is empty")]
    EmptyName,

    #[error("duration must be positive, got {0} minutes")]
    NonPositiveDuration(i64),

    #[error("duration of {0} minutes is longer than one week")]
    DurationTooLarge(i64),

    #[error("start time '{0}' is not an absolute timestamp")]
    UnparseableTimestamp(String),

    #[error("start time '{0}' does not exist in the configured time zone")]
    NonexistentLocalTime(String),

    #[error("participant '{0}' is not an address")]
    InvalidParticipant(String),

    #[error("confirmation message is empty")]
    EmptyMessage,

    #[error("final answer is missing")]
    EmptyAnswer,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an RFC 3339 timestamp, or a naive local date-time in `tz`.
///
/// Anything else (including relative phrases like "next Tuesday") is an
/// error; Stage 2 is required to resolve those.
pub fn parse_start_time(raw: &str, tz: Tz) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ValidationError::NonexistentLocalTime(raw.to_string()));
        }
    }

    Err(ValidationError::UnparseableTimestamp(raw.to_string()))
}

fn is_address_like(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}
