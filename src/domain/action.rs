//! Act-stage request and result types.
//!
//! The Act stage is the only step of a run with an externally visible
//! effect. Requests carry a deterministic id derived from the event details
//! so that replaying the same request cannot create a second event.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::event::EventDetails;

/// Result of the Act stage.
///
/// A clean rejection by the backend is a normal value here
/// (`succeeded == false`), not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub succeeded: bool,

    /// Created resource reference (e.g. the event's web link)
    pub external_reference: Option<String>,

    /// Why the backend refused, when it did
    pub failure_reason: Option<String>,
}

impl ActionResult {
    pub fn success(external_reference: Option<String>) -> Self {
        Self {
            succeeded: true,
            external_reference,
            failure_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            external_reference: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Who can see the created event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Default,
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Default => "default",
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// Backend-facing options that do not come from the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarOptions {
    /// Optional event description
    #[serde(default)]
    pub description: Option<String>,

    /// Optional location
    #[serde(default)]
    pub location: Option<String>,

    /// Send email (30 min) and popup (10 min) reminders
    #[serde(default = "default_true")]
    pub reminders: bool,

    #[serde(default)]
    pub visibility: Visibility,

    /// Backend color id (1-11 for Google Calendar)
    #[serde(default)]
    pub color_id: Option<String>,

    /// Ask the backend to attach a video-conference link
    #[serde(default = "default_true")]
    pub add_conference_link: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CalendarOptions {
    fn default() -> Self {
        Self {
            description: None,
            location: None,
            reminders: true,
            visibility: Visibility::Default,
            color_id: None,
            add_conference_link: true,
        }
    }
}

/// Everything the Act stage sends to the calendar backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRequest {
    pub title: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub attendees: Vec<String>,
    pub options: CalendarOptions,

    /// Deterministic idempotency key, see [`request_id`]
    pub request_id: String,
}

impl CalendarRequest {
    /// Build the request for a fully validated event.
    pub fn from_details(details: &EventDetails, options: CalendarOptions) -> Self {
        Self {
            title: details.name.clone(),
            start: details.start_time,
            duration_minutes: details.duration_minutes,
            attendees: details.participants.clone(),
            options,
            request_id: request_id(details),
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Idempotency key for an event: first 16 bytes of SHA-256, hex encoded.
///
/// Only lowercase hex is produced, which is a valid client-supplied
/// Google Calendar event id (base32hex alphabet, 5-1024 chars).
pub fn request_id(details: &EventDetails) -> String {
    let mut hasher = Sha256::new();
    hasher.update(details.name.as_bytes());
    hasher.update([0]);
    hasher.update(details.start_time.to_rfc3339().as_bytes());
    hasher.update([0]);
    hasher.update(details.duration_minutes.to_be_bytes());
    for participant in &details.participants {
        hasher.update([0]);
        hasher.update(participant.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
