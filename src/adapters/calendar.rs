//! Calendar backends for the Act stage.
//!
//! `GoogleCalendarBackend` talks to the Google Calendar v3 REST API with an
//! already-issued OAuth access token. The event id is the request's
//! idempotency key, so a replayed request hits `409 Conflict` instead of
//! creating a duplicate meeting; the existing event is then looked up and
//! reported as created. An existing event the user deleted comes back as
//! `cancelled` and is restored before it is reported.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::{ActionBackend, ActionError};
use crate::domain::{ActionResult, CalendarRequest};

/// Google Calendar connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Calendar to write to
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// OAuth bearer token with the calendar scope
    #[serde(default)]
    pub access_token: Option<String>,

    /// IANA zone name sent alongside start/end times
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            calendar_id: default_calendar_id(),
            access_token: None,
            time_zone: default_time_zone(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Google Calendar v3 backend
#[derive(Debug, Clone)]
pub struct GoogleCalendarBackend {
    config: CalendarConfig,
    client: reqwest::Client,
}

/// Subset of the created event we care about
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedEvent {
    id: Option<String>,
    html_link: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl CreatedEvent {
    /// Deleted events stay addressable under their id with this status
    fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    fn reference(self) -> Option<String> {
        self.html_link.or(self.id)
    }
}

impl GoogleCalendarBackend {
    pub fn new(config: CalendarConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ActionError::Indeterminate(format!("client setup failed: {}", e)))?;

        Ok(Self { config, client })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.config.base_url.trim_end_matches('/'),
            self.config.calendar_id
        )
    }

    /// Google Calendar event body for a request
    pub fn event_body(&self, request: &CalendarRequest) -> Value {
        let options = &request.options;
        let overrides = if options.reminders {
            json!([
                {"method": "email", "minutes": 30},
                {"method": "popup", "minutes": 10}
            ])
        } else {
            json!([])
        };

        let mut body = json!({
            "id": request.request_id,
            "summary": request.title,
            "start": {
                "dateTime": request.start.to_rfc3339(),
                "timeZone": self.config.time_zone,
            },
            "end": {
                "dateTime": request.end().to_rfc3339(),
                "timeZone": self.config.time_zone,
            },
            "attendees": request
                .attendees
                .iter()
                .map(|email| json!({"email": email}))
                .collect::<Vec<_>>(),
            "visibility": options.visibility.as_str(),
            "reminders": {
                "useDefault": !options.reminders,
                "overrides": overrides,
            },
            "location": options.location.clone().unwrap_or_default(),
        });

        if let Some(description) = &options.description {
            body["description"] = json!(description);
        }
        if let Some(color_id) = &options.color_id {
            body["colorId"] = json!(color_id);
        }
        if options.add_conference_link {
            body["conferenceData"] = json!({
                "createRequest": {
                    "requestId": format!("meet-{}", request.request_id),
                    "conferenceSolutionKey": {"type": "hangoutsMeet"}
                }
            });
        }

        body
    }

    /// Look up an event that already exists under `event_id`.
    async fn fetch_existing(&self, token: &str, event_id: &str) -> Option<CreatedEvent> {
        let url = format!("{}/{}", self.events_url(), event_id);
        let response = self.client.get(&url).bearer_auth(token).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    /// Un-delete a cancelled event by setting its status back to confirmed.
    async fn restore(&self, token: &str, event_id: &str) -> Result<ActionResult, ActionError> {
        let url = format!("{}/{}", self.events_url(), event_id);
        let result = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .json(&json!({"status": "confirmed"}))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_connect() => {
                return Ok(ActionResult::failure(format!(
                    "the event was deleted earlier and the calendar is unreachable: {}",
                    e
                )));
            }
            Err(e) => return Err(ActionError::Indeterminate(e.to_string())),
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(ActionError::Indeterminate(format!(
                "restoring the deleted event returned HTTP {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Ok(ActionResult::failure(format!(
                "the event was deleted earlier and could not be restored (HTTP {})",
                status.as_u16()
            )));
        }

        let restored: Option<CreatedEvent> = response.json().await.ok();
        info!("Restored previously deleted event");
        Ok(ActionResult::success(restored.and_then(CreatedEvent::reference)))
    }

    /// A 409 means an event already exists under the request id.
    async fn resolve_conflict(
        &self,
        token: &str,
        event_id: &str,
    ) -> Result<ActionResult, ActionError> {
        match self.fetch_existing(token, event_id).await {
            Some(existing) if existing.is_cancelled() => {
                info!("Existing event was deleted, restoring it");
                self.restore(token, event_id).await
            }
            Some(existing) => {
                info!("Event already exists, treating as created");
                Ok(ActionResult::success(existing.reference()))
            }
            None => {
                info!("Event already exists, treating as created");
                Ok(ActionResult::success(None))
            }
        }
    }
}

#[async_trait]
impl ActionBackend for GoogleCalendarBackend {
    fn name(&self) -> &str {
        "google-calendar"
    }

    #[instrument(skip(self, request), fields(request_id = %request.request_id, attendees = request.attendees.len()))]
    async fn create_event(&self, request: &CalendarRequest) -> Result<ActionResult, ActionError> {
        let Some(token) = self.config.access_token.as_deref() else {
            return Ok(ActionResult::failure("no calendar access token configured"));
        };

        let body = self.event_body(request);
        let result = self
            .client
            .post(self.events_url())
            .query(&[("conferenceDataVersion", "1")])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            // Connection never established: nothing reached the calendar
            Err(e) if e.is_connect() => {
                return Ok(ActionResult::failure(format!("calendar unreachable: {}", e)));
            }
            Err(e) => return Err(ActionError::Indeterminate(e.to_string())),
        };

        let status = response.status();

        if status.as_u16() == 409 {
            return self.resolve_conflict(token, &request.request_id).await;
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Calendar returned server error");
            return Err(ActionError::Indeterminate(format!(
                "calendar returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(ActionResult::failure(format!(
                "calendar returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let created: Option<CreatedEvent> = response.json().await.ok();
        let reference = created.and_then(CreatedEvent::reference);
        debug!(reference = ?reference, "Event created");

        Ok(ActionResult::success(reference))
    }
}

/// Backend that logs the request and reports success without side effects.
#[derive(Debug, Clone, Default)]
pub struct DryRunBackend;

#[async_trait]
impl ActionBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn create_event(&self, request: &CalendarRequest) -> Result<ActionResult, ActionError> {
        info!(
            title = %request.title,
            start = %request.start.to_rfc3339(),
            duration_minutes = request.duration_minutes,
            attendees = ?request.attendees,
            "Dry run: event not created"
        );
        Ok(ActionResult::success(Some(format!(
            "dry-run:{}",
            request.request_id
        ))))
    }
}
