//! The three effect-free stages of the calendar prompt chain.
//!
//! Each stage is exactly one completion call followed by deserialization
//! and domain validation. Stages never retry; the caller decides.

use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use super::pipeline::PipelineSettings;
use super::schema;
use crate::adapters::{
    ChatMessage, CompletionProvider, CompletionRequest, CompletionResponse, ProviderError,
};
use crate::domain::{
    ActionResult, EventConfirmation, EventDetails, EventExtraction, RawEventDetails,
    ValidationError,
};

/// Failure of a single stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// `"Today is Tuesday, July 08, 2025."`
pub fn date_context(today: NaiveDate) -> String {
    format!("Today is {}.", today.format("%A, %B %d, %Y"))
}

/// Run one completion call under `timeout`.
pub async fn complete_with_timeout(
    provider: &dyn CompletionProvider,
    request: CompletionRequest,
    timeout: Duration,
) -> Result<CompletionResponse, ProviderError> {
    tokio::time::timeout(timeout, provider.complete(request))
        .await
        .map_err(|_| ProviderError::Timeout(timeout))?
}

/// Stage 1: decide whether `input` describes a calendar event.
pub async fn extract_event(
    provider: &dyn CompletionProvider,
    settings: &PipelineSettings,
    input: &str,
    today: NaiveDate,
) -> Result<EventExtraction, StageError> {
    info!("Starting event extraction analysis");
    debug!(input, "Extraction input");

    let system = format!("{} {}", date_context(today), settings.prompts.extract);
    let request = CompletionRequest::new(
        settings.model.clone(),
        vec![ChatMessage::system(system), ChatMessage::user(input)],
    )
    .with_response_format(schema::event_extraction());

    let response = complete_with_timeout(
        provider,
        request,
        settings.safety_limits.provider_timeout(),
    )
    .await?;

    let extraction = response.parse::<EventExtraction>()?.validate()?;
    info!(
        is_event = extraction.is_event,
        confidence = extraction.confidence,
        "Extraction complete"
    );
    Ok(extraction)
}

/// Stage 2: turn the cleaned description into validated event details.
pub async fn parse_event_details(
    provider: &dyn CompletionProvider,
    settings: &PipelineSettings,
    tz: Tz,
    description: &str,
    today: NaiveDate,
) -> Result<EventDetails, StageError> {
    info!("Starting event details parsing");
    debug!(description, "Detail-parse input");

    let system = format!(
        "{} {} Assume the {} time zone. Return start_time as an absolute ISO 8601 date-time.",
        date_context(today),
        settings.prompts.detail_parse,
        tz.name()
    );
    let request = CompletionRequest::new(
        settings.model.clone(),
        vec![ChatMessage::system(system), ChatMessage::user(description)],
    )
    .with_response_format(schema::event_details());

    let response = complete_with_timeout(
        provider,
        request,
        settings.safety_limits.provider_timeout(),
    )
    .await?;

    let details = response.parse::<RawEventDetails>()?.validate(tz)?;
    info!(
        name = %details.name,
        start_time = %details.start_time.to_rfc3339(),
        duration_minutes = details.duration_minutes,
        "Parsed event details"
    );
    debug!(participants = ?details.participants, "Participants");
    Ok(details)
}

/// Stage 3: generate the user-facing confirmation.
///
/// The Act stage's result is part of the prompt so the model can mention
/// the created event; a missing link is filled from the action reference.
pub async fn generate_confirmation(
    provider: &dyn CompletionProvider,
    settings: &PipelineSettings,
    details: &EventDetails,
    action: &ActionResult,
) -> Result<EventConfirmation, StageError> {
    info!("Generating confirmation message");

    let system = format!(
        "{} Sign off with your name; {}",
        settings.prompts.confirm, settings.assistant_name
    );
    let context = json!({
        "event": details,
        "calendar_reference": action.external_reference,
    });
    let request = CompletionRequest::new(
        settings.model.clone(),
        vec![
            ChatMessage::system(system),
            ChatMessage::user(context.to_string()),
        ],
    )
    .with_response_format(schema::event_confirmation());

    let response = complete_with_timeout(
        provider,
        request,
        settings.safety_limits.provider_timeout(),
    )
    .await?;

    let mut confirmation = response.parse::<EventConfirmation>()?.validate()?;
    if confirmation.reference_link.is_none() {
        confirmation.reference_link = action.external_reference.clone();
    }

    info!("Confirmation message generated");
    debug!(message = %confirmation.message, "Confirmation");
    Ok(confirmation)
}
