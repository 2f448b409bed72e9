//! Orchestrator for the calendar prompt chain.
//!
//! Drives Extract → gate → Detail-Parse → Act → Confirm as a state machine,
//! records every transition in the run trace, and maps each way a run can
//! end onto a [`PipelineOutcome`] or a [`PipelineError`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::pipeline::PipelineSettings;
use super::safety::SafetyViolation;
use super::stages::{self, StageError};
use crate::adapters::{ActionBackend, ActionError, CompletionProvider, ProviderError};
use crate::domain::{
    ActionResult, CalendarRequest, EventDetails, EventExtraction, EventType, PipelineOutcome,
    PipelineState, RunTrace, Stage, StageEvent, ValidationError,
};

/// Exceptional end of a run.
///
/// Ordinary endings (gate rejection, backend refusal, unknown action
/// result) are outcomes, not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Provider { stage: Stage, source: ProviderError },

    #[error("{stage} stage returned invalid data: {source}")]
    Validation {
        stage: Stage,
        source: ValidationError,
    },

    #[error("input rejected: {0}")]
    Safety(#[from] SafetyViolation),

    #[error("run cancelled before the calendar was contacted")]
    Cancelled,

    /// The event exists; only the confirmation text is missing
    #[error("event created but confirmation failed: {source}")]
    ConfirmationFailed {
        reference: Option<String>,
        source: StageError,
    },
}

impl PipelineError {
    fn from_stage(stage: Stage, err: StageError) -> Self {
        match err {
            StageError::Provider(source) => PipelineError::Provider { stage, source },
            StageError::Validation(source) => PipelineError::Validation { stage, source },
        }
    }

    /// Human-facing message telling the user what is safe to do next
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfirmationFailed { reference, .. } => format!(
                "The meeting was created{} but no confirmation could be written. \
                 Do not submit the request again.",
                reference
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            ),
            PipelineError::Cancelled => {
                "The request was cancelled before anything was created.".to_string()
            }
            PipelineError::Safety(violation) => format!("The request was rejected: {}.", violation),
            other => format!(
                "Nothing was created ({}). It is safe to try again.",
                other
            ),
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub outcome: PipelineOutcome,
    pub extraction: EventExtraction,
    pub details: Option<EventDetails>,
    pub action: Option<ActionResult>,
    pub trace: RunTrace,
}

/// Calendar pipeline orchestrator.
///
/// Holds no per-run state; one instance may serve concurrent runs.
pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    backend: Arc<dyn ActionBackend>,
    settings: PipelineSettings,
    tz: Tz,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        backend: Arc<dyn ActionBackend>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let tz = settings.tz()?;

        Ok(Self {
            provider,
            backend,
            settings,
            tz,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Current date in the configured time zone
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Run the chain on `input`, resolving relative dates against `today`.
    pub async fn run(&self, input: &str, today: NaiveDate) -> Result<PipelineRun, PipelineError> {
        self.run_with_cancel(input, today, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run`], but stops at the next await point when
    /// `cancel` fires, as long as the calendar has not been contacted.
    pub async fn run_with_cancel(
        &self,
        input: &str,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let mut trace = RunTrace::new(run_id);

        let result = self.execute(run_id, &mut trace, input, today, cancel).await;

        match &result {
            Ok(run) => {
                info!(%run_id, outcome = run.outcome.label(), "Run finished");
            }
            Err(PipelineError::Cancelled) => {
                warn!(%run_id, "Run cancelled");
            }
            Err(e) => {
                error!(%run_id, error = %e, "Run failed");
            }
        }

        result
    }

    #[instrument(skip(self, trace, input, cancel), fields(run_id = %run_id))]
    async fn execute(
        &self,
        run_id: Uuid,
        trace: &mut RunTrace,
        input: &str,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, PipelineError> {
        trace.record(StageEvent::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("Run started ({} bytes of input)", input.len()),
        ));

        if let Err(violation) = self.settings.safety_limits.validate_input(input) {
            self.abort(trace, None, violation.to_string());
            return Err(violation.into());
        }

        // Stage 1
        let provider = self.provider.as_ref();
        let extraction = self
            .run_stage(
                trace,
                Stage::Extract,
                cancel,
                stages::extract_event(provider, &self.settings, input, today),
            )
            .await?;
        trace.transition(PipelineState::Extracted);

        if !extraction.passes_gate(self.settings.gate_threshold) {
            info!(
                is_event = extraction.is_event,
                confidence = extraction.confidence,
                threshold = self.settings.gate_threshold,
                "Gate check failed - not a calendar event"
            );
            trace.record(StageEvent::new(
                run_id,
                Some(Stage::Extract),
                EventType::GateRejected,
                format!(
                    "is_event={} confidence={:.3} threshold={:.3}",
                    extraction.is_event, extraction.confidence, self.settings.gate_threshold
                ),
            ));
            return Ok(self.finish(
                trace,
                PipelineState::GatedOut,
                PipelineOutcome::NotAnEvent,
                extraction,
                None,
                None,
            ));
        }
        info!("Gate check passed, proceeding with event processing");

        // Stage 2
        let details = self
            .run_stage(
                trace,
                Stage::DetailParse,
                cancel,
                stages::parse_event_details(
                    provider,
                    &self.settings,
                    self.tz,
                    &extraction.description,
                    today,
                ),
            )
            .await?;
        trace.transition(PipelineState::Detailed);

        // Last point at which cancellation is honoured
        if cancel.is_cancelled() {
            self.cancel(trace, Stage::Act);
            return Err(PipelineError::Cancelled);
        }

        // Act
        let request = CalendarRequest::from_details(&details, self.settings.calendar.clone());
        let action = self.act(trace, &request).await;
        trace.transition(PipelineState::Acted);

        let action = match action {
            Err(reason) => {
                let outcome = PipelineOutcome::Indeterminate { reason };
                return Ok(self.finish(
                    trace,
                    PipelineState::Indeterminate,
                    outcome,
                    extraction,
                    Some(details),
                    None,
                ));
            }
            Ok(result) if !result.succeeded => {
                let reason = result
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "rejected by the calendar".to_string());
                let outcome = PipelineOutcome::ActionFailed { reason };
                return Ok(self.finish(
                    trace,
                    PipelineState::ActionFailed,
                    outcome,
                    extraction,
                    Some(details),
                    Some(result),
                ));
            }
            Ok(result) => result,
        };

        // Stage 3 runs to completion even if cancelled: the event already exists
        let started = Instant::now();
        trace.record(StageEvent::new(
            run_id,
            Some(Stage::Confirm),
            EventType::StageStarted,
            "Confirm started",
        ));
        let confirmation =
            match stages::generate_confirmation(provider, &self.settings, &details, &action).await {
                Ok(confirmation) => confirmation,
                Err(e) => {
                    self.record_failure(trace, Stage::Confirm, started, &e.to_string());
                    self.abort(trace, Some(Stage::Confirm), e.to_string());
                    return Err(PipelineError::ConfirmationFailed {
                        reference: action.external_reference.clone(),
                        source: e,
                    });
                }
            };
        self.record_success(trace, Stage::Confirm, started);

        let outcome = PipelineOutcome::Confirmed(confirmation);
        Ok(self.finish(
            trace,
            PipelineState::Confirmed,
            outcome,
            extraction,
            Some(details),
            Some(action),
        ))
    }

    /// Run one effect-free stage, racing it against cancellation.
    async fn run_stage<T, F>(
        &self,
        trace: &mut RunTrace,
        stage: Stage,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        let started = Instant::now();
        trace.record(StageEvent::new(
            trace.run_id,
            Some(stage),
            EventType::StageStarted,
            format!("{} started", stage),
        ));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.cancel(trace, stage);
                return Err(PipelineError::Cancelled);
            }
            result = fut => result,
        };

        match result {
            Ok(value) => {
                self.record_success(trace, stage, started);
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(%stage, error = %message, "Stage failed");
                self.record_failure(trace, stage, started, &message);
                self.abort(trace, Some(stage), message);
                Err(PipelineError::from_stage(stage, e))
            }
        }
    }

    /// Dispatch the single effectful call.
    ///
    /// `Err` carries the reason the result is unknown.
    async fn act(
        &self,
        trace: &mut RunTrace,
        request: &CalendarRequest,
    ) -> Result<ActionResult, String> {
        let started = Instant::now();
        let timeout = self.settings.safety_limits.action_timeout();
        info!(
            backend = self.backend.name(),
            request_id = %request.request_id,
            "Creating calendar event"
        );
        trace.record(StageEvent::new(
            trace.run_id,
            Some(Stage::Act),
            EventType::StageStarted,
            format!("act started (request {})", request.request_id),
        ));

        let reason = match tokio::time::timeout(timeout, self.backend.create_event(request)).await {
            Ok(Ok(result)) => {
                if result.succeeded {
                    info!(reference = ?result.external_reference, "Calendar event created");
                    self.record_success(trace, Stage::Act, started);
                } else {
                    let reason = result.failure_reason.as_deref().unwrap_or("rejected");
                    warn!(reason, "Calendar rejected the event");
                    self.record_failure(trace, Stage::Act, started, reason);
                }
                return Ok(result);
            }
            Ok(Err(ActionError::Indeterminate(reason))) => reason,
            Err(_) => format!("no response from the calendar within {:?}", timeout),
        };

        error!(%reason, "Calendar call outcome unknown");
        self.record_failure(trace, Stage::Act, started, &reason);
        Err(reason)
    }

    fn record_success(&self, trace: &mut RunTrace, stage: Stage, started: Instant) {
        let event = StageEvent::new(
            trace.run_id,
            Some(stage),
            EventType::StageCompleted,
            format!("{} completed", stage),
        )
        .with_duration(started.elapsed().as_millis() as u64);
        trace.record(event);
    }

    fn record_failure(&self, trace: &mut RunTrace, stage: Stage, started: Instant, error: &str) {
        let event = StageEvent::new(
            trace.run_id,
            Some(stage),
            EventType::StageFailed,
            format!("{} failed", stage),
        )
        .with_duration(started.elapsed().as_millis() as u64)
        .with_error(error);
        trace.record(event);
    }

    fn abort(&self, trace: &mut RunTrace, stage: Option<Stage>, reason: impl Into<String>) {
        trace.record(
            StageEvent::new(trace.run_id, stage, EventType::RunFailed, "Run aborted")
                .with_error(reason),
        );
        trace.transition(PipelineState::Aborted);
    }

    fn cancel(&self, trace: &mut RunTrace, stage: Stage) {
        trace.record(StageEvent::new(
            trace.run_id,
            Some(stage),
            EventType::RunCancelled,
            format!("Run cancelled during {}", stage),
        ));
        trace.transition(PipelineState::Aborted);
    }

    fn finish(
        &self,
        trace: &mut RunTrace,
        state: PipelineState,
        outcome: PipelineOutcome,
        extraction: EventExtraction,
        details: Option<EventDetails>,
        action: Option<ActionResult>,
    ) -> PipelineRun {
        trace.transition(state);
        trace.record(StageEvent::new(
            trace.run_id,
            None,
            EventType::RunCompleted,
            format!("Run completed: {}", outcome.label()),
        ));

        PipelineRun {
            outcome,
            extraction,
            details,
            action,
            trace: trace.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DryRunBackend;
    use crate::adapters::{CompletionRequest, CompletionResponse};
    use async_trait::async_trait;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse::text(self.0))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 3).unwrap()
    }

    #[test]
    fn test_orchestrator_rejects_invalid_settings() {
        let settings = PipelineSettings {
            time_zone: "Nowhere/Special".to_string(),
            ..Default::default()
        };
        let result = Orchestrator::new(
            Arc::new(FixedProvider("{}")),
            Arc::new(DryRunBackend),
            settings,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_gate_rejection_trace() {
        let orchestrator = Orchestrator::new(
            Arc::new(FixedProvider(
                r#"{"description":"weather chat","is_event":false,"confidence":0.95}"#,
            )),
            Arc::new(DryRunBackend),
            PipelineSettings::default(),
        )
        .unwrap();

        let run = orchestrator.run("Nice weather today", today()).await.unwrap();
        assert_eq!(run.outcome, PipelineOutcome::NotAnEvent);
        assert_eq!(run.trace.state, PipelineState::GatedOut);
        assert_eq!(run.trace.stage_starts(Stage::DetailParse), 0);
        assert!(run
            .trace
            .events
            .iter()
            .any(|e| e.event_type == EventType::GateRejected));
    }

    #[test]
    fn test_error_messages_distinguish_created_event() {
        let confirm = PipelineError::ConfirmationFailed {
            reference: Some("https://calendar/evt".to_string()),
            source: StageError::Provider(ProviderError::EmptyResponse),
        };
        let provider = PipelineError::Provider {
            stage: Stage::Extract,
            source: ProviderError::RateLimited,
        };

        assert!(confirm.user_message().contains("Do not submit"));
        assert!(confirm.user_message().contains("https://calendar/evt"));
        assert!(provider.user_message().contains("safe to try again"));
    }
}
