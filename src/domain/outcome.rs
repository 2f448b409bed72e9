//! Terminal outcomes of a pipeline run.

use serde::{Deserialize, Serialize};

use super::event::EventConfirmation;

/// What a completed run produced.
///
/// Every variant implies a different safe next step for the caller, so they
/// are never collapsed into one generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PipelineOutcome {
    /// The event was created and a confirmation generated
    Confirmed(EventConfirmation),

    /// The gate rejected the input
    NotAnEvent,

    /// The backend explicitly refused the action
    ActionFailed { reason: String },

    /// The action was dispatched but its result is unknown
    Indeterminate { reason: String },
}

impl PipelineOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, PipelineOutcome::Confirmed(_))
    }

    /// Short label used in logs and the run trace
    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::Confirmed(_) => "confirmed",
            PipelineOutcome::NotAnEvent => "not_an_event",
            PipelineOutcome::ActionFailed { .. } => "action_failed",
            PipelineOutcome::Indeterminate { .. } => "indeterminate",
        }
    }

    /// Human-facing message for this outcome
    pub fn user_message(&self) -> String {
        match self {
            PipelineOutcome::Confirmed(confirmation) => confirmation.message.clone(),
            PipelineOutcome::NotAnEvent => {
                "This doesn't appear to be a calendar event request.".to_string()
            }
            PipelineOutcome::ActionFailed { reason } => format!(
                "The meeting has not been created: the calendar rejected it ({}). \
                 It is safe to correct the request and try again.",
                reason
            ),
            PipelineOutcome::Indeterminate { reason } => format!(
                "It is unknown whether the meeting was created ({}). \
                 Check the calendar before submitting the request again.",
                reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_distinct() {
        let outcomes = [
            PipelineOutcome::NotAnEvent,
            PipelineOutcome::ActionFailed {
                reason: "timeout".to_string(),
            },
            PipelineOutcome::Indeterminate {
                reason: "timeout".to_string(),
            },
        ];

        let messages: Vec<String> = outcomes.iter().map(|o| o.user_message()).collect();
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
        assert!(messages[2].contains("Check the calendar"));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PipelineOutcome::ActionFailed {
            reason: "forbidden".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "action_failed");
        assert_eq!(json["reason"], "forbidden");
    }
}
