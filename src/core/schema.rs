//! Structured-output schemas sent to the provider, and the typed final
//! answers of the tool-calling modes.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::ResponseFormat;

/// Stage 1: `EventExtraction`
pub fn event_extraction() -> ResponseFormat {
    ResponseFormat {
        name: "event_extraction".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Cleaned description of the event or relevant snippet"
                },
                "is_event": {
                    "type": "boolean",
                    "description": "Whether this text should be scheduled in a calendar"
                },
                "confidence": {
                    "type": "number",
                    "description": "Confidence score between 0.0 and 1.0"
                }
            },
            "required": ["description", "is_event", "confidence"],
            "additionalProperties": false
        }),
    }
}

/// Stage 2: `RawEventDetails`
pub fn event_details() -> ResponseFormat {
    ResponseFormat {
        name: "event_details".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Title or summary of the event (e.g. 'Team Meeting')"
                },
                "start_time": {
                    "type": "string",
                    "description": "Absolute start date and time, ISO 8601 (e.g. 2025-07-08T14:00:00)"
                },
                "duration_minutes": {
                    "type": "integer",
                    "description": "Planned duration of the event, in minutes"
                },
                "participants": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "E-mail addresses of attendees"
                }
            },
            "required": ["name", "start_time", "duration_minutes", "participants"],
            "additionalProperties": false
        }),
    }
}

/// Stage 3: `EventConfirmation`
pub fn event_confirmation() -> ResponseFormat {
    ResponseFormat {
        name: "event_confirmation".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "User-facing confirmation text"
                },
                "reference_link": {
                    "type": ["string", "null"],
                    "description": "Link to the event, if one is known"
                }
            },
            "required": ["message", "reference_link"],
            "additionalProperties": false
        }),
    }
}

/// Final answer of the weather mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherResponse {
    /// Current temperature in celsius
    pub temperature: f64,

    /// Natural language summary for the user
    pub response: String,
}

pub fn weather_response() -> ResponseFormat {
    ResponseFormat {
        name: "weather_response".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "temperature": {
                    "type": "number",
                    "description": "The current temperature in celsius for the given coordinates."
                },
                "response": {
                    "type": "string",
                    "description": "A natural language summary of the weather for the user."
                }
            },
            "required": ["temperature", "response"],
            "additionalProperties": false
        }),
    }
}

/// Final answer of the knowledge-base mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbResponse {
    /// The answer to the user's question
    pub answer: String,

    /// Id of the record the answer came from
    pub source: u64,
}

pub fn kb_response() -> ResponseFormat {
    ResponseFormat {
        name: "kb_response".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The answer to the user's question."
                },
                "source": {
                    "type": "integer",
                    "description": "The record id of the answer."
                }
            },
            "required": ["answer", "source"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventConfirmation, EventExtraction, RawEventDetails};

    fn required(format: &ResponseFormat) -> Vec<String> {
        serde_json::from_value(format.schema["required"].clone()).unwrap()
    }

    #[test]
    fn test_schemas_match_records() {
        // Every required field must deserialize into the record
        let extraction: EventExtraction = serde_json::from_value(json!({
            "description": "call", "is_event": true, "confidence": 0.9
        }))
        .unwrap();
        assert!(extraction.is_event);
        assert_eq!(required(&event_extraction()).len(), 3);

        let details: RawEventDetails = serde_json::from_value(json!({
            "name": "Call", "start_time": "2025-07-08T15:00:00",
            "duration_minutes": 30, "participants": []
        }))
        .unwrap();
        assert_eq!(details.duration_minutes, 30);
        assert!(required(&event_details()).contains(&"start_time".to_string()));

        let confirmation: EventConfirmation = serde_json::from_value(json!({
            "message": "Booked", "reference_link": null
        }))
        .unwrap();
        assert!(confirmation.reference_link.is_none());
        assert_eq!(required(&event_confirmation()).len(), 2);
    }
}
