//! Pipeline settings and loading.
//!
//! Settings are defined in YAML (the `pipeline:` section of the config file
//! or a standalone file) and carry the model, gate threshold, prompt
//! wording, time zone and Act-stage options.

use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::safety::SafetyLimits;
use crate::domain::CalendarOptions;

/// Documented default for the extraction gate
pub const DEFAULT_GATE_THRESHOLD: f64 = 0.7;

/// Settings for the calendar prompt chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Model used for all three stages
    #[serde(default = "default_model")]
    pub model: String,

    /// Minimum Stage 1 confidence to continue (inclusive)
    #[serde(default = "default_gate_threshold")]
    pub gate_threshold: f64,

    /// IANA zone for naive timestamps returned by the model
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Name the confirmation message is signed with
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    #[serde(default)]
    pub prompts: PromptSettings,

    /// Options passed to the calendar backend
    #[serde(default)]
    pub calendar: CalendarOptions,

    #[serde(default)]
    pub safety_limits: SafetyLimits,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_gate_threshold() -> f64 {
    DEFAULT_GATE_THRESHOLD
}
fn default_time_zone() -> String {
    "UTC".to_string()
}
fn default_assistant_name() -> String {
    "Susie".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            gate_threshold: default_gate_threshold(),
            time_zone: default_time_zone(),
            assistant_name: default_assistant_name(),
            prompts: PromptSettings::default(),
            calendar: CalendarOptions::default(),
            safety_limits: SafetyLimits::default(),
        }
    }
}

impl PipelineSettings {
    /// Load settings from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse settings from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline YAML")
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            anyhow::bail!("Pipeline model cannot be empty");
        }

        if !(0.0..=1.0).contains(&self.gate_threshold) {
            anyhow::bail!(
                "Gate threshold must be within [0.0, 1.0], got {}",
                self.gate_threshold
            );
        }

        self.tz()?;

        if self.safety_limits.provider_timeout_seconds == 0
            || self.safety_limits.action_timeout_seconds == 0
        {
            anyhow::bail!("Timeouts must be at least one second");
        }

        Ok(())
    }

    /// Parsed time zone
    pub fn tz(&self) -> Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown time zone '{}': {}", self.time_zone, e))
    }
}

/// Stage instructions. The date context is prepended by the stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSettings {
    #[serde(default = "default_extract_prompt")]
    pub extract: String,

    #[serde(default = "default_detail_prompt")]
    pub detail_parse: String,

    #[serde(default = "default_confirm_prompt")]
    pub confirm: String,
}

fn default_extract_prompt() -> String {
    "Analyze if the text describes a calendar event.".to_string()
}

fn default_detail_prompt() -> String {
    "Extract detailed event information. When dates reference 'next Tuesday' or similar \
     relative dates, use this current date as reference. If an extracted participant \
     e-mail doesn't contain an @ sign, add one to create a valid e-mail address."
        .to_string()
}

fn default_confirm_prompt() -> String {
    "Generate a concise, friendly confirmation message for the event.".to_string()
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            extract: default_extract_prompt(),
            detail_parse: default_detail_prompt(),
            confirm: default_confirm_prompt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PIPELINE_YAML: &str = r#"
model: gpt-4o
gate_threshold: 0.8
time_zone: Europe/Lisbon
assistant_name: Max

calendar:
  reminders: false
  visibility: private
  color_id: "4"

safety_limits:
  provider_timeout_seconds: 20
"#;

    #[test]
    fn test_settings_parsing() {
        let settings = PipelineSettings::from_yaml(TEST_PIPELINE_YAML).unwrap();

        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.gate_threshold, 0.8);
        assert_eq!(settings.tz().unwrap(), Tz::Europe__Lisbon);
        assert!(!settings.calendar.reminders);
        assert!(settings.calendar.add_conference_link);
        assert_eq!(settings.safety_limits.provider_timeout_seconds, 20);
        assert_eq!(settings.prompts, PromptSettings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::from_yaml("{}").unwrap();
        assert_eq!(settings.gate_threshold, DEFAULT_GATE_THRESHOLD);
        assert_eq!(settings.assistant_name, "Susie");
        assert_eq!(settings.tz().unwrap(), Tz::UTC);
    }

    #[test]
    fn test_invalid_threshold() {
        let settings = PipelineSettings {
            gate_threshold: 1.5,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_time_zone() {
        let settings = PipelineSettings {
            time_zone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
