//! Input limits and call timeouts for pipeline execution.
//!
//! Every provider call carries an explicit timeout and input is checked
//! before the first provider call is made.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits applied to each invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Maximum input size in bytes (default: 64KB)
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,

    /// Timeout for each completion call in seconds (default: 60)
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: u64,

    /// Timeout for the Act stage in seconds (default: 30)
    #[serde(default = "default_action_timeout")]
    pub action_timeout_seconds: u64,

    /// Maximum request/execute rounds in the tool agent (default: 4)
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_max_input_bytes() -> u64 {
    64 * 1024
}
fn default_provider_timeout() -> u64 {
    60
}
fn default_action_timeout() -> u64 {
    30
}
fn default_max_tool_rounds() -> u32 {
    4
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            provider_timeout_seconds: default_provider_timeout(),
            action_timeout_seconds: default_action_timeout(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl SafetyLimits {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_seconds)
    }

    /// Reject empty and oversized input
    pub fn validate_input(&self, input: &str) -> Result<(), SafetyViolation> {
        if input.trim().is_empty() {
            return Err(SafetyViolation::EmptyInput);
        }

        let size = input.len() as u64;
        if size > self.max_input_bytes {
            return Err(SafetyViolation::MaxInputBytes {
                actual: size,
                limit: self.max_input_bytes,
            });
        }

        Ok(())
    }
}

/// Safety violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyViolation {
    #[error("Input is empty")]
    EmptyInput,

    #[error("Maximum input bytes exceeded: {actual} > {limit}")]
    MaxInputBytes { actual: u64, limit: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = SafetyLimits::default();
        assert_eq!(limits.max_input_bytes, 64 * 1024);
        assert_eq!(limits.provider_timeout(), Duration::from_secs(60));
        assert_eq!(limits.action_timeout(), Duration::from_secs(30));
        assert_eq!(limits.max_tool_rounds, 4);
    }

    #[test]
    fn test_input_validation() {
        let limits = SafetyLimits {
            max_input_bytes: 100,
            ..Default::default()
        };

        assert!(limits.validate_input("short").is_ok());
        assert_eq!(limits.validate_input("   \n"), Err(SafetyViolation::EmptyInput));

        let long_input = "x".repeat(200);
        let result = limits.validate_input(&long_input);
        assert!(matches!(result, Err(SafetyViolation::MaxInputBytes { .. })));
    }

    #[test]
    fn test_limits_yaml_defaults() {
        let limits: SafetyLimits = serde_yaml::from_str("provider_timeout_seconds: 5").unwrap();
        assert_eq!(limits.provider_timeout_seconds, 5);
        assert_eq!(limits.action_timeout_seconds, 30);
    }
}
