//! Error types for the scenario replay buffers.
//!
//! Every failure is local and synchronous. A call that returns an error has
//! not mutated the buffer, so a supervising loop can skip the offending
//! scenario slot and carry on.

use thiserror::Error;

use crate::core::ScenarioId;

/// Result type for replay buffer operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Error types that can occur while storing or sampling experience.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    /// Misaligned field lengths, a missing column, or a payload whose shape
    /// differs from the one first stored for that field.
    #[error("Shape mismatch in '{field}': expected {expected}, got {actual}")]
    ShapeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// Sampling was requested before any eligible record exists.
    #[error("Cannot sample from empty {buffer} buffer")]
    EmptyBuffer { buffer: &'static str },

    /// Episode aggregation was requested for a scenario that has never
    /// recorded a `done` marker.
    #[error("Scenario {scenario_id} has no recorded episode boundary")]
    MissingEpisodeBoundary { scenario_id: ScenarioId },

    /// A step was tagged with a scenario id outside `0..num_scenario`.
    #[error("Scenario id {scenario_id} out of range (num_scenario = {num_scenario})")]
    UnknownScenario {
        scenario_id: ScenarioId,
        num_scenario: usize,
    },

    /// Under the `Reject` extra-key policy, an entry carried a key set that
    /// differs from the registered columns.
    #[error("Extra keys for {owner} do not match registered columns: expected {expected:?}, got {actual:?}")]
    ExtraKeyMismatch {
        owner: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Invalid configuration (num_scenario = 0, capacity too small, etc.)
    #[error("Invalid configuration for '{param}': {message}")]
    InvalidConfig {
        param: &'static str,
        message: String,
    },
}

impl ReplayError {
    /// Length disagreement between a field and the batch it belongs to.
    pub fn length_mismatch(field: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            expected: format!("length {}", expected),
            actual: format!("length {}", actual),
        }
    }

    /// Payload shape disagreement with the shape registered for a field.
    pub fn shape_mismatch(field: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            expected: format!("shape {:?}", expected),
            actual: format!("shape {:?}", actual),
        }
    }

    pub(crate) fn invalid_config(param: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            param,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_message() {
        let err = ReplayError::length_mismatch("reward", 3, 2);
        assert_eq!(
            err.to_string(),
            "Shape mismatch in 'reward': expected length 3, got length 2"
        );
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = ReplayError::shape_mismatch("image", &[3, 64, 64], &[3, 32, 32]);
        assert!(err.to_string().contains("[3, 64, 64]"));
        assert!(err.to_string().contains("[3, 32, 32]"));
    }

    #[test]
    fn test_missing_boundary_names_scenario() {
        let err = ReplayError::MissingEpisodeBoundary { scenario_id: 3 };
        assert!(err.to_string().contains("Scenario 3"));
    }
}
