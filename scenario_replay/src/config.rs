//! Replay buffer configuration.
//!
//! Mirrors the knobs of the training entry point: how many scenario slots run
//! in parallel, which policy side is being trained, the capacity budget and
//! the default batch size. `buffer_capacity` is split evenly across scenario
//! slots regardless of how full each one is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};

// ============================================================================
// Training Mode
// ============================================================================

/// Which policy side consumes sampled batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainMode {
    /// Train the ego driving agent; batches carry ego actions.
    TrainAgent,
    /// Train the scenario adversary; batches carry scenario actions.
    TrainScenario,
    /// Evaluation; batches carry scenario actions.
    #[default]
    Eval,
}

impl TrainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrainAgent => "train_agent",
            Self::TrainScenario => "train_scenario",
            Self::Eval => "eval",
        }
    }

    /// Whether sampled `action` comes from the ego column.
    #[inline]
    pub fn samples_ego_action(&self) -> bool {
        matches!(self, Self::TrainAgent)
    }
}

impl fmt::Display for TrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainMode {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train_agent" => Ok(Self::TrainAgent),
            "train_scenario" => Ok(Self::TrainScenario),
            "eval" => Ok(Self::Eval),
            other => Err(ReplayError::invalid_config(
                "mode",
                format!("unknown mode '{}'", other),
            )),
        }
    }
}

// ============================================================================
// Extra Key Policy
// ============================================================================

/// What to do when an extra key is absent on some steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraKeyPolicy {
    /// Pad rows that lack the key with `Value::Missing`, including rows
    /// written before the key was first seen.
    #[default]
    Backfill,
    /// Refuse a store whose key set differs from the registered one. The
    /// first store for a scenario registers its keys.
    Reject,
}

// ============================================================================
// Replay Configuration
// ============================================================================

/// Configuration shared by both buffer variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Number of scenario slots running in parallel.
    pub num_scenario: usize,

    /// Policy side that `sample_batch` serves.
    pub mode: TrainMode,

    /// Capacity budget. Each scenario keeps `buffer_capacity / num_scenario`
    /// transitions; the init store keeps `buffer_capacity` records.
    pub buffer_capacity: usize,

    /// Default batch size for `sample_batch`.
    pub batch_size: usize,

    /// Seed of the sampling generator.
    pub seed: u64,

    /// Handling of extra keys that come and go.
    pub extra_key_policy: ExtraKeyPolicy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            num_scenario: 2,
            mode: TrainMode::Eval,
            buffer_capacity: 1000,
            batch_size: 256,
            seed: 0,
            extra_key_policy: ExtraKeyPolicy::Backfill,
        }
    }
}

impl ReplayConfig {
    /// Create a new config with default batch size, seed and policy.
    pub fn new(num_scenario: usize, mode: TrainMode, buffer_capacity: usize) -> Self {
        Self {
            num_scenario,
            mode,
            buffer_capacity,
            ..Self::default()
        }
    }

    /// Builder pattern: set number of scenario slots.
    pub fn with_num_scenario(mut self, num_scenario: usize) -> Self {
        self.num_scenario = num_scenario;
        self
    }

    /// Builder pattern: set training mode.
    pub fn with_mode(mut self, mode: TrainMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder pattern: set capacity budget.
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Builder pattern: set default batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder pattern: set sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder pattern: set extra key policy.
    pub fn with_extra_key_policy(mut self, policy: ExtraKeyPolicy) -> Self {
        self.extra_key_policy = policy;
        self
    }

    /// Transitions retained per scenario slot.
    #[inline]
    pub fn window_per_scenario(&self) -> usize {
        if self.num_scenario == 0 {
            return 0;
        }
        self.buffer_capacity / self.num_scenario
    }

    /// Init records retained.
    #[inline]
    pub fn init_window(&self) -> usize {
        self.buffer_capacity
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_scenario == 0 {
            return Err(ReplayError::invalid_config(
                "num_scenario",
                "at least one scenario slot is required",
            ));
        }
        if self.buffer_capacity < self.num_scenario {
            return Err(ReplayError::invalid_config(
                "buffer_capacity",
                format!(
                    "{} leaves an empty window for each of {} scenarios",
                    self.buffer_capacity, self.num_scenario
                ),
            ));
        }
        if self.batch_size == 0 {
            return Err(ReplayError::invalid_config("batch_size", "must be positive"));
        }
        Ok(())
    }
}
