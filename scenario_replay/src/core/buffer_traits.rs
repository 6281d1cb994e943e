//! Common interface over the scenario replay buffer variants.
//!
//! The orchestration loop drives every buffer the same way:
//!
//! - **ReplayBuffer**: generic transitions, episode returns, init conditions
//! - **PerceptionBuffer**: images and detections, no episode concept
//!
//! Operations a variant has no use for are accepted as no-ops so the loop
//! does not need to know which variant it holds.

use std::sync::Arc;

use super::episode::EpisodeRecord;
use super::transition::ScenarioId;
use crate::buffers::init_store::InitBatch;
use crate::error::Result;

/// Trait for buffers that demultiplex experience across scenario slots.
pub trait ScenarioBuffer: Send + Sync {
    /// Number of concurrently running scenario slots.
    fn num_scenario(&self) -> usize;

    /// Records currently held for one scenario slot (0 for unknown ids).
    fn scenario_len(&self, scenario_id: ScenarioId) -> usize;

    /// Records currently held across all scenario slots.
    fn len(&self) -> usize {
        (0..self.num_scenario()).map(|id| self.scenario_len(id)).sum()
    }

    /// Check if the buffer holds no record.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum records held across all scenario slots.
    fn capacity(&self) -> usize;

    /// Get buffer utilization as fraction (0.0 to 1.0).
    fn utilization(&self) -> f32 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.len() as f32 / capacity as f32
    }

    /// Records ever stored, including evicted ones.
    fn total_stored(&self) -> usize;

    /// Close the current episode of every scenario slot.
    fn finish_one_episode(&self) -> Result<Vec<EpisodeRecord>>;

    /// Store the initial conditions of a scenario-generation episode.
    fn store_init(&self, batch: InitBatch) -> Result<()>;

    /// Clear all step data from the buffer.
    fn clear(&self);
}

/// Shared scenario buffer.
pub type SharedScenarioBuffer = Arc<dyn ScenarioBuffer>;
