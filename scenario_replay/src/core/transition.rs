//! Transition types exchanged with the orchestration layer and the learner.
//!
//! - `Transition`: one row of the generic schema
//! - `TransitionBatch`: one batched simulation step, column-major
//! - `StepTag`: per-entry scenario id plus open extra map
//! - `SampledTransitions`: a training batch drawn by the trajectory sampler

use std::collections::BTreeMap;

use super::value::Value;
use crate::error::{ReplayError, Result};

/// Index of one concurrently running scenario slot (`0..num_scenario`).
pub type ScenarioId = usize;

/// Named extra values attached to one step.
pub type ExtraMap = BTreeMap<String, Value>;

/// One step of the generic transition schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Action taken by the ego driving policy
    pub ego_action: Vec<f32>,
    /// Action taken by the scenario (adversary) policy
    pub scenario_action: Vec<f32>,
    /// Observation before the step
    pub obs: Vec<f32>,
    /// Observation after the step
    pub next_obs: Vec<f32>,
    /// Reward received
    pub reward: f32,
    /// Episode ended at this step
    pub done: bool,
}

impl Transition {
    pub fn new(
        ego_action: Vec<f32>,
        scenario_action: Vec<f32>,
        obs: Vec<f32>,
        next_obs: Vec<f32>,
        reward: f32,
        done: bool,
    ) -> Self {
        Self {
            ego_action,
            scenario_action,
            obs,
            next_obs,
            reward,
            done,
        }
    }
}

/// One batched simulation step: aligned columns, one entry per active slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionBatch {
    pub ego_action: Vec<Vec<f32>>,
    pub scenario_action: Vec<Vec<f32>>,
    pub obs: Vec<Vec<f32>>,
    pub next_obs: Vec<Vec<f32>>,
    pub reward: Vec<f32>,
    pub done: Vec<bool>,
}

impl TransitionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row to every column.
    pub fn push(&mut self, transition: Transition) {
        self.ego_action.push(transition.ego_action);
        self.scenario_action.push(transition.scenario_action);
        self.obs.push(transition.obs);
        self.next_obs.push(transition.next_obs);
        self.reward.push(transition.reward);
        self.done.push(transition.done);
    }

    /// Number of entries, taken from the reward column.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Check that every column has exactly `expected` entries.
    pub fn check_aligned(&self, expected: usize) -> Result<()> {
        let lengths = [
            ("ego_action", self.ego_action.len()),
            ("scenario_action", self.scenario_action.len()),
            ("obs", self.obs.len()),
            ("next_obs", self.next_obs.len()),
            ("reward", self.reward.len()),
            ("done", self.done.len()),
        ];
        for (field, len) in lengths {
            if len != expected {
                return Err(ReplayError::length_mismatch(field, expected, len));
            }
        }
        Ok(())
    }

    /// Split into rows. Columns must already be aligned.
    pub fn into_transitions(self) -> Vec<Transition> {
        let Self {
            ego_action,
            scenario_action,
            obs,
            next_obs,
            reward,
            done,
        } = self;

        ego_action
            .into_iter()
            .zip(scenario_action)
            .zip(obs)
            .zip(next_obs)
            .zip(reward)
            .zip(done)
            .map(|(((((ego, scen), obs), next_obs), reward), done)| {
                Transition::new(ego, scen, obs, next_obs, reward, done)
            })
            .collect()
    }
}

impl FromIterator<Transition> for TransitionBatch {
    fn from_iter<I: IntoIterator<Item = Transition>>(iter: I) -> Self {
        let mut batch = Self::new();
        for transition in iter {
            batch.push(transition);
        }
        batch
    }
}

/// Routing tag for one entry of a `TransitionBatch`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepTag {
    pub scenario_id: ScenarioId,
    pub extra: ExtraMap,
}

impl StepTag {
    pub fn new(scenario_id: ScenarioId) -> Self {
        Self {
            scenario_id,
            extra: ExtraMap::new(),
        }
    }

    /// Builder pattern: attach an extra value (e.g. a safety cost).
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Training batch drawn from the per-scenario trajectories.
///
/// All columns are row-aligned: row `i` of every field comes from the same
/// stored transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledTransitions {
    /// Ego action under `TrainAgent`, scenario action otherwise
    pub action: Vec<Vec<f32>>,
    pub state: Vec<Vec<f32>>,
    pub n_state: Vec<Vec<f32>>,
    pub reward: Vec<f32>,
    pub done: Vec<bool>,
    /// Every registered extra column; absent keys come back as `Value::Missing`
    pub extras: BTreeMap<String, Vec<Value>>,
    /// Scenario each row was drawn from
    pub scenario_ids: Vec<ScenarioId>,
}

impl SampledTransitions {
    pub(crate) fn with_capacity(batch_size: usize) -> Self {
        Self {
            action: Vec::with_capacity(batch_size),
            state: Vec::with_capacity(batch_size),
            n_state: Vec::with_capacity(batch_size),
            reward: Vec::with_capacity(batch_size),
            done: Vec::with_capacity(batch_size),
            extras: BTreeMap::new(),
            scenario_ids: Vec::with_capacity(batch_size),
        }
    }

    pub fn len(&self) -> usize {
        self.reward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Done flags as 0.0 / 1.0 for loss computation.
    pub fn done_mask(&self) -> Vec<f32> {
        self.done.iter().map(|&d| if d { 1.0 } else { 0.0 }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_transition(i: usize) -> Transition {
        Transition::new(
            vec![i as f32],
            vec![-(i as f32)],
            vec![i as f32, 0.0],
            vec![(i + 1) as f32, 0.0],
            i as f32 * 0.5,
            i % 2 == 1,
        )
    }

    #[test]
    fn test_batch_round_trips_rows() {
        let rows: Vec<Transition> = (0..4).map(make_transition).collect();
        let batch: TransitionBatch = rows.clone().into_iter().collect();

        assert_eq!(batch.len(), 4);
        assert!(batch.check_aligned(4).is_ok());
        assert_eq!(batch.into_transitions(), rows);
    }

    #[test]
    fn test_check_aligned_names_short_field() {
        let mut batch: TransitionBatch = (0..3).map(make_transition).collect();
        batch.next_obs.pop();

        match batch.check_aligned(3) {
            Err(ReplayError::ShapeMismatch { field, .. }) => assert_eq!(field, "next_obs"),
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_step_tag_builder() {
        let tag = StepTag::new(2).with_extra("cost", 0.25).with_extra("collision", true);
        assert_eq!(tag.scenario_id, 2);
        assert_eq!(tag.extra.len(), 2);
        assert_eq!(tag.extra["cost"], Value::Scalar(0.25));
    }

    #[test]
    fn test_done_mask() {
        let batch = SampledTransitions {
            done: vec![true, false, true],
            reward: vec![0.0; 3],
            ..Default::default()
        };
        assert_eq!(batch.done_mask(), vec![1.0, 0.0, 1.0]);
    }
}
