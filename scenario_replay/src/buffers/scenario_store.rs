//! Per-scenario record-of-columns for the generic transition schema.
//!
//! Key characteristics:
//! - One bucket per scenario slot, every field a ring of the same capacity
//! - All columns of a bucket are pushed together, so lengths never diverge
//! - Episode returns are folded in as steps arrive (see `EpisodeTracker`)

use crate::core::{EpisodeTracker, ExtraMap, Ring, Transition};

use super::extra_columns::ExtraColumns;

/// Borrowed view of one stored step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepView<'a> {
    pub action: &'a [f32],
    pub obs: &'a [f32],
    pub next_obs: &'a [f32],
    pub reward: f32,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ScenarioBucket {
    ego_action: Ring<Vec<f32>>,
    scenario_action: Ring<Vec<f32>>,
    obs: Ring<Vec<f32>>,
    next_obs: Ring<Vec<f32>>,
    reward: Ring<f32>,
    done: Ring<bool>,
    extras: ExtraColumns,
    episode: EpisodeTracker,
    /// Steps ever stored, including evicted ones
    total: usize,
}

impl ScenarioBucket {
    pub fn new(window: usize) -> Self {
        Self {
            ego_action: Ring::new(window),
            scenario_action: Ring::new(window),
            obs: Ring::new(window),
            next_obs: Ring::new(window),
            reward: Ring::new(window),
            done: Ring::new(window),
            extras: ExtraColumns::new(window),
            episode: EpisodeTracker::new(),
            total: 0,
        }
    }

    /// Append one step to every column.
    pub fn push(&mut self, transition: Transition, extra: ExtraMap) {
        let len_before = self.len();
        let Transition {
            ego_action,
            scenario_action,
            obs,
            next_obs,
            reward,
            done,
        } = transition;

        self.episode.observe(reward, done);
        self.ego_action.push(ego_action);
        self.scenario_action.push(scenario_action);
        self.obs.push(obs);
        self.next_obs.push(next_obs);
        self.done.push(done);
        self.extras.push(extra, len_before);
        let evicted = self.reward.push(reward).is_some();
        if evicted && self.total.checked_rem(self.reward.capacity()) == Some(0) {
            log::debug!(
                "Scenario bucket wrapped after {} steps (window {})",
                self.total + 1,
                self.reward.capacity()
            );
        }
        self.total += 1;
    }

    /// Steps currently held (the sampling window).
    #[inline]
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn episode(&self) -> &EpisodeTracker {
        &self.episode
    }

    pub fn extras(&self) -> &ExtraColumns {
        &self.extras
    }

    /// Borrow row `idx` of the window, taking the action from the ego or
    /// scenario column.
    pub fn step(&self, idx: usize, ego: bool) -> Option<StepView<'_>> {
        let action = if ego {
            self.ego_action.get(idx)?
        } else {
            self.scenario_action.get(idx)?
        };
        Some(StepView {
            action,
            obs: self.obs.get(idx)?,
            next_obs: self.next_obs.get(idx)?,
            reward: *self.reward.get(idx)?,
            done: *self.done.get(idx)?,
        })
    }

    /// Rewards in the window, oldest first.
    #[cfg(test)]
    pub fn rewards(&self) -> impl Iterator<Item = f32> + '_ {
        self.reward.iter().copied()
    }

    /// Whether every column, extras included, holds the same number of rows.
    pub fn is_aligned(&self) -> bool {
        let len = self.len();
        self.ego_action.len() == len
            && self.scenario_action.len() == len
            && self.obs.len() == len
            && self.next_obs.len() == len
            && self.done.len() == len
            && self.extras.is_aligned(len)
    }

    pub fn clear(&mut self) {
        self.ego_action.clear();
        self.scenario_action.clear();
        self.obs.clear();
        self.next_obs.clear();
        self.reward.clear();
        self.done.clear();
        self.extras.clear();
        self.episode.reset();
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn step(marker: f32, done: bool) -> Transition {
        Transition::new(
            vec![marker],
            vec![-marker],
            vec![marker, marker],
            vec![marker + 1.0, marker + 1.0],
            marker,
            done,
        )
    }

    #[test]
    fn test_bucket_keeps_newest_window() {
        let mut bucket = ScenarioBucket::new(3);
        for i in 0..5 {
            bucket.push(step(i as f32, false), ExtraMap::new());
        }

        assert_eq!(bucket.len(), 3);
        assert_eq!(bucket.total(), 5);
        assert!(bucket.is_aligned());
        assert_eq!(bucket.rewards().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);

        let oldest = bucket.step(0, true).unwrap();
        assert_eq!(oldest.action, &[2.0]);
        assert_eq!(oldest.obs, &[2.0, 2.0]);
        assert_eq!(bucket.step(0, false).unwrap().action, &[-2.0]);
        assert_eq!(bucket.step(2, true).unwrap().next_obs, &[5.0, 5.0]);
        assert!(bucket.step(3, true).is_none());
    }

    #[test]
    fn test_bucket_episode_survives_eviction() {
        let mut bucket = ScenarioBucket::new(2);
        for i in 1..=6 {
            bucket.push(step(i as f32, i == 6), ExtraMap::new());
        }
        // Only the last two steps are held, but the whole episode is summed.
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.episode().last_closed(), Some(21.0));
    }

    #[test]
    fn test_bucket_extras_stay_aligned() {
        let mut bucket = ScenarioBucket::new(4);
        bucket.push(step(0.0, false), ExtraMap::new());
        let mut extra = ExtraMap::new();
        extra.insert("cost".to_string(), Value::Scalar(2.0));
        bucket.push(step(1.0, false), extra);

        assert!(bucket.is_aligned());
        assert_eq!(bucket.extras().get("cost", 0), Value::Missing);
        assert_eq!(bucket.extras().get("cost", 1), Value::Scalar(2.0));
    }

    #[test]
    fn test_bucket_clear() {
        let mut bucket = ScenarioBucket::new(4);
        bucket.push(step(1.0, true), ExtraMap::new());
        bucket.clear();

        assert_eq!(bucket.len(), 0);
        assert_eq!(bucket.total(), 0);
        assert!(bucket.episode().last_closed().is_none());
    }
}
