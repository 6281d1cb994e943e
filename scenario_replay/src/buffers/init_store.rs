//! Init condition store for the scenario-generation policy.
//!
//! Key characteristics:
//! - One record per scenario per generation episode (`InitBatch` row)
//! - Episode returns are paired with records strictly by append order
//! - Only the newest `buffer_capacity` records are retained
//! - Only records that already carry a return are eligible for sampling
//!
//! Return `k` always belongs to record `k`. Returns can arrive before their
//! record; they wait in a queue bounded to the store capacity until the
//! matching `store_init`. Returns arriving while the queue is full are
//! dropped, and the records they belong to stay unpaired for good.

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;

use crate::config::ExtraKeyPolicy;
use crate::core::{draw_indices, ExtraMap, Ring, Value};
use crate::error::{ReplayError, Result};

use super::extra_columns::ExtraColumns;

const OWNER: &str = "init store";

/// Initial conditions of one scenario-generation episode, one row per scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitBatch {
    /// Static observation the initial action was chosen from
    pub static_obs: Vec<Vec<f32>>,
    /// Initial action of the scenario policy
    pub init_action: Vec<Vec<f32>>,
    /// Optional per-row extras; empty means no extras for this batch
    pub extra: Vec<ExtraMap>,
}

impl InitBatch {
    pub fn new(static_obs: Vec<Vec<f32>>, init_action: Vec<Vec<f32>>) -> Self {
        Self {
            static_obs,
            init_action,
            extra: Vec::new(),
        }
    }

    /// Builder pattern: attach per-row extras.
    pub fn with_extra(mut self, extra: Vec<ExtraMap>) -> Self {
        self.extra = extra;
        self
    }

    /// Row count, taken from `init_action`.
    pub fn rows(&self) -> usize {
        self.init_action.len()
    }

    pub fn is_empty(&self) -> bool {
        self.init_action.is_empty()
    }

    /// Check that `static_obs` and (when present) `extra` match the row count.
    pub fn check_aligned(&self) -> Result<()> {
        let rows = self.rows();
        if self.static_obs.len() != rows {
            return Err(ReplayError::length_mismatch("static_obs", rows, self.static_obs.len()));
        }
        if !self.extra.is_empty() && self.extra.len() != rows {
            return Err(ReplayError::length_mismatch("extra", rows, self.extra.len()));
        }
        Ok(())
    }
}

/// Training batch for the scenario-generation policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledInits {
    pub static_obs: Vec<Vec<f32>>,
    pub init_action: Vec<Vec<f32>>,
    pub episode_reward: Vec<f32>,
    pub extras: BTreeMap<String, Vec<Value>>,
}

impl SampledInits {
    pub fn len(&self) -> usize {
        self.episode_reward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episode_reward.is_empty()
    }
}

#[derive(Debug, Clone)]
struct InitRecord {
    static_obs: Vec<f32>,
    init_action: Vec<f32>,
    episode_return: Option<f32>,
}

#[derive(Debug, Clone)]
pub(crate) struct InitStore {
    records: Ring<InitRecord>,
    extras: ExtraColumns,
    /// Records ever appended
    appended: usize,
    /// Returns ever received, paired or not
    returned: usize,
    /// `(return index, return)` waiting for their record, ascending
    pending: VecDeque<(usize, f32)>,
}

impl InitStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Ring::new(capacity),
            extras: ExtraColumns::new(capacity),
            appended: 0,
            returned: 0,
            pending: VecDeque::new(),
        }
    }

    /// Validate a batch without mutating.
    pub fn check(&self, batch: &InitBatch, policy: ExtraKeyPolicy) -> Result<()> {
        batch.check_aligned()?;
        if batch.extra.is_empty() {
            let empty = ExtraMap::new();
            self.extras
                .check(OWNER, policy, std::iter::repeat(&empty).take(batch.rows()))
        } else {
            self.extras.check(OWNER, policy, batch.extra.iter())
        }
    }

    /// Append a batch that passed `check`.
    pub fn append(&mut self, batch: InitBatch) {
        let InitBatch {
            static_obs,
            init_action,
            extra,
        } = batch;
        let rows = init_action.len();
        let mut extra = extra.into_iter();

        for (static_obs, init_action) in static_obs.into_iter().zip(init_action) {
            let index = self.appended;
            let episode_return = match self.pending.front() {
                Some(&(returned, episode_return)) if returned == index => {
                    self.pending.pop_front();
                    Some(episode_return)
                }
                _ => None,
            };
            if episode_return.is_none() && index < self.returned {
                log::debug!("Init record {} lost its episode return to overflow", index);
            }

            let len_before = self.records.len();
            self.records.push(InitRecord {
                static_obs,
                init_action,
                episode_return,
            });
            self.extras.push(extra.next().unwrap_or_default(), len_before);
            self.appended += 1;
        }

        log::trace!("Stored {} init records ({} total)", rows, self.appended);
    }

    /// Hand over episode returns in scenario order. Return `k` pairs with
    /// the `k`-th record ever appended.
    pub fn attach_returns(&mut self, returns: impl IntoIterator<Item = f32>) {
        let limit = self.records.capacity();
        let mut dropped = 0;

        for episode_return in returns {
            let index = self.returned;
            self.returned += 1;

            if index < self.appended {
                let evicted = self.appended - self.records.len();
                match index
                    .checked_sub(evicted)
                    .and_then(|pos| self.records.get_mut(pos))
                {
                    Some(record) => record.episode_return = Some(episode_return),
                    None => log::debug!(
                        "Init record {} was evicted before its episode return arrived",
                        index
                    ),
                }
            } else if self.pending.len() < limit {
                self.pending.push_back((index, episode_return));
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            log::warn!(
                "Dropping {} episode returns with no init record to pair with",
                dropped
            );
        }
    }

    /// Records currently held (the sampling window).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Returns waiting for their init record.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Held records that carry a return.
    pub fn eligible(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.episode_return.is_some())
            .count()
    }

    /// Draw `batch_size` paired records uniformly with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> Result<SampledInits> {
        let paired: Vec<(usize, &InitRecord, f32)> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| record.episode_return.map(|ret| (idx, record, ret)))
            .collect();
        if paired.is_empty() {
            return Err(ReplayError::EmptyBuffer { buffer: OWNER });
        }

        let draws: Vec<(usize, &InitRecord, f32)> = draw_indices(rng, paired.len(), batch_size)
            .into_iter()
            .map(|draw| paired[draw])
            .collect();

        let mut batch = SampledInits {
            static_obs: Vec::with_capacity(batch_size),
            init_action: Vec::with_capacity(batch_size),
            episode_reward: Vec::with_capacity(batch_size),
            extras: BTreeMap::new(),
        };
        for &(_, record, episode_return) in &draws {
            batch.static_obs.push(record.static_obs.clone());
            batch.init_action.push(record.init_action.clone());
            batch.episode_reward.push(episode_return);
        }
        for key in self.extras.keys() {
            let column = draws
                .iter()
                .map(|&(idx, _, _)| self.extras.get(key, idx))
                .collect();
            batch.extras.insert(key.clone(), column);
        }

        Ok(batch)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.extras.clear();
        self.appended = 0;
        self.returned = 0;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn batch(markers: &[f32]) -> InitBatch {
        InitBatch::new(
            markers.iter().map(|&m| vec![m, m]).collect(),
            markers.iter().map(|&m| vec![m]).collect(),
        )
    }

    #[test]
    fn test_pairs_in_append_order() {
        let mut store = InitStore::new(10);
        store.append(batch(&[1.0, 2.0]));
        assert_eq!(store.eligible(), 0);

        store.attach_returns([10.0, 20.0]);
        assert_eq!(store.eligible(), 2);

        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let sampled = store.sample(&mut rng, 50).unwrap();
        for (action, reward) in sampled.init_action.iter().zip(&sampled.episode_reward) {
            assert_eq!(*reward, action[0] * 10.0);
        }
    }

    #[test]
    fn test_returns_before_records_wait() {
        let mut store = InitStore::new(10);
        store.attach_returns([5.0]);
        assert_eq!(store.pending(), 1);

        store.append(batch(&[0.5]));
        assert_eq!(store.pending(), 0);
        assert_eq!(store.eligible(), 1);
    }

    #[test]
    fn test_unpaired_records_not_sampled() {
        let mut store = InitStore::new(10);
        store.append(batch(&[1.0, 2.0, 3.0]));
        store.attach_returns([10.0]);

        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        let sampled = store.sample(&mut rng, 20).unwrap();
        assert!(sampled.init_action.iter().all(|a| a[0] == 1.0));
    }

    #[test]
    fn test_window_keeps_newest_records() {
        let mut store = InitStore::new(3);
        store.append(batch(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        store.attach_returns([10.0, 20.0, 30.0, 40.0, 50.0]);

        assert_eq!(store.len(), 3);
        assert_eq!(store.eligible(), 3);

        let mut rng = Xoshiro256StarStar::seed_from_u64(2);
        let sampled = store.sample(&mut rng, 100).unwrap();
        assert!(sampled.init_action.iter().all(|a| a[0] >= 3.0));
        assert!(sampled.episode_reward.iter().all(|&r| r >= 30.0));
    }

    #[test]
    fn test_empty_store_errors() {
        let store = InitStore::new(3);
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        assert!(matches!(
            store.sample(&mut rng, 4),
            Err(ReplayError::EmptyBuffer { .. })
        ));
    }

    #[test]
    fn test_pending_is_bounded() {
        let mut store = InitStore::new(2);
        store.attach_returns([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.pending(), 2);
    }

    #[test]
    fn test_overflow_keeps_return_order() {
        let mut store = InitStore::new(2);
        store.attach_returns([100.0, 200.0, 300.0]);
        assert_eq!(store.pending(), 2);

        store.append(batch(&[1.0]));
        let mut rng = Xoshiro256StarStar::seed_from_u64(3);
        assert_eq!(store.sample(&mut rng, 4).unwrap().episode_reward, vec![100.0; 4]);

        // Record 2's return was dropped: it stays unpaired and is never drawn.
        store.append(batch(&[2.0, 3.0]));
        assert_eq!(store.pending(), 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.eligible(), 1);
        let sampled = store.sample(&mut rng, 20).unwrap();
        assert!(sampled.init_action.iter().all(|a| a[0] == 2.0));
        assert!(sampled.episode_reward.iter().all(|&r| r == 200.0));

        // Later returns still land on their own records.
        store.attach_returns([400.0]);
        store.append(batch(&[4.0]));
        assert_eq!(store.eligible(), 1);
        let sampled = store.sample(&mut rng, 20).unwrap();
        assert!(sampled.episode_reward.iter().all(|&r| r == 400.0));
    }

    #[test]
    fn test_gapped_pending_pairs_by_index() {
        let mut store = InitStore::new(2);
        store.attach_returns([10.0, 20.0, 30.0]);
        store.append(batch(&[1.0]));
        store.attach_returns([40.0]);
        store.append(batch(&[2.0, 3.0, 4.0]));

        // Record 3 carries return 40; record 2 lost its return and record 1 was evicted.
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let sampled = store.sample(&mut rng, 50).unwrap();
        for (action, reward) in sampled.init_action.iter().zip(&sampled.episode_reward) {
            assert_eq!(*reward, action[0] * 10.0);
            assert_ne!(action[0], 3.0);
        }
    }

    #[test]
    fn test_check_rejects_misaligned_rows() {
        let store = InitStore::new(4);
        let mut bad = batch(&[1.0, 2.0]);
        bad.static_obs.pop();
        assert!(matches!(
            store.check(&bad, ExtraKeyPolicy::Backfill),
            Err(ReplayError::ShapeMismatch { .. })
        ));

        let bad_extra = batch(&[1.0, 2.0]).with_extra(vec![ExtraMap::new()]);
        assert!(store.check(&bad_extra, ExtraKeyPolicy::Backfill).is_err());
    }
}
