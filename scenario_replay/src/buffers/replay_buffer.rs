//! Multi-scenario replay buffer for the generic transition schema.
//!
//! Key characteristics:
//! - One batched simulation step is demultiplexed by scenario id
//! - Each scenario keeps the newest `buffer_capacity / num_scenario` steps
//! - Episode returns are derived from `done` markers and paired with the
//!   init conditions of the scenario-generation policy
//! - Two samplers: trajectory windows (`sample`) and init/return pairs
//!   (`sample_init`)
//!
//! # Locking
//!
//! Every scenario bucket sits behind its own `RwLock`. `store` write-locks
//! the buckets it touches in ascending scenario order, validates the whole
//! batch, then appends, so a failed call leaves nothing behind and one
//! scenario's columns always move together. Samplers read-lock every bucket
//! in the same order and therefore draw from one consistent snapshot.
//!
//! ```text
//! store(batch, tags) ──> route by scenario_id ──> bucket[0] ring columns
//!                                            └──> bucket[1] ring columns
//!                                                      │
//! sample(n, mode) <── uniform draw <── pooled windows ─┘
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::Rng;

use crate::config::{ReplayConfig, TrainMode};
use crate::core::{
    draw_indices, EpisodeRecord, ExtraMap, Ring, SampledTransitions, ScenarioBuffer, ScenarioId,
    ShapeGuard, SharedRng, StepTag, Transition, TransitionBatch, Value,
};
use crate::error::{ReplayError, Result};

use super::init_store::{InitBatch, InitStore, SampledInits};
use super::pooled_window::PooledWindow;
use super::scenario_store::ScenarioBucket;

/// Thread-safe multi-scenario replay buffer.
pub struct ReplayBuffer {
    config: ReplayConfig,
    /// One bucket per scenario slot
    buckets: Vec<RwLock<ScenarioBucket>>,
    /// Init conditions paired with episode returns
    init: RwLock<InitStore>,
    /// Registered action/observation widths
    shapes: Mutex<ShapeGuard>,
    /// Recently closed episodes, oldest first
    episodes: RwLock<Ring<EpisodeRecord>>,
    rng: SharedRng,
    /// Steps ever stored
    stored: AtomicUsize,
}

impl ReplayBuffer {
    /// Create a new replay buffer. Fails on an invalid configuration.
    pub fn new(config: ReplayConfig) -> Result<Self> {
        config.validate()?;
        let window = config.window_per_scenario();

        Ok(Self {
            buckets: (0..config.num_scenario)
                .map(|_| RwLock::new(ScenarioBucket::new(window)))
                .collect(),
            init: RwLock::new(InitStore::new(config.init_window())),
            shapes: Mutex::new(ShapeGuard::new()),
            episodes: RwLock::new(Ring::new(config.buffer_capacity)),
            rng: SharedRng::new(config.seed),
            stored: AtomicUsize::new(0),
            config,
        })
    }

    /// Get configuration.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    // ========================================================================
    // Per-Scenario Store
    // ========================================================================

    /// Store one batched simulation step.
    ///
    /// Entry `i` of every column goes to the bucket of `tags[i].scenario_id`,
    /// keeping the relative order of entries that share a scenario.
    pub fn store(&self, batch: TransitionBatch, tags: Vec<StepTag>) -> Result<()> {
        let n = tags.len();
        batch.check_aligned(n)?;
        if n == 0 {
            return Ok(());
        }

        let mut routes: BTreeMap<ScenarioId, Vec<usize>> = BTreeMap::new();
        for (pos, tag) in tags.iter().enumerate() {
            self.check_scenario(tag.scenario_id)?;
            routes.entry(tag.scenario_id).or_default().push(pos);
        }

        let mut shapes = self.shapes.lock();
        let pending_shapes = [
            ("ego_action", check_widths(&shapes, "ego_action", &batch.ego_action)?),
            (
                "scenario_action",
                check_widths(&shapes, "scenario_action", &batch.scenario_action)?,
            ),
            ("obs", check_widths(&shapes, "obs", &batch.obs)?),
            ("next_obs", check_widths(&shapes, "next_obs", &batch.next_obs)?),
        ];

        let mut guards: Vec<(ScenarioId, RwLockWriteGuard<'_, ScenarioBucket>)> = routes
            .keys()
            .map(|&id| (id, self.buckets[id].write()))
            .collect();

        for (id, bucket) in &guards {
            bucket.extras().check(
                &format!("scenario {}", id),
                self.config.extra_key_policy,
                routes[id].iter().map(|&pos| &tags[pos].extra),
            )?;
        }

        // Validation passed: nothing below can fail.
        for (field, shape) in pending_shapes {
            shapes.commit(field, shape);
        }
        drop(shapes);

        let mut rows: Vec<Option<(Transition, ExtraMap)>> = batch
            .into_transitions()
            .into_iter()
            .zip(tags.into_iter().map(|tag| tag.extra))
            .map(Some)
            .collect();

        for (id, bucket) in guards.iter_mut() {
            let positions = &routes[&*id];
            for &pos in positions {
                if let Some((transition, extra)) = rows[pos].take() {
                    bucket.push(transition, extra);
                }
            }
            log::trace!(
                "Scenario {} stored {} steps ({} held)",
                id,
                positions.len(),
                bucket.len()
            );
        }

        self.stored.fetch_add(n, Ordering::Relaxed);
        Ok(())
    }

    fn check_scenario(&self, scenario_id: ScenarioId) -> Result<()> {
        if scenario_id >= self.config.num_scenario {
            return Err(ReplayError::UnknownScenario {
                scenario_id,
                num_scenario: self.config.num_scenario,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Episode Aggregator
    // ========================================================================

    /// Append the return of every scenario's latest completed episode.
    ///
    /// The episode spans from just after the second-to-last `done` marker
    /// (or the first step) to the last `done` marker. Fails without
    /// appending anything if any scenario has never seen a `done` marker.
    pub fn finish_one_episode(&self) -> Result<Vec<EpisodeRecord>> {
        let records = {
            let buckets = self.read_all();
            buckets
                .iter()
                .enumerate()
                .map(|(scenario_id, bucket)| {
                    bucket
                        .episode()
                        .last_closed()
                        .map(|episode_return| EpisodeRecord {
                            scenario_id,
                            episode_return,
                        })
                        .ok_or(ReplayError::MissingEpisodeBoundary { scenario_id })
                })
                .collect::<Result<Vec<_>>>()?
        };

        self.init
            .write()
            .attach_returns(records.iter().map(|r| r.episode_return));

        let mut history = self.episodes.write();
        for record in &records {
            history.push(*record);
        }

        log::debug!(
            "Finished episode for {} scenarios, returns {:?}",
            records.len(),
            records.iter().map(|r| r.episode_return).collect::<Vec<_>>()
        );
        Ok(records)
    }

    /// Recently closed episodes (at most `buffer_capacity`), oldest first.
    pub fn episode_history(&self) -> Vec<EpisodeRecord> {
        self.episodes.read().iter().copied().collect()
    }

    /// Mean return over `episode_history`, `None` before any episode.
    pub fn mean_episode_return(&self) -> Option<f32> {
        let history = self.episodes.read();
        if history.is_empty() {
            return None;
        }
        let sum: f32 = history.iter().map(|r| r.episode_return).sum();
        Some(sum / history.len() as f32)
    }

    // ========================================================================
    // Trajectory Sampler
    // ========================================================================

    /// Draw `batch_size` steps uniformly with replacement from the pooled
    /// per-scenario windows, using the buffer's seeded generator.
    ///
    /// `TrainMode::TrainAgent` returns ego actions as `action`; every other
    /// mode returns scenario actions.
    pub fn sample(&self, batch_size: usize, mode: TrainMode) -> Result<SampledTransitions> {
        self.rng.with(|rng| self.sample_with_rng(batch_size, mode, rng))
    }

    /// Sample using the configured batch size and mode.
    pub fn sample_batch(&self) -> Result<SampledTransitions> {
        self.sample(self.config.batch_size, self.config.mode)
    }

    /// Like `sample`, drawing indices from a caller-supplied generator.
    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        mode: TrainMode,
        rng: &mut R,
    ) -> Result<SampledTransitions> {
        let buckets = self.read_all();
        let pool = PooledWindow::new(buckets.iter().map(|b| b.len()));
        if pool.total() == 0 {
            return Err(ReplayError::EmptyBuffer {
                buffer: "transition",
            });
        }

        let indices = draw_indices(rng, pool.total(), batch_size);
        let ego = mode.samples_ego_action();
        let keys: BTreeSet<&String> = buckets.iter().flat_map(|b| b.extras().keys()).collect();

        let mut batch = SampledTransitions::with_capacity(batch_size);
        let mut extras: Vec<Vec<Value>> = keys
            .iter()
            .map(|_| Vec::with_capacity(batch_size))
            .collect();

        for pooled in indices {
            let (scenario_id, row) = pool.locate(pooled);
            let bucket = &buckets[scenario_id];
            // `locate` only yields rows inside the window read-locked above.
            let step = bucket.step(row, ego);
            debug_assert!(step.is_some(), "row {} outside scenario {} window", row, scenario_id);
            let Some(step) = step else {
                continue;
            };

            batch.action.push(step.action.to_vec());
            batch.state.push(step.obs.to_vec());
            batch.n_state.push(step.next_obs.to_vec());
            batch.reward.push(step.reward);
            batch.done.push(step.done);
            batch.scenario_ids.push(scenario_id);
            for (key, column) in keys.iter().zip(extras.iter_mut()) {
                column.push(bucket.extras().get(key, row));
            }
        }

        batch.extras = keys.into_iter().cloned().zip(extras).collect();
        Ok(batch)
    }

    /// Reset the sampling generator.
    pub fn reseed(&self, seed: u64) {
        self.rng.reseed(seed);
    }

    fn read_all(&self) -> Vec<RwLockReadGuard<'_, ScenarioBucket>> {
        self.buckets.iter().map(|bucket| bucket.read()).collect()
    }

    // ========================================================================
    // Init Condition Store / Init Sampler
    // ========================================================================

    /// Store the initial conditions of one scenario-generation episode.
    pub fn store_init(&self, batch: InitBatch) -> Result<()> {
        let mut init = self.init.write();
        init.check(&batch, self.config.extra_key_policy)?;
        init.append(batch);
        Ok(())
    }

    /// Draw `batch_size` init records (with their episode returns) uniformly
    /// with replacement from the newest `buffer_capacity` records.
    pub fn sample_init(&self, batch_size: usize) -> Result<SampledInits> {
        self.rng.with(|rng| self.sample_init_with_rng(batch_size, rng))
    }

    /// Like `sample_init`, drawing indices from a caller-supplied generator.
    pub fn sample_init_with_rng<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<SampledInits> {
        self.init.read().sample(rng, batch_size)
    }

    /// Init records currently held.
    pub fn init_len(&self) -> usize {
        self.init.read().len()
    }

    /// Held init records already paired with an episode return.
    pub fn paired_init_len(&self) -> usize {
        self.init.read().eligible()
    }

    /// Init records ever stored.
    pub fn total_init_stored(&self) -> usize {
        self.init.read().appended()
    }

    /// Episode returns waiting for their init record.
    pub fn pending_returns(&self) -> usize {
        self.init.read().pending()
    }

    /// Drop every init record and pending return.
    pub fn clear_init(&self) {
        self.init.write().clear();
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Steps currently held for one scenario (0 for unknown ids).
    pub fn scenario_len(&self, scenario_id: ScenarioId) -> usize {
        self.buckets
            .get(scenario_id)
            .map(|bucket| bucket.read().len())
            .unwrap_or(0)
    }

    /// Steps ever stored for one scenario, including evicted ones.
    pub fn scenario_total(&self, scenario_id: ScenarioId) -> usize {
        self.buckets
            .get(scenario_id)
            .map(|bucket| bucket.read().total())
            .unwrap_or(0)
    }

    /// Extra keys registered for one scenario.
    pub fn extra_keys(&self, scenario_id: ScenarioId) -> Vec<String> {
        self.buckets
            .get(scenario_id)
            .map(|bucket| bucket.read().extras().keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reward accumulated by a scenario's still-open episode.
    pub fn open_episode_return(&self, scenario_id: ScenarioId) -> Option<f32> {
        self.buckets
            .get(scenario_id)
            .map(|bucket| bucket.read().episode().open_return())
    }

    /// Steps ever stored across all scenarios.
    pub fn total_stored(&self) -> usize {
        self.stored.load(Ordering::Relaxed)
    }

    /// Whether every scenario's columns hold the same number of rows.
    pub fn is_aligned(&self) -> bool {
        self.read_all().iter().all(|bucket| bucket.is_aligned())
    }

    /// Drop all step data, registered shapes and episode history.
    ///
    /// Init records are kept; use `clear_init` for those.
    pub fn clear(&self) {
        let mut shapes = self.shapes.lock();
        let mut buckets: Vec<_> = self.buckets.iter().map(|bucket| bucket.write()).collect();
        for bucket in buckets.iter_mut() {
            bucket.clear();
        }
        shapes.clear();
        self.episodes.write().clear();
        self.stored.store(0, Ordering::Relaxed);
    }
}

fn check_widths(
    shapes: &ShapeGuard,
    field: &'static str,
    rows: &[Vec<f32>],
) -> Result<Option<Vec<usize>>> {
    let widths: Vec<[usize; 1]> = rows.iter().map(|row| [row.len()]).collect();
    shapes.check(field, widths.iter().map(|w| &w[..]))
}

// ============================================================================
// ScenarioBuffer Trait Implementation
// ============================================================================

impl ScenarioBuffer for ReplayBuffer {
    fn num_scenario(&self) -> usize {
        self.config.num_scenario
    }

    fn scenario_len(&self, scenario_id: ScenarioId) -> usize {
        ReplayBuffer::scenario_len(self, scenario_id)
    }

    fn capacity(&self) -> usize {
        self.config.window_per_scenario() * self.config.num_scenario
    }

    fn total_stored(&self) -> usize {
        ReplayBuffer::total_stored(self)
    }

    fn finish_one_episode(&self) -> Result<Vec<EpisodeRecord>> {
        ReplayBuffer::finish_one_episode(self)
    }

    fn store_init(&self, batch: InitBatch) -> Result<()> {
        ReplayBuffer::store_init(self, batch)
    }

    fn clear(&self) {
        ReplayBuffer::clear(self);
    }
}

/// Thread-safe shared replay buffer.
pub type SharedReplayBuffer = Arc<ReplayBuffer>;

/// Create a new shared replay buffer.
pub fn shared_replay_buffer(config: ReplayConfig) -> Result<SharedReplayBuffer> {
    ReplayBuffer::new(config).map(Arc::new)
}
