//! Perception replay buffer for adversarial-texture training.
//!
//! Stores camera images, detector outputs, attack textures and ground-truth
//! boxes per scenario slot. Sampling uses the same pooled window as
//! `ReplayBuffer`, but only label, image and loss reach the learner.
//! There is no episode concept.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ReplayConfig;
use crate::core::{
    draw_indices, EpisodeRecord, Ring, ScenarioBuffer, ScenarioId, ShapeGuard, SharedRng, Tensor,
};
use crate::error::{ReplayError, Result};

use super::init_store::InitBatch;
use super::pooled_window::PooledWindow;

// ============================================================================
// Step Types
// ============================================================================

/// One detected object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `[x1, y1, x2, y2]` in pixels
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: u32,
}

/// Detector output for one camera image (the ego side of a perception step).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
    pub detections: Vec<Detection>,
}

impl DetectorOutput {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

/// Adversarial texture applied by the scenario policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackAction {
    pub texture: Tensor,
}

/// Camera observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraObs {
    pub image: Tensor,
}

/// Per-entry info of a perception step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionInfo {
    pub scenario_id: ScenarioId,
    /// Ground-truth boxes
    pub bbox_label: Tensor,
    pub iou_loss: f32,
}

/// One batched perception step: four aligned columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerceptionStep {
    pub ego_actions: Vec<DetectorOutput>,
    pub scenario_actions: Vec<AttackAction>,
    pub obs: Vec<CameraObs>,
    pub infos: Vec<PerceptionInfo>,
}

impl PerceptionStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry to every column.
    pub fn push(
        &mut self,
        prediction: DetectorOutput,
        attack: AttackAction,
        obs: CameraObs,
        info: PerceptionInfo,
    ) {
        self.ego_actions.push(prediction);
        self.scenario_actions.push(attack);
        self.obs.push(obs);
        self.infos.push(info);
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// All four columns must be present and share one length.
    pub fn check_aligned(&self) -> Result<()> {
        let lengths = [
            ("ego_actions", self.ego_actions.len()),
            ("scenario_actions", self.scenario_actions.len()),
            ("obs", self.obs.len()),
            ("infos", self.infos.len()),
        ];

        let present = lengths.iter().filter(|(_, len)| *len > 0).count();
        if present != 0 && present != lengths.len() {
            let missing: Vec<&str> = lengths
                .iter()
                .filter(|(_, len)| *len == 0)
                .map(|(field, _)| *field)
                .collect();
            return Err(ReplayError::ShapeMismatch {
                field: "perception step".to_string(),
                expected: format!("{} columns", lengths.len()),
                actual: format!("{} columns, missing {:?}", present, missing),
            });
        }

        let expected = self.infos.len();
        for (field, len) in lengths {
            if len != expected {
                return Err(ReplayError::length_mismatch(field, expected, len));
            }
        }
        Ok(())
    }
}

/// Training batch for the perception attacker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledPerception {
    pub label: Vec<Tensor>,
    pub image: Vec<Tensor>,
    pub loss: Vec<f32>,
    pub scenario_ids: Vec<ScenarioId>,
}

impl SampledPerception {
    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone)]
struct PerceptionRecord {
    image: Tensor,
    bbox_label: Tensor,
    prediction: DetectorOutput,
    attack: AttackAction,
    iou_loss: f32,
}

#[derive(Debug, Clone)]
struct PerceptionBucket {
    records: Ring<PerceptionRecord>,
    total: usize,
}

impl PerceptionBucket {
    fn new(window: usize) -> Self {
        Self {
            records: Ring::new(window),
            total: 0,
        }
    }

    fn push(&mut self, record: PerceptionRecord) {
        self.records.push(record);
        self.total += 1;
    }
}

/// Thread-safe perception replay buffer.
pub struct PerceptionBuffer {
    config: ReplayConfig,
    buckets: Vec<RwLock<PerceptionBucket>>,
    /// Registered image and label shapes
    shapes: Mutex<ShapeGuard>,
    rng: SharedRng,
    stored: AtomicUsize,
}

impl PerceptionBuffer {
    /// Create a new perception buffer. Fails on an invalid configuration.
    pub fn new(config: ReplayConfig) -> Result<Self> {
        config.validate()?;
        let window = config.window_per_scenario();

        Ok(Self {
            buckets: (0..config.num_scenario)
                .map(|_| RwLock::new(PerceptionBucket::new(window)))
                .collect(),
            shapes: Mutex::new(ShapeGuard::new()),
            rng: SharedRng::new(config.seed),
            stored: AtomicUsize::new(0),
            config,
        })
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Store one batched perception step, routed by `infos[i].scenario_id`.
    pub fn store(&self, step: PerceptionStep) -> Result<()> {
        step.check_aligned()?;
        let n = step.len();
        if n == 0 {
            return Ok(());
        }

        let mut routes: BTreeMap<ScenarioId, Vec<usize>> = BTreeMap::new();
        for (pos, info) in step.infos.iter().enumerate() {
            if info.scenario_id >= self.config.num_scenario {
                return Err(ReplayError::UnknownScenario {
                    scenario_id: info.scenario_id,
                    num_scenario: self.config.num_scenario,
                });
            }
            routes.entry(info.scenario_id).or_default().push(pos);
        }

        let mut shapes = self.shapes.lock();
        let image = shapes.check("image", step.obs.iter().map(|o| o.image.shape()))?;
        let label = shapes.check("bbox_label", step.infos.iter().map(|i| i.bbox_label.shape()))?;
        shapes.commit("image", image);
        shapes.commit("bbox_label", label);

        let mut guards: Vec<_> = routes
            .keys()
            .map(|&id| (id, self.buckets[id].write()))
            .collect();
        drop(shapes);

        let PerceptionStep {
            ego_actions,
            scenario_actions,
            obs,
            infos,
        } = step;
        let mut rows: Vec<Option<PerceptionRecord>> = ego_actions
            .into_iter()
            .zip(scenario_actions)
            .zip(obs)
            .zip(infos)
            .map(|(((prediction, attack), obs), info)| {
                Some(PerceptionRecord {
                    image: obs.image,
                    bbox_label: info.bbox_label,
                    prediction,
                    attack,
                    iou_loss: info.iou_loss,
                })
            })
            .collect();

        for (id, bucket) in guards.iter_mut() {
            for &pos in &routes[&*id] {
                if let Some(record) = rows[pos].take() {
                    bucket.push(record);
                }
            }
            log::trace!("Perception scenario {} holds {} records", id, bucket.records.len());
        }

        self.stored.fetch_add(n, Ordering::Relaxed);
        Ok(())
    }

    /// Draw `batch_size` records uniformly with replacement from the pooled
    /// per-scenario windows.
    pub fn sample(&self, batch_size: usize) -> Result<SampledPerception> {
        self.rng.with(|rng| self.sample_with_rng(batch_size, rng))
    }

    /// Sample using the configured batch size.
    pub fn sample_batch(&self) -> Result<SampledPerception> {
        self.sample(self.config.batch_size)
    }

    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<SampledPerception> {
        let buckets = self.read_all();
        let pool = PooledWindow::new(buckets.iter().map(|b| b.records.len()));
        if pool.total() == 0 {
            return Err(ReplayError::EmptyBuffer {
                buffer: "perception",
            });
        }

        let mut batch = SampledPerception {
            label: Vec::with_capacity(batch_size),
            image: Vec::with_capacity(batch_size),
            loss: Vec::with_capacity(batch_size),
            scenario_ids: Vec::with_capacity(batch_size),
        };
        for pooled in draw_indices(rng, pool.total(), batch_size) {
            let (scenario_id, row) = pool.locate(pooled);
            let record = buckets[scenario_id].records.get(row);
            debug_assert!(record.is_some(), "row {} outside scenario {} window", row, scenario_id);
            let Some(record) = record else {
                continue;
            };
            batch.label.push(record.bbox_label.clone());
            batch.image.push(record.image.clone());
            batch.loss.push(record.iou_loss);
            batch.scenario_ids.push(scenario_id);
        }
        Ok(batch)
    }

    pub fn reseed(&self, seed: u64) {
        self.rng.reseed(seed);
    }

    fn read_all(&self) -> Vec<RwLockReadGuard<'_, PerceptionBucket>> {
        self.buckets.iter().map(|bucket| bucket.read()).collect()
    }

    /// Detector outputs held for one scenario, oldest first.
    pub fn scenario_predictions(&self, scenario_id: ScenarioId) -> Vec<DetectorOutput> {
        self.buckets
            .get(scenario_id)
            .map(|bucket| {
                bucket
                    .read()
                    .records
                    .iter()
                    .map(|r| r.prediction.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attack textures held for one scenario, oldest first.
    pub fn scenario_attacks(&self, scenario_id: ScenarioId) -> Vec<AttackAction> {
        self.buckets
            .get(scenario_id)
            .map(|bucket| {
                bucket
                    .read()
                    .records
                    .iter()
                    .map(|r| r.attack.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn scenario_len(&self, scenario_id: ScenarioId) -> usize {
        self.buckets
            .get(scenario_id)
            .map(|bucket| bucket.read().records.len())
            .unwrap_or(0)
    }

    /// Records ever stored for one scenario, including evicted ones.
    pub fn scenario_total(&self, scenario_id: ScenarioId) -> usize {
        self.buckets
            .get(scenario_id)
            .map(|bucket| bucket.read().total)
            .unwrap_or(0)
    }

    pub fn total_stored(&self) -> usize {
        self.stored.load(Ordering::Relaxed)
    }

    /// Drop all records and registered shapes.
    pub fn clear(&self) {
        let mut shapes = self.shapes.lock();
        let mut buckets: Vec<_> = self.buckets.iter().map(|bucket| bucket.write()).collect();
        for bucket in buckets.iter_mut() {
            bucket.records.clear();
            bucket.total = 0;
        }
        shapes.clear();
        self.stored.store(0, Ordering::Relaxed);
    }
}

impl ScenarioBuffer for PerceptionBuffer {
    fn num_scenario(&self) -> usize {
        self.config.num_scenario
    }

    fn scenario_len(&self, scenario_id: ScenarioId) -> usize {
        PerceptionBuffer::scenario_len(self, scenario_id)
    }

    fn capacity(&self) -> usize {
        self.config.window_per_scenario() * self.config.num_scenario
    }

    fn total_stored(&self) -> usize {
        PerceptionBuffer::total_stored(self)
    }

    /// Perception scenarios have no episodes.
    fn finish_one_episode(&self) -> Result<Vec<EpisodeRecord>> {
        Ok(Vec::new())
    }

    fn store_init(&self, batch: InitBatch) -> Result<()> {
        log::trace!("Ignoring {} init rows on perception buffer", batch.rows());
        Ok(())
    }

    fn clear(&self) {
        PerceptionBuffer::clear(self);
    }
}

/// Thread-safe shared perception buffer.
pub type SharedPerceptionBuffer = Arc<PerceptionBuffer>;

/// Create a new shared perception buffer.
pub fn shared_perception_buffer(config: ReplayConfig) -> Result<SharedPerceptionBuffer> {
    PerceptionBuffer::new(config).map(Arc::new)
}
