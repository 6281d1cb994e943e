//! # Scenario Replay: Multi-Scenario Experience Replay
//!
//! Replay storage for adversarial training of autonomous-driving policies.
//! Several scenario slots run in parallel inside one simulator; each
//! simulation step yields a batch of transitions, one per active slot, that
//! is demultiplexed into per-scenario history and later sampled by either
//! the ego agent or the scenario (adversary) policy.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Simulator step (batched over slots)                             │
//! │  TransitionBatch + Vec<StepTag>                                  │
//! │                 │                                                │
//! │                 ▼  route by scenario_id                          │
//! │  ┌───────────┐ ┌───────────┐       ┌───────────┐                 │
//! │  │ scenario 0│ │ scenario 1│  ...  │ scenario N│  ring windows   │
//! │  └─────┬─────┘ └─────┬─────┘       └─────┬─────┘                 │
//! │        └──────┬──────┴───────────────────┘                       │
//! │               ▼                                                  │
//! │   sample(batch_size, mode)      finish_one_episode()             │
//! │   ego / scenario learner        ──> episode returns              │
//! │                                       │                          │
//! │   store_init(InitBatch) ──> init store ◄┘  sample_init()         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scenario_replay::{ReplayBuffer, ReplayConfig, StepTag, TrainMode, TransitionBatch};
//!
//! let config = ReplayConfig::new(4, TrainMode::TrainAgent, 10_000)
//!     .with_batch_size(128)
//!     .with_seed(7);
//! let buffer = ReplayBuffer::new(config)?;
//!
//! buffer.store(batch, tags)?;
//! let batch = buffer.sample_batch()?;
//! ```

pub mod buffers;
pub mod config;
pub mod core;
pub mod error;

pub use config::{ExtraKeyPolicy, ReplayConfig, TrainMode};
pub use error::{ReplayError, Result};

pub use crate::core::{
    episode_return_from_dones, EpisodeRecord, ExtraMap, SampledTransitions, ScenarioBuffer,
    ScenarioId, SharedScenarioBuffer, StepTag, Tensor, Transition, TransitionBatch, Value,
};

pub use buffers::{
    shared_perception_buffer, shared_replay_buffer, AttackAction, CameraObs, Detection,
    DetectorOutput, InitBatch, PerceptionBuffer, PerceptionInfo, PerceptionStep, ReplayBuffer,
    SampledInits, SampledPerception, SharedPerceptionBuffer, SharedReplayBuffer,
};
