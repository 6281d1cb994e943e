//! Replay buffer implementations for scenario training.
//!
//! Different scenario families store different experience:
//! - `ReplayBuffer`: generic transitions, episode returns and init conditions
//! - `PerceptionBuffer`: camera images and detections for texture attacks

mod extra_columns;
pub mod init_store;
pub mod perception;
mod pooled_window;
pub mod replay_buffer;
mod scenario_store;

pub use init_store::{InitBatch, SampledInits};
pub use perception::{
    shared_perception_buffer, AttackAction, CameraObs, Detection, DetectorOutput,
    PerceptionBuffer, PerceptionInfo, PerceptionStep, SampledPerception, SharedPerceptionBuffer,
};
pub use replay_buffer::{shared_replay_buffer, ReplayBuffer, SharedReplayBuffer};
