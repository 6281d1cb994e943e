//! Core types and abstractions for scenario replay.

pub mod buffer_traits;
pub mod episode;
pub mod ring;
pub mod rng;
pub mod shape;
pub mod transition;
pub mod value;

pub use buffer_traits::{ScenarioBuffer, SharedScenarioBuffer};
pub use episode::{episode_return_from_dones, EpisodeRecord, EpisodeTracker};
pub use ring::Ring;
pub use rng::{draw_indices, SharedRng, Xoshiro256StarStar};
pub use shape::ShapeGuard;
pub use transition::{
    ExtraMap, SampledTransitions, ScenarioId, StepTag, Transition, TransitionBatch,
};
pub use value::{Tensor, Value};
