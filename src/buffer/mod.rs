//! Experience buffers
//!
//! Rollout storage for on-policy training and the advantage computation that
//! turns a filled rollout into PPO targets.

pub mod rollout;

pub use rollout::{EpisodeSummary, RolloutBuffer, TrainingBatch, Transition};
