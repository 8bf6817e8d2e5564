//! Training algorithms
//!
//! PPO is the only supported algorithm.

pub mod ppo;

pub use ppo::{
    compute_entropy_loss, compute_policy_loss, compute_value_loss, generate_minibatch_indices,
    AggregatedStats, PPOConfig, PPOTrainer, TrainingStats,
};
