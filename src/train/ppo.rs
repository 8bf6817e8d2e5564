//! Proximal Policy Optimization (PPO) algorithm
//!
//! This module implements the PPO update used by the self-play session.
//! PPO is a policy gradient method that uses a clipped surrogate objective
//! to ensure stable, reliable policy updates.
//!
//! # Algorithm Overview
//!
//! ```text
//! For each training iteration:
//!   1. Collect rollouts from every collector using the current policy
//!   2. Compute advantages per rollout using GAE
//!   3. For multiple epochs:
//!      a. Sample minibatches from the pooled batch
//!      b. Compute PPO loss (clipped objective)
//!      c. Update policy via gradient descent
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [OpenAI Spinning Up: PPO](https://spinningup.openai.com/en/latest/algorithms/ppo.html)

mod config;
mod loss;
mod stats;
mod trainer;

pub use config::PPOConfig;
pub use loss::{compute_entropy_loss, compute_policy_loss, compute_value_loss, generate_minibatch_indices};
pub use stats::{AggregatedStats, TrainingStats};
pub use trainer::PPOTrainer;
