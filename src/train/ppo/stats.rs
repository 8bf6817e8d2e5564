//! Training statistics for PPO
//!
//! Per-update diagnostics and their running aggregate. The session reads
//! the entropy from here to report exploration.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Smoothing factor of the running averages
const EMA_ALPHA: f64 = 0.1;

/// Diagnostics of one gradient step, or the mean over several
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Clipped surrogate loss
    pub policy_loss: f64,

    /// Unscaled value MSE
    pub value_loss: f64,

    /// Mean action-distribution entropy
    pub entropy: f64,

    pub total_loss: f64,

    /// Fraction of samples whose ratio left the clip range
    pub clip_fraction: f64,

    /// Approximate KL divergence from the rollout-time policy
    pub approx_kl: f64,

    pub explained_var: f64,

    /// Gradient steps covered by these numbers
    pub num_updates: usize,
}

impl TrainingStats {
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Statistics of a single gradient step
    pub fn new(
        policy_loss: f64,
        value_loss: f64,
        entropy: f64,
        total_loss: f64,
        clip_fraction: f64,
        approx_kl: f64,
        explained_var: f64,
    ) -> Self {
        Self {
            policy_loss,
            value_loss,
            entropy,
            total_loss,
            clip_fraction,
            approx_kl,
            explained_var,
            num_updates: 1,
        }
    }

    /// Apply `f` to every diagnostic, pairing it with the same field of `other`
    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            policy_loss: f(self.policy_loss, other.policy_loss),
            value_loss: f(self.value_loss, other.value_loss),
            entropy: f(self.entropy, other.entropy),
            total_loss: f(self.total_loss, other.total_loss),
            clip_fraction: f(self.clip_fraction, other.clip_fraction),
            approx_kl: f(self.approx_kl, other.approx_kl),
            explained_var: f(self.explained_var, other.explained_var),
            num_updates: self.num_updates,
        }
    }

    /// Accumulate another step into this sum
    pub fn add(&mut self, other: &TrainingStats) {
        let updates = self.num_updates + other.num_updates;
        *self = self.zip_with(other, |a, b| a + b);
        self.num_updates = updates;
    }

    /// Mean over the accumulated steps; `num_updates` keeps the step count
    pub fn average(&self) -> Self {
        if self.num_updates == 0 {
            return Self::zeros();
        }
        let scale = self.num_updates as f64;
        self.zip_with(self, |a, _| a / scale)
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.add(other);
    }
}

/// Latest, smoothed and best statistics across updates
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedStats {
    pub current: TrainingStats,

    /// Exponential moving average, seeded by the first update
    pub running_avg: TrainingStats,

    pub best_policy_loss: f64,
    pub best_value_loss: f64,

    /// Updates recorded so far
    pub total_steps: usize,

    pub learning_rate: f64,
}

impl AggregatedStats {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            current: TrainingStats::zeros(),
            running_avg: TrainingStats::zeros(),
            best_policy_loss: f64::INFINITY,
            best_value_loss: f64::INFINITY,
            total_steps: 0,
            learning_rate,
        }
    }

    pub fn update(&mut self, stats: TrainingStats) {
        self.total_steps += 1;
        let alpha = if self.total_steps == 1 { 1.0 } else { EMA_ALPHA };
        self.running_avg = self.running_avg.zip_with(&stats, |avg, new| alpha * new + (1.0 - alpha) * avg);
        self.running_avg.num_updates += stats.num_updates;

        self.best_policy_loss = self.best_policy_loss.min(stats.policy_loss);
        self.best_value_loss = self.best_value_loss.min(stats.value_loss);
        self.current = stats;
    }
}
