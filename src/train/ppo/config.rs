//! PPO hyperparameters
//!
//! Field names double as the JSON keys of the `ppo` section of a session
//! config.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// PPO configuration parameters
///
/// Defaults are common settings for small self-play arenas. Advantage
/// normalization is off so the surrogate sees raw GAE advantages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Learning rate for policy and value function
    pub learning_rate: f64,

    /// Number of passes over the pooled batch per update
    pub epochs: usize,

    /// Minibatch size for training
    pub mini_batch_size: usize,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon)
    pub clip_ratio: f64,

    /// Value function loss coefficient
    pub value_loss_coeff: f64,

    /// Entropy bonus coefficient
    pub entropy_coeff: f64,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Stop an epoch once the approximate KL exceeds this
    pub target_kl: Option<f64>,

    /// Normalize advantages within each minibatch
    pub normalize_advantages: bool,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            epochs: 4,
            mini_batch_size: 64,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_ratio: 0.2,
            value_loss_coeff: 0.5,
            entropy_coeff: 0.01,
            max_grad_norm: 0.5,
            target_kl: None,
            normalize_advantages: false,
        }
    }
}

impl PPOConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if self.epochs == 0 {
            return Err(anyhow!("epochs must be positive"));
        }
        if self.mini_batch_size == 0 {
            return Err(anyhow!("mini_batch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(anyhow!("gae_lambda must be in [0, 1]"));
        }
        if !(self.clip_ratio > 0.0 && self.clip_ratio.is_finite()) {
            return Err(anyhow!("clip_ratio must be positive"));
        }
        if !(self.value_loss_coeff >= 0.0 && self.value_loss_coeff.is_finite()) {
            return Err(anyhow!("value_loss_coeff must be non-negative"));
        }
        if !(self.entropy_coeff >= 0.0 && self.entropy_coeff.is_finite()) {
            return Err(anyhow!("entropy_coeff must be non-negative"));
        }
        if !(self.max_grad_norm > 0.0 && self.max_grad_norm.is_finite()) {
            return Err(anyhow!("max_grad_norm must be positive"));
        }
        if matches!(self.target_kl, Some(kl) if !(kl > 0.0 && kl.is_finite())) {
            return Err(anyhow!("target_kl must be positive when set"));
        }
        Ok(())
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set number of training epochs
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set minibatch size
    pub fn mini_batch_size(mut self, size: usize) -> Self {
        self.mini_batch_size = size;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_ratio(mut self, clip: f64) -> Self {
        self.clip_ratio = clip;
        self
    }

    /// Set value function loss coefficient
    pub fn value_loss_coeff(mut self, coef: f64) -> Self {
        self.value_loss_coeff = coef;
        self
    }

    /// Set entropy bonus coefficient
    pub fn entropy_coeff(mut self, coef: f64) -> Self {
        self.entropy_coeff = coef;
        self
    }

    /// Set maximum gradient norm
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }

    /// Set target KL divergence
    pub fn target_kl(mut self, kl: f64) -> Self {
        self.target_kl = Some(kl);
        self
    }

    /// Enable or disable per-minibatch advantage normalization
    pub fn normalize_advantages(mut self, normalize: bool) -> Self {
        self.normalize_advantages = normalize;
        self
    }
}
