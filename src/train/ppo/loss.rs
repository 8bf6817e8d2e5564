//! Loss computation functions for PPO
//!
//! This module contains the core loss computation functions used
//! in PPO training including policy loss, value loss, and entropy loss.

use tch::{Kind, Tensor};

/// Compute PPO policy loss with clipping
///
/// Returns (policy_loss, clip_fraction, approx_kl)
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under old policy
/// * `advantages` - Computed advantages
/// * `clip_ratio` - PPO clipping parameter (epsilon)
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_ratio: f64,
) -> (Tensor, f64, f64) {
    let ratio = (log_probs - old_log_probs).exp();

    // Clipped surrogate objective
    let clipped_ratio = ratio.clamp(1.0 - clip_ratio, 1.0 + clip_ratio);
    let surrogate_1 = advantages * &ratio;
    let surrogate_2 = advantages * clipped_ratio;
    let policy_loss = -surrogate_1.minimum(&surrogate_2).mean(Kind::Float);

    let (clip_fraction, approx_kl) = tch::no_grad(|| {
        let clip_fraction = (&ratio - 1.0).abs().gt(clip_ratio).to_kind(Kind::Float).mean(Kind::Float);
        // Approximate KL divergence for early stopping
        let approx_kl = (old_log_probs - log_probs).mean(Kind::Float);
        (clip_fraction, approx_kl)
    });

    (
        policy_loss,
        f64::try_from(&clip_fraction).unwrap_or(0.0),
        f64::try_from(&approx_kl).unwrap_or(0.0),
    )
}

/// Compute value function loss (mean squared error)
///
/// Returns (value_loss, explained_variance)
///
/// # Arguments
/// * `values` - Predicted values under current value function
/// * `returns` - GAE return targets
pub fn compute_value_loss(values: &Tensor, returns: &Tensor) -> (Tensor, f64) {
    let value_loss = (values - returns).square().mean(Kind::Float);

    let explained_var = tch::no_grad(|| {
        let var_returns = f64::try_from(returns.var(false)).unwrap_or(0.0);
        if var_returns == 0.0 {
            // Perfect prediction if no variance in returns
            1.0
        } else {
            let var_residual = f64::try_from((returns - values).var(false)).unwrap_or(0.0);
            1.0 - var_residual / var_returns
        }
    });

    (value_loss, explained_var)
}

/// Compute entropy loss (negative entropy for maximization)
///
/// # Arguments
/// * `entropy` - Per-sample entropy of the action distribution
pub fn compute_entropy_loss(entropy: &Tensor) -> Tensor {
    -entropy.mean(Kind::Float)
}

/// Generate minibatch indices for PPO training
///
/// Creates shuffled minibatches from a buffer of the given size.
/// Each minibatch contains approximately `batch_size` samples.
///
/// # Arguments
/// * `buffer_size` - Total number of samples in buffer
/// * `batch_size` - Desired size of each minibatch
///
/// # Returns
/// Vector of vectors, where each inner vector contains indices for one minibatch
pub fn generate_minibatch_indices(buffer_size: usize, batch_size: usize) -> Vec<Vec<usize>> {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let mut indices: Vec<usize> = (0..buffer_size).collect();
    indices.shuffle(&mut thread_rng());

    indices.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}
