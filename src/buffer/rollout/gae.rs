//! Generalized Advantage Estimation (GAE) computation
//!
//! Turns a resolved rollout buffer into advantage and return targets. Each
//! buffer is processed on its own; episode boundaries inside the buffer stop
//! the recursion.

use anyhow::{bail, Result};

use super::RolloutBuffer;

/// Advantage and return targets, aligned with the buffer's transitions
#[derive(Debug, Clone, PartialEq)]
pub struct Advantages {
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

/// Compute Generalized Advantage Estimation (GAE) for one buffer
///
/// # Mathematical Formula
/// ```text
/// δ_t = r_t + γ * nextValue_t - V_t
/// A_t = δ_t + γ * λ * A_{t+1}     (A_{t+1} treated as 0 when done_t)
/// R_t = A_t + V_t
/// ```
///
/// Fails on an empty buffer or one whose `next_value`s were never resolved.
pub fn compute_gae(buffer: &RolloutBuffer, gamma: f32, gae_lambda: f32) -> Result<Advantages> {
    if buffer.is_empty() {
        bail!("cannot compute advantages for an empty rollout buffer");
    }

    let transitions = buffer.transitions();
    let mut rewards = Vec::with_capacity(transitions.len());
    let mut values = Vec::with_capacity(transitions.len());
    let mut next_values = Vec::with_capacity(transitions.len());
    let mut dones = Vec::with_capacity(transitions.len());

    for (t, transition) in transitions.iter().enumerate() {
        let Some(next_value) = transition.next_value else {
            bail!("transition {} has no resolved next value", t);
        };
        rewards.push(transition.reward);
        values.push(transition.value);
        next_values.push(next_value);
        dones.push(transition.done);
    }

    let mut advantages = vec![0.0; transitions.len()];
    let mut returns = vec![0.0; transitions.len()];
    compute_gae_single_env(
        &rewards,
        &values,
        &next_values,
        &dones,
        gamma,
        gae_lambda,
        &mut advantages,
        &mut returns,
    );

    Ok(Advantages { advantages, returns })
}

/// Backward GAE pass over one chronological trajectory
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_gae_single_env(
    rewards: &[f32],
    values: &[f32],
    next_values: &[f32],
    dones: &[bool],
    gamma: f32,
    gae_lambda: f32,
    advantages: &mut [f32],
    returns: &mut [f32],
) {
    let num_steps = rewards.len();
    debug_assert_eq!(values.len(), num_steps);
    debug_assert_eq!(next_values.len(), num_steps);
    debug_assert_eq!(dones.len(), num_steps);
    debug_assert_eq!(advantages.len(), num_steps);
    debug_assert_eq!(returns.len(), num_steps);

    let mut gae = 0.0;

    for t in (0..num_steps).rev() {
        // Nothing flows back across an episode boundary
        if dones[t] {
            gae = 0.0;
        }

        let delta = rewards[t] + gamma * next_values[t] - values[t];
        gae = delta + gamma * gae_lambda * gae;

        advantages[t] = gae;
        returns[t] = values[t] + gae;
    }
}
