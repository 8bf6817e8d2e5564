//! Rollout buffer for storing one collector's transitions
//!
//! A buffer holds exactly `capacity` transitions in chronological order.
//! Episodes start and end anywhere inside it; the bootstrap pass run after
//! collection resolves each transition's `next_value` so GAE never has to
//! look outside the buffer.

use anyhow::{bail, Result};

use crate::env::{Outcome, OutcomeLabels};

pub mod gae;

#[cfg(test)]
mod tests;

pub use gae::{compute_gae, Advantages};

/// One agent decision and everything PPO needs to learn from it
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation the action was chosen from
    pub observation: Vec<f32>,

    /// One entry per action dimension (0/1 for discrete dimensions)
    pub action: Vec<f32>,

    /// Reward summed over every physics tick the action was held for
    pub reward: f32,

    /// Whether the episode ended during this decision
    pub done: bool,

    /// Value estimate of `observation` at collection time
    pub value: f32,

    /// Log-probability of `action` at collection time
    pub log_prob: f32,

    /// Value of the following state, `None` until the buffer is resolved
    pub next_value: Option<f32>,

    /// Per-seat outcome, present only on the transition where `done`
    pub outcome: Option<OutcomeLabels>,
}

/// Fixed-capacity, chronological store of transitions
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    transitions: Vec<Transition>,
    capacity: usize,
}

impl RolloutBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { transitions: Vec::with_capacity(capacity), capacity }
    }

    /// Append a transition
    pub fn push(&mut self, transition: Transition) -> Result<()> {
        if self.is_full() {
            bail!("rollout buffer is full ({} transitions)", self.capacity);
        }
        self.transitions.push(transition);
        Ok(())
    }

    /// Resolve `next_value` for every transition, walking backward
    ///
    /// Terminal transitions get 0; every other transition gets the value of
    /// the one after it, and the last one gets `bootstrap_value`.
    pub fn resolve_next_values(&mut self, bootstrap_value: f32) {
        let mut following: Option<f32> = None;
        for t in self.transitions.iter_mut().rev() {
            t.next_value = Some(if t.done { 0.0 } else { following.unwrap_or(bootstrap_value) });
            following = Some(t.value);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.transitions.iter().all(|t| t.next_value.is_some())
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn last(&self) -> Option<&Transition> {
        self.transitions.last()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.transitions.len() >= self.capacity
    }
}

/// Summary of one finished episode, from the trained seat's point of view
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    /// Result for the trained seat
    pub outcome: Outcome,

    /// Labels for every seat
    pub labels: OutcomeLabels,

    /// Sum of the trained seat's rewards
    pub total_reward: f32,

    /// Number of agent decisions
    pub length: usize,

    /// Simulated seconds
    pub duration: f32,

    /// Name of the opponent behavior that played the episode
    pub opponent: String,
}

/// Pooled transitions from every rollout, ready for the PPO trainer
///
/// GAE is computed per buffer before concatenation, so no advantage crosses
/// from one collector's buffer into another's.
#[derive(Debug, Clone, Default)]
pub struct TrainingBatch {
    /// Observations: \[batch_size, obs_dim\]
    pub observations: Vec<Vec<f32>>,

    /// Actions: \[batch_size, action_dim\]
    pub actions: Vec<Vec<f32>>,

    /// Rollout-time log probabilities: \[batch_size\]
    pub old_log_probs: Vec<f32>,

    /// Rollout-time value estimates: \[batch_size\]
    pub old_values: Vec<f32>,

    /// GAE advantages: \[batch_size\]
    pub advantages: Vec<f32>,

    /// Value targets: \[batch_size\]
    pub returns: Vec<f32>,
}

impl TrainingBatch {
    /// Compute GAE for each buffer and concatenate the results
    ///
    /// Empty buffers contribute nothing.
    pub fn from_rollouts<'a, I>(buffers: I, gamma: f32, gae_lambda: f32) -> Result<Self>
    where
        I: IntoIterator<Item = &'a RolloutBuffer>,
    {
        let mut batch = Self::default();
        for buffer in buffers.into_iter().filter(|b| !b.is_empty()) {
            let Advantages { advantages, returns } = compute_gae(buffer, gamma, gae_lambda)?;
            for t in buffer.transitions() {
                batch.observations.push(t.observation.clone());
                batch.actions.push(t.action.clone());
                batch.old_log_probs.push(t.log_prob);
                batch.old_values.push(t.value);
            }
            batch.advantages.extend(advantages);
            batch.returns.extend(returns);
        }
        Ok(batch)
    }

    /// Get batch size
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
