//! PPO Trainer implementation
//!
//! This module contains the PPOTrainer struct and its update step.

use anyhow::{bail, Result};
use tch::{
    nn::{self, OptimizerConfig},
    Device, Kind, Tensor,
};

use super::{
    config::PPOConfig,
    loss::*,
    stats::{AggregatedStats, TrainingStats},
};
use crate::{buffer::TrainingBatch, policy::PolicyAgent};

/// PPO Trainer for policy optimization
///
/// Owns the Adam optimizer over the agent's parameters. The agent itself is
/// passed to every update by `&mut`, which is only possible while no
/// collector holds it.
pub struct PPOTrainer {
    config: PPOConfig,
    optimizer: nn::Optimizer,
    stats: AggregatedStats,
    total_updates: usize,
}

impl std::fmt::Debug for PPOTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PPOTrainer")
            .field("config", &self.config)
            .field("total_updates", &self.total_updates)
            .finish()
    }
}

impl PPOTrainer {
    /// Create a trainer whose optimizer covers every trainable parameter of `agent`
    pub fn new(config: PPOConfig, agent: &PolicyAgent) -> Result<Self> {
        config.validate()?;
        let optimizer = nn::Adam::default().build(agent.var_store(), config.learning_rate)?;
        let stats = AggregatedStats::new(config.learning_rate);

        Ok(Self { config, optimizer, stats, total_updates: 0 })
    }

    /// Get the configuration
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// Current, running-average and best statistics
    pub fn stats(&self) -> &AggregatedStats {
        &self.stats
    }

    /// Gradient steps taken so far
    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Run `epochs` passes of shuffled minibatch updates over `batch`
    ///
    /// An empty batch is a no-op and returns zeroed statistics. Once the
    /// approximate KL exceeds `target_kl` no further step is taken in any
    /// epoch. If a step fails, the steps already applied are still counted
    /// before the error is returned.
    pub fn update(&mut self, agent: &mut PolicyAgent, batch: &TrainingBatch) -> Result<TrainingStats> {
        if batch.is_empty() {
            tracing::debug!("Skipping PPO update: no transitions");
            return Ok(TrainingStats::zeros());
        }

        let tensors = BatchTensors::new(batch, agent)?;
        let batch_size = batch.len();
        let mut stats_sum = TrainingStats::zeros();
        let result = self.run_epochs(agent, &tensors, batch_size, &mut stats_sum);

        self.total_updates += stats_sum.num_updates;
        let averaged = stats_sum.average();
        if averaged.num_updates > 0 {
            self.stats.update(averaged.clone());
        }
        result?;

        tracing::info!(
            "PPO update: {} transitions, {} steps, policy {:.4}, value {:.4}, entropy {:.4}, kl {:.4}",
            batch_size,
            averaged.num_updates,
            averaged.policy_loss,
            averaged.value_loss,
            averaged.entropy,
            averaged.approx_kl
        );

        Ok(averaged)
    }

    fn run_epochs(
        &mut self,
        agent: &PolicyAgent,
        tensors: &BatchTensors,
        batch_size: usize,
        stats_sum: &mut TrainingStats,
    ) -> Result<()> {
        'epochs: for epoch in 0..self.config.epochs {
            for indices in generate_minibatch_indices(batch_size, self.config.mini_batch_size) {
                let step = self.minibatch_step(agent, tensors, &indices)?;
                let approx_kl = step.approx_kl;
                stats_sum.add(&step);

                if let Some(target_kl) = self.config.target_kl {
                    if approx_kl > target_kl {
                        tracing::debug!(
                            "Stopped in epoch {}: approx KL {:.4} > {:.4}",
                            epoch,
                            approx_kl,
                            target_kl
                        );
                        break 'epochs;
                    }
                }
            }
        }
        Ok(())
    }

    /// One gradient step; fails without touching the weights
    fn minibatch_step(
        &mut self,
        agent: &PolicyAgent,
        tensors: &BatchTensors,
        indices: &[usize],
    ) -> Result<TrainingStats> {
        let indices_i64: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
        let index = Tensor::from_slice(&indices_i64).to_device(tensors.device);

        let mb_obs = tensors.observations.index_select(0, &index);
        let mb_actions = tensors.actions.index_select(0, &index);
        let mb_old_log_probs = tensors.old_log_probs.index_select(0, &index);
        let mb_returns = tensors.returns.index_select(0, &index);
        let mut mb_advantages = tensors.advantages.index_select(0, &index);

        if self.config.normalize_advantages && indices.len() > 1 {
            let mean = mb_advantages.mean(Kind::Float);
            let std = mb_advantages.std(false);
            mb_advantages = (&mb_advantages - mean) / (std + 1e-8);
        }

        let (log_probs, entropy, values) = agent.evaluate_actions(&mb_obs, &mb_actions);

        let (policy_loss, clip_fraction, approx_kl) =
            compute_policy_loss(&log_probs, &mb_old_log_probs, &mb_advantages, self.config.clip_ratio);
        let (value_loss, explained_var) = compute_value_loss(&values, &mb_returns);
        let entropy_loss = compute_entropy_loss(&entropy);

        let loss = &policy_loss
            + self.config.value_loss_coeff * &value_loss
            + self.config.entropy_coeff * &entropy_loss;

        let total_loss = f64::try_from(&loss)?;
        if !total_loss.is_finite() {
            bail!("non-finite PPO loss ({}), skipping update", total_loss);
        }
        let stats = TrainingStats::new(
            f64::try_from(&policy_loss)?,
            f64::try_from(&value_loss)?,
            -f64::try_from(&entropy_loss)?,
            total_loss,
            clip_fraction,
            approx_kl,
            explained_var,
        );

        self.optimizer.zero_grad();
        loss.backward();
        self.optimizer.clip_grad_norm(self.config.max_grad_norm);
        self.optimizer.step();

        Ok(stats)
    }
}

/// A training batch moved onto the agent's device
struct BatchTensors {
    observations: Tensor,
    actions: Tensor,
    old_log_probs: Tensor,
    advantages: Tensor,
    returns: Tensor,
    device: Device,
}

impl BatchTensors {
    fn new(batch: &TrainingBatch, agent: &PolicyAgent) -> Result<Self> {
        let n = batch.len();
        let obs_dim = agent.observation_size();
        let act_dim = agent.action_size();

        if [batch.actions.len(), batch.old_log_probs.len(), batch.advantages.len(), batch.returns.len()]
            .iter()
            .any(|&len| len != n)
        {
            bail!("training batch columns have inconsistent lengths");
        }
        let observations = flatten(&batch.observations, obs_dim, "observation")?;
        let actions = flatten(&batch.actions, act_dim, "action")?;

        let device = agent.device();
        let rows = n as i64;
        Ok(Self {
            observations: Tensor::from_slice(&observations).view([rows, obs_dim as i64]).to_device(device),
            actions: Tensor::from_slice(&actions).view([rows, act_dim as i64]).to_device(device),
            old_log_probs: Tensor::from_slice(&batch.old_log_probs).to_device(device),
            advantages: Tensor::from_slice(&batch.advantages).to_device(device),
            returns: Tensor::from_slice(&batch.returns).to_device(device),
            device,
        })
    }
}

fn flatten(rows: &[Vec<f32>], width: usize, what: &str) -> Result<Vec<f32>> {
    let mut flat = Vec::with_capacity(rows.len() * width);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            bail!("{} {} has {} values, expected {}", what, i, row.len(), width);
        }
        flat.extend_from_slice(row);
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{env::ActionSpace, policy::NetworkConfig};

    fn agent() -> PolicyAgent {
        let config = NetworkConfig::new().hidden_sizes(vec![16]);
        PolicyAgent::with_device(2, vec![ActionSpace::Discrete; 2], config, Device::Cpu).unwrap()
    }

    fn batch(agent: &PolicyAgent, n: usize) -> TrainingBatch {
        let mut batch = TrainingBatch::default();
        for i in 0..n {
            let obs = vec![(i % 3) as f32 * 0.5, 1.0];
            let out = agent.act(&obs).unwrap();
            batch.observations.push(obs);
            batch.actions.push(out.action);
            batch.old_log_probs.push(out.log_prob);
            batch.old_values.push(out.value);
            batch.advantages.push(if i % 2 == 0 { 1.0 } else { -1.0 });
            batch.returns.push(1.0);
        }
        batch
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut agent = agent();
        let mut trainer = PPOTrainer::new(PPOConfig::default(), &agent).unwrap();
        let before = agent.export().unwrap();

        let stats = trainer.update(&mut agent, &TrainingBatch::default()).unwrap();
        assert_eq!(stats.num_updates, 0);
        assert_eq!(trainer.total_updates(), 0);
        assert_eq!(agent.export().unwrap(), before);
    }

    #[test]
    fn test_update_changes_parameters() {
        let mut agent = agent();
        let config = PPOConfig::new().epochs(2).mini_batch_size(8).learning_rate(1e-2);
        let mut trainer = PPOTrainer::new(config, &agent).unwrap();
        let before = agent.export().unwrap();

        let batch = batch(&agent, 20);
        let stats = trainer.update(&mut agent, &batch).unwrap();

        // 20 transitions in minibatches of 8: 3 steps per epoch
        assert_eq!(stats.num_updates, 6);
        assert_eq!(trainer.total_updates(), 6);
        assert!(stats.entropy > 0.0);
        assert_eq!(trainer.stats().current.entropy, stats.entropy);
        assert_ne!(agent.export().unwrap(), before);
    }

    #[test]
    fn test_target_kl_stops_epochs_early() {
        let mut agent = agent();
        let config = PPOConfig::new().epochs(3).mini_batch_size(4).learning_rate(0.5).target_kl(1e-9);
        let mut trainer = PPOTrainer::new(config, &agent).unwrap();

        // One repeated action with a negative advantage: every step lowers its log-prob
        let obs = vec![0.5_f32, 1.0];
        let action = vec![1.0_f32, 1.0];
        let old_log_prob = tch::no_grad(|| {
            let (lp, _, _) = agent.evaluate_actions(
                &Tensor::from_slice(&obs).view([1, 2]),
                &Tensor::from_slice(&action).view([1, 2]),
            );
            f32::try_from(lp).unwrap()
        });
        let batch = TrainingBatch {
            observations: vec![obs; 16],
            actions: vec![action; 16],
            old_log_probs: vec![old_log_prob; 16],
            old_values: vec![0.0; 16],
            advantages: vec![-1.0; 16],
            returns: vec![0.0; 16],
        };

        let stats = trainer.update(&mut agent, &batch).unwrap();
        // The first step starts at the rollout policy; the second already exceeds
        // the limit and ends the whole update, not just its epoch
        assert!((1..=2).contains(&stats.num_updates), "{} updates", stats.num_updates);
        assert_eq!(trainer.total_updates(), stats.num_updates);
    }

    #[test]
    fn test_failed_update_counts_applied_steps() {
        let mut agent = agent();
        let config = PPOConfig::new().epochs(1).mini_batch_size(1);
        let mut trainer = PPOTrainer::new(config, &agent).unwrap();
        let before = agent.export().unwrap();

        // one NaN return poisons the value loss of its minibatch only
        let mut poisoned = batch(&agent, 32);
        poisoned.returns[17] = f32::NAN;
        assert!(trainer.update(&mut agent, &poisoned).is_err());

        let applied = trainer.total_updates();
        assert!(applied < 32);
        assert_eq!(agent.export().unwrap() != before, applied > 0);
        if applied > 0 {
            assert_eq!(trainer.stats().total_steps, 1);
            assert_eq!(trainer.stats().current.num_updates, applied);
        } else {
            assert_eq!(trainer.stats().total_steps, 0);
        }
    }

    #[test]
    fn test_mismatched_batch_is_rejected() {
        let mut agent = agent();
        let mut trainer = PPOTrainer::new(PPOConfig::default(), &agent).unwrap();

        let mut bad = batch(&agent, 4);
        bad.observations[2] = vec![0.0; 5];
        assert!(trainer.update(&mut agent, &bad).is_err());

        let mut short = batch(&agent, 4);
        short.returns.pop();
        assert!(trainer.update(&mut agent, &short).is_err());
    }
}
