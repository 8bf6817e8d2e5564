//! Checks that PPO moves the policy in the direction of the advantages
//!
//! The synthetic test uses a batch where the right action is obvious:
//! - When obs=0, thruster off has positive advantage
//! - When obs=1, thruster on has positive advantage
//!
//! The collection test runs the real collector against an environment that
//! pays seat 0 for every tick its thruster is on.

use anyhow::Result;
use arena_selfplay::{
    buffer::TrainingBatch,
    env::{ActionSpace, ArenaEnvironment, EnvStep, OutcomeLabels},
    opponent::OpponentPool,
    policy::{NetworkConfig, PolicyAgent},
    rollout::{CollectorConfig, RolloutCollector},
    session::SessionControl,
    train::{PPOConfig, PPOTrainer},
};
use tch::{Device, Tensor};

/// P(thruster on | obs) for a one-dimensional observation
fn p_on(agent: &PolicyAgent, obs: f32) -> f32 {
    tch::no_grad(|| {
        let observation = Tensor::from_slice(&[obs]).view([1, 1]).to_device(agent.device());
        let action = Tensor::from_slice(&[1.0_f32]).view([1, 1]).to_device(agent.device());
        let (log_prob, _, _) = agent.evaluate_actions(&observation, &action);
        f32::try_from(log_prob.exp()).unwrap()
    })
}

fn synthetic_batch(agent: &PolicyAgent) -> TrainingBatch {
    let mut batch = TrainingBatch::default();
    for i in 0..8 {
        let obs = if i < 4 { 0.0_f32 } else { 1.0 };
        let action = vec![obs];
        // log-prob of the stored action under the current policy
        let p = p_on(agent, obs);
        let old_log_prob = if obs == 1.0 { p.ln() } else { (1.0 - p).ln() };

        batch.observations.push(vec![obs]);
        batch.actions.push(action);
        batch.old_log_probs.push(old_log_prob);
        batch.old_values.push(0.0);
        batch.advantages.push(10.0);
        batch.returns.push(10.0);
    }
    batch
}

#[test]
fn test_ppo_learns_from_synthetic_data() {
    let network = NetworkConfig::new().hidden_sizes(vec![64]);
    let mut agent = PolicyAgent::with_device(1, vec![ActionSpace::Discrete], network, Device::Cpu).unwrap();

    let off_before = 1.0 - p_on(&agent, 0.0);
    let on_before = p_on(&agent, 1.0);
    println!("BEFORE: P(off | 0) = {:.4}, P(on | 1) = {:.4}", off_before, on_before);

    let config = PPOConfig::new()
        .learning_rate(0.01)
        .epochs(10)
        .mini_batch_size(8)
        .clip_ratio(0.2)
        .value_loss_coeff(0.5)
        .entropy_coeff(0.0)
        .max_grad_norm(0.5);
    let mut trainer = PPOTrainer::new(config, &agent).unwrap();

    for i in 0..5 {
        let batch = synthetic_batch(&agent);
        let stats = trainer.update(&mut agent, &batch).unwrap();
        println!(
            "PPO update {}: policy_loss={:.4}, value_loss={:.4}, clip_fraction={:.2}",
            i, stats.policy_loss, stats.value_loss, stats.clip_fraction
        );
    }

    let off_after = 1.0 - p_on(&agent, 0.0);
    let on_after = p_on(&agent, 1.0);
    println!("AFTER: P(off | 0) = {:.4}, P(on | 1) = {:.4}", off_after, on_after);

    assert!(
        off_after - off_before > 0.1,
        "P(off | 0) only moved from {:.4} to {:.4}",
        off_before,
        off_after
    );
    assert!(
        on_after - on_before > 0.1,
        "P(on | 1) only moved from {:.4} to {:.4}",
        on_before,
        on_after
    );
}

/// Seat 0 earns a point per tick with its thruster on; ties after 8 ticks
struct ThrusterReward {
    ticks: usize,
}

impl ThrusterReward {
    fn snapshot(&self, rewards: Vec<f32>, done: bool) -> EnvStep {
        EnvStep {
            observations: vec![vec![1.0], vec![1.0]],
            rewards,
            done,
            outcome: done.then(|| OutcomeLabels::tie(2)),
        }
    }
}

impl ArenaEnvironment for ThrusterReward {
    fn reset(&mut self) -> Result<EnvStep> {
        self.ticks = 0;
        Ok(self.snapshot(vec![0.0, 0.0], false))
    }

    fn step(&mut self, actions: &[Vec<f32>], _delta_time: f32) -> Result<EnvStep> {
        self.ticks += 1;
        let reward = if actions[0][0] > 0.5 { 1.0 } else { 0.0 };
        Ok(self.snapshot(vec![reward, 0.0], self.ticks >= 8))
    }

    fn num_players(&self) -> usize {
        2
    }

    fn observation_size(&self) -> usize {
        1
    }

    fn action_size(&self) -> usize {
        1
    }

    fn action_spaces(&self) -> Vec<ActionSpace> {
        vec![ActionSpace::Discrete]
    }
}

#[tokio::test]
async fn test_collect_and_train_improves_reward() -> Result<()> {
    let network = NetworkConfig::new().hidden_sizes(vec![32]);
    let mut agent = PolicyAgent::with_device(1, vec![ActionSpace::Discrete], network, Device::Cpu)?;
    let pool = OpponentPool::new(1, vec![ActionSpace::Discrete]).seed(3);
    // collectors give up at their first yield point unless the session is training
    let control = SessionControl::new();
    control.begin();

    let collector_config = CollectorConfig::new()
        .rollout_max_length(64)
        .delta_time(0.1)
        .action_interval_seconds(0.1)
        .yield_interval(16);
    let mut collectors = vec![
        RolloutCollector::new(0, Box::new(ThrusterReward { ticks: 0 }), collector_config.clone())?,
        RolloutCollector::new(1, Box::new(ThrusterReward { ticks: 0 }), collector_config)?,
    ];

    let ppo = PPOConfig::new().learning_rate(0.01).mini_batch_size(32).normalize_advantages(true);
    let mut trainer = PPOTrainer::new(ppo.clone(), &agent)?;

    let before = p_on(&agent, 1.0);

    for _ in 0..15 {
        let mut rollouts = Vec::new();
        for collector in collectors.iter_mut() {
            rollouts.push(collector.collect_rollout(&agent, &pool, &control).await?.unwrap());
        }
        let batch = TrainingBatch::from_rollouts(
            rollouts.iter().map(|r| &r.buffer),
            ppo.gamma as f32,
            ppo.gae_lambda as f32,
        )?;
        assert_eq!(batch.len(), 128);
        trainer.update(&mut agent, &batch)?;
    }

    let after = p_on(&agent, 1.0);
    println!("P(on) {:.3} -> {:.3}", before, after);
    assert!(after > 0.7, "P(on) only reached {:.3}", after);
    Ok(())
}
