//! Policy agent: a policy network, a value network and an exploration scale
//!
//! Discrete action dimensions are independent Bernoulli switches (a
//! multi-binary action space, not one categorical choice). Continuous
//! dimensions are Gaussian around the policy output with a per-dimension
//! log-std. Log-probabilities and entropies sum over all dimensions.

use anyhow::{bail, Result};
use tch::{
    nn::{self, Init, Module},
    Device, Kind, Tensor,
};

use super::network::{build_mlp, NetworkArchitecture, NetworkConfig};
use crate::env::ActionSpace;

const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// How `act` chooses actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Always returns the all-zero fallback action
    Inactive,

    /// Samples from the action distribution
    Exploring,

    /// Thresholds discrete logits at 0 and uses continuous means
    Deterministic,
}

/// Result of querying the agent for one observation
#[derive(Debug, Clone, PartialEq)]
pub struct ActOutput {
    /// One entry per action dimension (0/1 for discrete dimensions)
    pub action: Vec<f32>,

    /// Value estimate of the observed state
    pub value: f32,

    /// Summed log-likelihood of `action` under the current policy
    pub log_prob: f32,
}

/// Actor-critic agent backed by tch
pub struct PolicyAgent {
    vs: nn::VarStore,
    policy_net: nn::Sequential,
    value_net: nn::Sequential,
    log_std: Tensor,
    discrete_mask: Tensor,
    continuous_mask: Tensor,
    observation_size: usize,
    action_spaces: Vec<ActionSpace>,
    config: NetworkConfig,
    mode: AgentMode,
    device: Device,
}

impl std::fmt::Debug for PolicyAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyAgent")
            .field("observation_size", &self.observation_size)
            .field("action_spaces", &self.action_spaces)
            .field("mode", &self.mode)
            .field("device", &self.device)
            .finish()
    }
}

impl PolicyAgent {
    /// Create an agent on CUDA when available, CPU otherwise
    pub fn new(
        observation_size: usize,
        action_spaces: Vec<ActionSpace>,
        config: NetworkConfig,
    ) -> Result<Self> {
        Self::with_device(observation_size, action_spaces, config, Device::cuda_if_available())
    }

    /// Create an agent on a specific device
    pub fn with_device(
        observation_size: usize,
        action_spaces: Vec<ActionSpace>,
        config: NetworkConfig,
        device: Device,
    ) -> Result<Self> {
        if observation_size == 0 {
            bail!("observation size must be positive");
        }
        if action_spaces.is_empty() {
            bail!("agent needs at least one action dimension");
        }
        if config.hidden_sizes.iter().any(|&h| h <= 0) {
            bail!("hidden layer sizes must be positive: {:?}", config.hidden_sizes);
        }
        tracing::debug!("PolicyAgent using device: {:?}", device);

        let action_size = action_spaces.len() as i64;
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let policy_arch = config.architecture(observation_size as i64, action_size);
        let value_arch = config.architecture(observation_size as i64, 1);
        let policy_net = build_mlp(&(&root / "policy"), &policy_arch, config.use_orthogonal_init, 0.01);
        let value_net = build_mlp(&(&root / "value"), &value_arch, config.use_orthogonal_init, 1.0);

        let log_std = if config.learn_log_std {
            root.var("log_std", &[action_size], Init::Const(config.initial_log_std))
        } else {
            let mut fixed = root.zeros_no_train("log_std", &[action_size]);
            tch::no_grad(|| {
                let _ = fixed.fill_(config.initial_log_std);
            });
            fixed
        };

        let mask = |kind: ActionSpace| -> Tensor {
            let values: Vec<f32> =
                action_spaces.iter().map(|&s| if s == kind { 1.0 } else { 0.0 }).collect();
            Tensor::from_slice(&values).to_device(device)
        };
        let discrete_mask = mask(ActionSpace::Discrete);
        let continuous_mask = mask(ActionSpace::Continuous);

        Ok(Self {
            vs,
            policy_net,
            value_net,
            log_std,
            discrete_mask,
            continuous_mask,
            observation_size,
            action_spaces,
            config,
            mode: AgentMode::Exploring,
            device,
        })
    }

    /// Switch to stochastic sampling
    pub fn activate(&mut self) {
        self.mode = AgentMode::Exploring;
    }

    /// Switch to the all-zero fallback action
    pub fn deactivate(&mut self) {
        self.mode = AgentMode::Inactive;
    }

    /// Toggle deterministic action selection (activates the agent)
    pub fn set_deterministic(&mut self, deterministic: bool) {
        self.mode = if deterministic { AgentMode::Deterministic } else { AgentMode::Exploring };
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode != AgentMode::Inactive
    }

    pub fn observation_size(&self) -> usize {
        self.observation_size
    }

    pub fn action_size(&self) -> usize {
        self.action_spaces.len()
    }

    pub fn action_spaces(&self) -> &[ActionSpace] {
        &self.action_spaces
    }

    pub fn network_config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn policy_architecture(&self) -> NetworkArchitecture {
        self.config.architecture(self.observation_size as i64, self.action_size() as i64)
    }

    pub fn value_architecture(&self) -> NetworkArchitecture {
        self.config.architecture(self.observation_size as i64, 1)
    }

    /// Get the device this agent runs on
    pub fn device(&self) -> Device {
        self.device
    }

    /// Variable store holding every parameter (for optimizer creation)
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    pub(crate) fn log_std_tensor(&self) -> Tensor {
        self.log_std.shallow_clone()
    }

    /// Current log-std of every action dimension
    pub fn log_std(&self) -> Result<Vec<f32>> {
        Ok(Vec::<f32>::try_from(self.log_std.to_device(Device::Cpu).to_kind(Kind::Float))?)
    }

    fn observation_tensor(&self, observation: &[f32]) -> Result<Tensor> {
        if observation.len() != self.observation_size {
            bail!(
                "observation has {} values, agent expects {}",
                observation.len(),
                self.observation_size
            );
        }
        Ok(Tensor::from_slice(observation)
            .view([1, self.observation_size as i64])
            .to_device(self.device))
    }

    /// Choose an action for one observation
    ///
    /// Does not touch the network weights; only the sampling RNG advances.
    pub fn act(&self, observation: &[f32]) -> Result<ActOutput> {
        let obs = self.observation_tensor(observation)?;

        if self.mode == AgentMode::Inactive {
            return Ok(ActOutput { action: vec![0.0; self.action_size()], value: 0.0, log_prob: 0.0 });
        }

        let (action, log_prob, value) = tch::no_grad(|| {
            let out = self.policy_net.forward(&obs);
            let value = self.value_net.forward(&obs).squeeze_dim(-1);

            let (discrete, continuous) = match self.mode {
                AgentMode::Deterministic => (out.gt(0.0).to_kind(Kind::Float), out.shallow_clone()),
                _ => {
                    let noise = out.randn_like() * self.log_std.exp();
                    (out.sigmoid().bernoulli(), &out + noise)
                }
            };
            let action = discrete * &self.discrete_mask + continuous * &self.continuous_mask;
            let log_prob = self.log_prob_of(&out, &action);
            (action, log_prob, value)
        });

        Ok(ActOutput {
            action: Vec::<f32>::try_from(action.squeeze_dim(0).to_device(Device::Cpu))?,
            value: f64::try_from(&value)? as f32,
            log_prob: f64::try_from(&log_prob)? as f32,
        })
    }

    /// Value estimate of one observation
    pub fn value(&self, observation: &[f32]) -> Result<f32> {
        let obs = self.observation_tensor(observation)?;
        let value = tch::no_grad(|| self.value_net.forward(&obs).squeeze_dim(-1));
        Ok(f64::try_from(&value)? as f32)
    }

    /// Evaluate stored actions under the current parameters
    ///
    /// Returns `(log_probs, entropy, values)`, each of shape `[batch]`, with
    /// gradients attached.
    pub fn evaluate_actions(&self, observations: &Tensor, actions: &Tensor) -> (Tensor, Tensor, Tensor) {
        let out = self.policy_net.forward(observations);
        let values = self.value_net.forward(observations).squeeze_dim(-1);
        let log_probs = self.log_prob_of(&out, actions);
        let entropy = self.entropy_of(&out);
        (log_probs, entropy, values)
    }

    /// Summed log-likelihood of `actions` given policy outputs `out` ([batch, action_size])
    fn log_prob_of(&self, out: &Tensor, actions: &Tensor) -> Tensor {
        let bernoulli = actions * out.log_sigmoid() + (1.0f64 - actions) * (-out).log_sigmoid();

        let var = (&self.log_std * 2.0).exp();
        let gaussian = -(actions - out).square() / (var * 2.0) - &self.log_std - LOG_SQRT_2PI;

        (bernoulli * &self.discrete_mask + gaussian * &self.continuous_mask).sum_dim_intlist(
            -1,
            false,
            Kind::Float,
        )
    }

    /// Summed entropy of the action distribution for policy outputs `out`
    fn entropy_of(&self, out: &Tensor) -> Tensor {
        let p = out.sigmoid();
        let bernoulli = -(&p * out.log_sigmoid() + (1.0f64 - &p) * (-out).log_sigmoid());
        let gaussian = out.zeros_like() + &self.log_std + (0.5 + LOG_SQRT_2PI);

        (bernoulli * &self.discrete_mask + gaussian * &self.continuous_mask).sum_dim_intlist(
            -1,
            false,
            Kind::Float,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrete_agent() -> PolicyAgent {
        let config = NetworkConfig::new().hidden_sizes(vec![16]);
        PolicyAgent::with_device(4, vec![ActionSpace::Discrete; 3], config, Device::Cpu).unwrap()
    }

    #[test]
    fn test_act_discrete_is_binary() {
        let agent = discrete_agent();
        for _ in 0..20 {
            let out = agent.act(&[0.1, -0.2, 0.3, 0.0]).unwrap();
            assert_eq!(out.action.len(), 3);
            assert!(out.action.iter().all(|&a| a == 0.0 || a == 1.0));
            assert!(out.log_prob <= 0.0);
            assert!(out.log_prob.is_finite());
        }
    }

    #[test]
    fn test_log_prob_is_sum_of_bernoullis() {
        let agent = discrete_agent();
        let obs = [0.5_f32, 0.5, -0.5, 0.25];
        let out = agent.act(&obs).unwrap();

        let logits: Vec<f32> = tch::no_grad(|| {
            let t = agent.policy_net.forward(&Tensor::from_slice(&obs).view([1, 4]));
            Vec::<f32>::try_from(t.squeeze_dim(0)).unwrap()
        });
        let expected: f32 = logits
            .iter()
            .zip(&out.action)
            .map(|(&l, &a)| {
                let p = 1.0 / (1.0 + (-l).exp());
                if a == 1.0 {
                    p.ln()
                } else {
                    (1.0 - p).ln()
                }
            })
            .sum();
        assert!((out.log_prob - expected).abs() < 1e-4, "{} vs {}", out.log_prob, expected);
    }

    #[test]
    fn test_inactive_returns_zero_action() {
        let mut agent = discrete_agent();
        agent.deactivate();
        assert!(!agent.is_active());

        let out = agent.act(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(out.action, vec![0.0; 3]);
        assert_eq!(out.log_prob, 0.0);

        agent.activate();
        assert_eq!(agent.mode(), AgentMode::Exploring);
    }

    #[test]
    fn test_wrong_observation_size_fails_fast() {
        let agent = discrete_agent();
        assert!(agent.act(&[0.0, 1.0]).is_err());
        assert!(agent.value(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_deterministic_is_repeatable() {
        let mut agent = discrete_agent();
        agent.set_deterministic(true);
        let obs = [0.3, 0.1, -0.7, 0.2];
        let first = agent.act(&obs).unwrap();
        for _ in 0..5 {
            assert_eq!(agent.act(&obs).unwrap().action, first.action);
        }
    }

    #[test]
    fn test_value_matches_act() {
        let agent = discrete_agent();
        let obs = [0.2, 0.4, 0.6, 0.8];
        let act = agent.act(&obs).unwrap();
        let value = agent.value(&obs).unwrap();
        assert!((act.value - value).abs() < 1e-6);
    }

    #[test]
    fn test_mixed_action_space() {
        let config = NetworkConfig::new().hidden_sizes(vec![8]).initial_log_std(0.0);
        let spaces = vec![ActionSpace::Discrete, ActionSpace::Continuous];
        let agent = PolicyAgent::with_device(2, spaces, config, Device::Cpu).unwrap();

        let out = agent.act(&[0.0, 1.0]).unwrap();
        assert!(out.action[0] == 0.0 || out.action[0] == 1.0);

        let obs = Tensor::zeros([3, 2], (Kind::Float, Device::Cpu));
        let actions = Tensor::from_slice(&[1.0_f32, 0.3, 0.0, -0.2, 1.0, 1.5]).view([3, 2]);
        let (log_probs, entropy, values) = agent.evaluate_actions(&obs, &actions);
        assert_eq!(log_probs.size(), vec![3]);
        assert_eq!(entropy.size(), vec![3]);
        assert_eq!(values.size(), vec![3]);

        // Bernoulli entropy <= ln 2, Gaussian entropy with log_std 0 is 0.5 + ln √(2π)
        let h: Vec<f32> = Vec::try_from(&entropy).unwrap();
        let gaussian = 0.5 + LOG_SQRT_2PI as f32;
        for v in h {
            assert!(v > gaussian && v <= gaussian + std::f32::consts::LN_2 + 1e-5);
        }
    }

    #[test]
    fn test_fixed_log_std_is_not_trainable() {
        let config = NetworkConfig::new().hidden_sizes(vec![8]).learn_log_std(false).initial_log_std(-1.0);
        let agent =
            PolicyAgent::with_device(2, vec![ActionSpace::Continuous], config, Device::Cpu).unwrap();

        assert_eq!(agent.log_std().unwrap(), vec![-1.0]);
        assert!(agent.var_store().variables().contains_key("log_std"));
        // policy (2 layers) + value (2 layers), weights and biases
        assert_eq!(agent.var_store().trainable_variables().len(), 8);
    }

    #[test]
    fn test_rejects_empty_action_space() {
        assert!(PolicyAgent::with_device(3, vec![], NetworkConfig::default(), Device::Cpu).is_err());
        assert!(PolicyAgent::with_device(0, vec![ActionSpace::Discrete], NetworkConfig::default(), Device::Cpu).is_err());
    }
}
