//! Serialized agent weights
//!
//! A bundle is what the model store persists and what the opponent pool
//! imports. Known formats are variants of [`AgentBundle`]; loading dispatches
//! on the variant instead of probing the payload.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{nn, Device, Kind, Tensor};

use super::{
    agent::PolicyAgent,
    network::{NetworkArchitecture, NetworkConfig},
};
use crate::{env::ActionSpace, error::BundleError};

/// One parameter tensor, flattened row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<i64>,
    pub values: Vec<f32>,
}

/// Architecture and weights of one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkBundle {
    pub architecture: NetworkArchitecture,
    pub weights: Vec<NamedTensor>,
}

/// Every serialized agent format the crate can load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentBundle {
    /// Legacy format: policy network only
    ///
    /// The value network starts from a fresh initialization and the log-std
    /// from the config default.
    PolicyOnly { policy: NetworkBundle },

    /// Policy network, value network and exploration log-std
    ActorCritic {
        policy: NetworkBundle,
        value: NetworkBundle,
        log_std: Vec<f32>,
    },
}

impl AgentBundle {
    /// Architecture of the policy network
    pub fn policy_architecture(&self) -> &NetworkArchitecture {
        match self {
            AgentBundle::PolicyOnly { policy } => &policy.architecture,
            AgentBundle::ActorCritic { policy, .. } => &policy.architecture,
        }
    }
}

fn export_network(vs: &nn::VarStore, prefix: &str, architecture: NetworkArchitecture) -> Result<NetworkBundle> {
    let prefix = format!("{}.", prefix);
    let variables: BTreeMap<String, Tensor> = vs.variables().into_iter().collect();

    let mut weights = Vec::new();
    for (name, tensor) in variables {
        let Some(short) = name.strip_prefix(&prefix) else {
            continue;
        };
        let values = Vec::<f32>::try_from(
            tensor.flatten(0, -1).to_device(Device::Cpu).to_kind(Kind::Float),
        )?;
        weights.push(NamedTensor { name: short.to_string(), shape: tensor.size(), values });
    }

    Ok(NetworkBundle { architecture, weights })
}

/// Check a network bundle against the store and pair each weight with its target
fn stage_network<'a>(
    vs: &nn::VarStore,
    network: &'static str,
    expected: &NetworkArchitecture,
    bundle: &'a NetworkBundle,
) -> Result<Vec<(Tensor, &'a NamedTensor)>> {
    if &bundle.architecture != expected {
        return Err(BundleError::ArchitectureMismatch {
            network,
            expected: expected.to_string(),
            found: bundle.architecture.to_string(),
        }
        .into());
    }

    let prefix = format!("{}.", network);
    let mut targets: BTreeMap<String, Tensor> = vs
        .variables()
        .into_iter()
        .filter_map(|(name, t)| name.strip_prefix(&prefix).map(|s| (s.to_string(), t)))
        .collect();

    let mut staged = Vec::with_capacity(bundle.weights.len());
    for weight in &bundle.weights {
        let target = targets.remove(&weight.name).ok_or_else(|| BundleError::UnexpectedWeight {
            network,
            name: weight.name.clone(),
        })?;
        if weight.shape != target.size() {
            return Err(BundleError::ShapeMismatch {
                name: format!("{}{}", prefix, weight.name),
                expected: target.size(),
                found: weight.shape.clone(),
            }
            .into());
        }
        let declared: usize = weight.shape.iter().map(|&d| d as usize).product();
        if declared != weight.values.len() {
            return Err(BundleError::ValueCount {
                name: format!("{}{}", prefix, weight.name),
                declared,
                actual: weight.values.len(),
            }
            .into());
        }
        staged.push((target, weight));
    }
    if let Some(name) = targets.into_keys().next() {
        return Err(BundleError::MissingWeight { network, name }.into());
    }
    Ok(staged)
}

fn commit(staged: Vec<(Tensor, &NamedTensor)>) {
    tch::no_grad(|| {
        for (mut target, weight) in staged {
            let src = Tensor::from_slice(&weight.values)
                .view(weight.shape.as_slice())
                .to_device(target.device());
            target.copy_(&src);
        }
    });
}

impl PolicyAgent {
    /// Serialize every parameter into an [`AgentBundle::ActorCritic`]
    pub fn export(&self) -> Result<AgentBundle> {
        Ok(AgentBundle::ActorCritic {
            policy: export_network(self.var_store(), "policy", self.policy_architecture())?,
            value: export_network(self.var_store(), "value", self.value_architecture())?,
            log_std: self.log_std()?,
        })
    }

    /// Build an agent from a bundle for the given environment shape
    ///
    /// Hidden sizes and activation come from the bundle; the environment
    /// shape must match it or a [`BundleError`] is returned.
    pub fn from_bundle(
        bundle: &AgentBundle,
        observation_size: usize,
        action_spaces: Vec<ActionSpace>,
    ) -> Result<Self> {
        let arch = bundle.policy_architecture();
        let config = NetworkConfig::new()
            .hidden_sizes(arch.hidden_sizes.clone())
            .activation(arch.activation);
        let expected = config.architecture(observation_size as i64, action_spaces.len() as i64);
        if &expected != arch {
            return Err(BundleError::ArchitectureMismatch {
                network: "policy",
                expected: expected.to_string(),
                found: arch.to_string(),
            }
            .into());
        }

        let mut agent = PolicyAgent::with_device(observation_size, action_spaces, config, Device::Cpu)?;
        agent.load_bundle(bundle)?;
        Ok(agent)
    }

    /// Overwrite this agent's parameters from a bundle
    ///
    /// Every weight is checked before any is written, so a rejected bundle
    /// leaves the agent untouched.
    pub fn load_bundle(&mut self, bundle: &AgentBundle) -> Result<()> {
        let policy_arch = self.policy_architecture();
        let value_arch = self.value_architecture();
        let vs = self.var_store();

        match bundle {
            AgentBundle::PolicyOnly { policy } => {
                commit(stage_network(vs, "policy", &policy_arch, policy)?);
            }
            AgentBundle::ActorCritic { policy, value, log_std } => {
                let action_size = self.action_size();
                if log_std.len() != action_size {
                    return Err(BundleError::ShapeMismatch {
                        name: "log_std".to_string(),
                        expected: vec![action_size as i64],
                        found: vec![log_std.len() as i64],
                    }
                    .into());
                }
                let mut staged = stage_network(vs, "policy", &policy_arch, policy)?;
                staged.extend(stage_network(vs, "value", &value_arch, value)?);
                commit(staged);

                let mut target = self.log_std_tensor();
                let src = Tensor::from_slice(log_std).to_device(target.device());
                tch::no_grad(|| target.copy_(&src));
            }
        }
        Ok(())
    }
}
