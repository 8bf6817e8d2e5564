//! Weighted opponent pool
//!
//! A small catalog of opponent options (random movers and frozen policy
//! snapshots) sampled with probability proportional to their weight. Policy
//! agents are built lazily from their bundles and cached for the life of the
//! pool, or until the environment shape changes.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{FrozenPolicy, OpponentBehavior, RandomMover};
use crate::{env::ActionSpace, policy::{AgentBundle, PolicyAgent}};

/// What plays the seat when an option is drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentKind {
    Random,
    Policy(AgentBundle),
}

/// One entry of the pool catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentOption {
    pub id: String,
    pub label: String,
    pub kind: OpponentKind,

    /// Relative sampling weight; non-positive weights are never sampled
    pub weight: f64,
}

impl OpponentOption {
    pub fn random(id: impl Into<String>, weight: f64) -> Self {
        Self { id: id.into(), label: "Random mover".to_string(), kind: OpponentKind::Random, weight }
    }

    pub fn policy(id: impl Into<String>, label: impl Into<String>, bundle: AgentBundle, weight: f64) -> Self {
        Self { id: id.into(), label: label.into(), kind: OpponentKind::Policy(bundle), weight }
    }

    pub fn is_random(&self) -> bool {
        matches!(self.kind, OpponentKind::Random)
    }
}

/// Weighted sampler over opponent behaviors
///
/// Sampling and agent construction take `&self` so every collector can share
/// one pool; interior state lives in `RefCell`s and is never borrowed across
/// a yield point.
pub struct OpponentPool {
    options: Vec<OpponentOption>,
    observation_size: usize,
    action_spaces: Vec<ActionSpace>,

    /// Built agents by option id, `None` for bundles that failed to load
    cache: RefCell<HashMap<String, Option<Rc<PolicyAgent>>>>,
    rng: RefCell<StdRng>,
}

impl OpponentPool {
    /// Pool with a single random option
    pub fn new(observation_size: usize, action_spaces: Vec<ActionSpace>) -> Self {
        Self::with_options(observation_size, action_spaces, vec![OpponentOption::random("random", 1.0)])
    }

    pub fn with_options(
        observation_size: usize,
        action_spaces: Vec<ActionSpace>,
        options: Vec<OpponentOption>,
    ) -> Self {
        Self {
            options,
            observation_size,
            action_spaces,
            cache: RefCell::new(HashMap::new()),
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    /// Use a deterministic sampling sequence
    pub fn seed(self, seed: u64) -> Self {
        self.rng.replace(StdRng::seed_from_u64(seed));
        self
    }

    pub fn options(&self) -> &[OpponentOption] {
        &self.options
    }

    /// Add an option, replacing any option with the same id
    pub fn add_option(&mut self, option: OpponentOption) {
        self.cache.get_mut().remove(&option.id);
        match self.options.iter_mut().find(|o| o.id == option.id) {
            Some(existing) => *existing = option,
            None => self.options.push(option),
        }
    }

    pub fn remove_option(&mut self, id: &str) -> Option<OpponentOption> {
        self.cache.get_mut().remove(id);
        let index = self.options.iter().position(|o| o.id == id)?;
        Some(self.options.remove(index))
    }

    /// Update the environment shape; cached agents are dropped if it changed
    pub fn set_shape(&mut self, observation_size: usize, action_spaces: Vec<ActionSpace>) {
        if observation_size == self.observation_size && action_spaces == self.action_spaces {
            return;
        }
        tracing::info!(
            "Opponent pool shape changed to {} observations / {} actions, clearing cache",
            observation_size,
            action_spaces.len()
        );
        self.observation_size = observation_size;
        self.action_spaces = action_spaces;
        self.cache.get_mut().clear();
    }

    /// Number of policy agents currently built
    pub fn cached_agents(&self) -> usize {
        self.cache.borrow().values().filter(|a| a.is_some()).count()
    }

    /// Draw an option with probability `weight / sum(weights)`
    ///
    /// Returns `None` when no option has a positive weight.
    pub fn sample(&self) -> Option<&OpponentOption> {
        let weights = self
            .options
            .iter()
            .map(|o| if o.weight.is_finite() && o.weight > 0.0 { o.weight } else { 0.0 });
        let dist = WeightedIndex::new(weights).ok()?;
        let index = dist.sample(&mut *self.rng.borrow_mut());
        self.options.get(index)
    }

    /// Behavior for one option
    ///
    /// A policy option whose bundle cannot be loaded for the current shape
    /// degrades to a random mover.
    pub fn behavior_for(&self, option: &OpponentOption) -> Box<dyn OpponentBehavior> {
        let bundle = match &option.kind {
            OpponentKind::Random => return Box::new(RandomMover::new(self.action_spaces.clone())),
            OpponentKind::Policy(bundle) => bundle,
        };

        let cached = self.cache.borrow().get(&option.id).cloned();
        let agent = match cached {
            Some(agent) => agent,
            None => {
                let agent = self.build_agent(option, bundle);
                self.cache.borrow_mut().insert(option.id.clone(), agent.clone());
                agent
            }
        };

        match agent {
            Some(agent) => Box::new(FrozenPolicy::new(option.id.clone(), agent)),
            None => Box::new(RandomMover::new(self.action_spaces.clone())),
        }
    }

    /// Sample an option and build its behavior
    ///
    /// Falls back to a random mover when nothing can be sampled.
    pub fn sample_behavior(&self) -> Box<dyn OpponentBehavior> {
        match self.sample() {
            Some(option) => self.behavior_for(option),
            None => {
                tracing::debug!("Opponent pool has no positive weights, using random mover");
                Box::new(RandomMover::new(self.action_spaces.clone()))
            }
        }
    }

    fn build_agent(&self, option: &OpponentOption, bundle: &AgentBundle) -> Option<Rc<PolicyAgent>> {
        match PolicyAgent::from_bundle(bundle, self.observation_size, self.action_spaces.clone()) {
            Ok(mut agent) => {
                agent.activate();
                tracing::debug!("Loaded opponent '{}' ({})", option.id, option.label);
                Some(Rc::new(agent))
            }
            Err(e) => {
                tracing::warn!(
                    "Opponent '{}' has an unusable bundle, playing it as random: {:#}",
                    option.id,
                    e
                );
                None
            }
        }
    }
}
