//! Opponent behaviors for the seats that are not being trained
//!
//! An opponent only has to turn an observation into an action. The pool in
//! [`pool`] decides which behavior plays each episode.

use std::rc::Rc;

use rand::Rng;

use crate::{env::ActionSpace, policy::PolicyAgent};

pub mod pool;

pub use pool::{OpponentKind, OpponentOption, OpponentPool};

/// Anything that can play an untrained seat
pub trait OpponentBehavior {
    /// Choose an action for one observation
    ///
    /// Opponents never fail: a behavior that cannot act returns a fallback
    /// action instead.
    fn decide(&self, observation: &[f32]) -> Vec<f32>;

    /// Identifier reported in episode summaries
    fn name(&self) -> &str;
}

/// Uniform random actions: 0/1 per discrete dimension, [-1, 1] per continuous one
#[derive(Debug, Clone)]
pub struct RandomMover {
    action_spaces: Vec<ActionSpace>,
}

impl RandomMover {
    pub fn new(action_spaces: Vec<ActionSpace>) -> Self {
        Self { action_spaces }
    }
}

impl OpponentBehavior for RandomMover {
    fn decide(&self, _observation: &[f32]) -> Vec<f32> {
        let mut rng = rand::thread_rng();
        self.action_spaces
            .iter()
            .map(|space| match space {
                ActionSpace::Discrete => {
                    if rng.gen_bool(0.5) {
                        1.0
                    } else {
                        0.0
                    }
                }
                ActionSpace::Continuous => rng.gen_range(-1.0..=1.0),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// A frozen snapshot of a trained policy
///
/// The agent is shared with the pool cache and never updated.
pub struct FrozenPolicy {
    id: String,
    agent: Rc<PolicyAgent>,
}

impl FrozenPolicy {
    pub fn new(id: impl Into<String>, agent: Rc<PolicyAgent>) -> Self {
        Self { id: id.into(), agent }
    }
}

impl OpponentBehavior for FrozenPolicy {
    fn decide(&self, observation: &[f32]) -> Vec<f32> {
        match self.agent.act(observation) {
            Ok(out) => out.action,
            Err(e) => {
                tracing::warn!("Frozen opponent '{}' failed to act: {:#}", self.id, e);
                vec![0.0; self.agent.action_size()]
            }
        }
    }

    fn name(&self) -> &str {
        &self.id
    }
}
