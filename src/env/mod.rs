//! Environment adapter contract
//!
//! The training core never looks at game physics. It drives any simulation
//! that can reset, advance by a time step given one action vector per player,
//! and report per-player observations, rewards, termination and outcome.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub mod duel;

/// Game-agnostic multi-player simulation driven by the rollout collector
pub trait ArenaEnvironment {
    /// Reset to the initial state of a fresh episode
    fn reset(&mut self) -> Result<EnvStep>;

    /// Advance the simulation by `delta_time` seconds
    ///
    /// `actions` holds one action vector per player, in seat order.
    fn step(&mut self, actions: &[Vec<f32>], delta_time: f32) -> Result<EnvStep>;

    /// Number of seats in one game
    fn num_players(&self) -> usize;

    /// Length of each player's observation vector
    fn observation_size(&self) -> usize;

    /// Length of each player's action vector
    fn action_size(&self) -> usize;

    /// Kind of each action dimension (`action_size()` entries)
    fn action_spaces(&self) -> Vec<ActionSpace>;
}

/// Per-player snapshot returned by `reset` and `step`
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep {
    /// Pre-normalized observation for each seat
    pub observations: Vec<Vec<f32>>,

    /// Reward earned by each seat during this step
    pub rewards: Vec<f32>,

    /// Whether the episode ended on this step
    pub done: bool,

    /// Outcome labels, present only when `done`
    pub outcome: Option<OutcomeLabels>,
}

impl EnvStep {
    /// Observation of one seat
    pub fn observation(&self, seat: usize) -> Result<&[f32]> {
        match self.observations.get(seat) {
            Some(obs) => Ok(obs),
            None => bail!("environment reported no observation for seat {}", seat),
        }
    }

    /// Reward of one seat (missing entries count as zero)
    pub fn reward(&self, seat: usize) -> f32 {
        self.rewards.get(seat).copied().unwrap_or(0.0)
    }
}

/// Kind of a single action dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSpace {
    /// Binary switch, sampled from an independent Bernoulli
    Discrete,

    /// Real-valued, sampled from a Gaussian
    Continuous,
}

/// Result of an episode from one player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Tie,
}

/// One outcome per seat, checked for consistency on construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Outcome>", into = "Vec<Outcome>")]
pub struct OutcomeLabels(Vec<Outcome>);

impl OutcomeLabels {
    /// Validate a set of per-seat outcomes
    ///
    /// At most one seat may win, and a win cannot coexist with a tie.
    pub fn new(labels: Vec<Outcome>) -> Result<Self> {
        if labels.is_empty() {
            bail!("outcome labels must cover at least one seat");
        }
        let wins = labels.iter().filter(|&&o| o == Outcome::Win).count();
        let ties = labels.iter().filter(|&&o| o == Outcome::Tie).count();
        if wins > 1 {
            bail!("inconsistent outcome {:?}: more than one winner", labels);
        }
        if wins == 1 && ties > 0 {
            bail!("inconsistent outcome {:?}: win mixed with tie", labels);
        }
        Ok(Self(labels))
    }

    /// Every seat ties
    pub fn tie(num_players: usize) -> Self {
        Self(vec![Outcome::Tie; num_players.max(1)])
    }

    /// `winner` wins, every other seat loses
    pub fn win_for(winner: usize, num_players: usize) -> Self {
        Self(
            (0..num_players.max(winner + 1))
                .map(|seat| if seat == winner { Outcome::Win } else { Outcome::Loss })
                .collect(),
        )
    }

    /// Outcome of a single seat
    pub fn for_seat(&self, seat: usize) -> Option<Outcome> {
        self.0.get(seat).copied()
    }

    /// All labels in seat order
    pub fn as_slice(&self) -> &[Outcome] {
        &self.0
    }
}

impl TryFrom<Vec<Outcome>> for OutcomeLabels {
    type Error = anyhow::Error;

    fn try_from(labels: Vec<Outcome>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<OutcomeLabels> for Vec<Outcome> {
    fn from(labels: OutcomeLabels) -> Self {
        labels.0
    }
}
