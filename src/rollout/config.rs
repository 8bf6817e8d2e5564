//! Rollout collector configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Collector parameters
///
/// Defaults suit the 60-second duel arena: a decision every 0.1 s over
/// 0.05 s physics ticks, so each transition spans two ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Transitions per rollout buffer
    pub rollout_max_length: usize,

    /// Simulated seconds per physics tick
    pub delta_time: f32,

    /// Simulated seconds one agent decision is held for (frame-skip)
    pub action_interval_seconds: f32,

    /// Transitions between cooperative yields
    pub yield_interval: usize,

    /// Seat the trained agent plays
    pub trained_seat: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            rollout_max_length: 512,
            delta_time: 0.05,
            action_interval_seconds: 0.1,
            yield_interval: 64,
            trained_seat: 0,
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.rollout_max_length == 0 {
            return Err(anyhow!("rollout_max_length must be positive"));
        }
        if !(self.delta_time > 0.0 && self.delta_time.is_finite()) {
            return Err(anyhow!("delta_time must be positive"));
        }
        if !(self.action_interval_seconds > 0.0 && self.action_interval_seconds.is_finite()) {
            return Err(anyhow!("action_interval_seconds must be positive"));
        }
        if self.yield_interval == 0 {
            return Err(anyhow!("yield_interval must be positive"));
        }
        Ok(())
    }

    /// Set transitions per rollout
    pub fn rollout_max_length(mut self, length: usize) -> Self {
        self.rollout_max_length = length;
        self
    }

    /// Set physics tick length
    pub fn delta_time(mut self, dt: f32) -> Self {
        self.delta_time = dt;
        self
    }

    /// Set decision interval
    pub fn action_interval_seconds(mut self, seconds: f32) -> Self {
        self.action_interval_seconds = seconds;
        self
    }

    /// Set transitions between yields
    pub fn yield_interval(mut self, interval: usize) -> Self {
        self.yield_interval = interval;
        self
    }

    /// Set the trained seat
    pub fn trained_seat(mut self, seat: usize) -> Self {
        self.trained_seat = seat;
        self
    }
}
