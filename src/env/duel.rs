//! Two-player duel arena
//!
//! A small top-down arena used to exercise the training pipeline end to end.
//! Each player is a disc steered by four independent thrusters.
//!
//! # Rules
//!
//! - Leaving the arena loses the game (both players leaving is a tie)
//! - On contact, the player closing in faster wins
//! - Reaching `max_game_length` seconds without a decision is a tie
//!
//! # Observations
//!
//! Nine values per player, egocentric and normalized:
//! `[own x, own y, own vx, own vy, opp x, opp y, opp vx, opp vy, time left]`.
//! Seat 1 sees the arena mirrored along x (and its left/right thrusters are
//! swapped), so one policy can play either seat.

use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::env::{ActionSpace, ArenaEnvironment, EnvStep, OutcomeLabels};

const NUM_PLAYERS: usize = 2;
const OBS_SIZE: usize = 9;
const ACTION_SIZE: usize = 4;

/// Terminal and per-second rewards paid to each seat
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub win: f32,
    pub loss: f32,
    pub tie: f32,

    /// Subtracted from every seat per simulated second
    pub time_penalty: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self { win: 1.0, loss: -1.0, tie: 0.0, time_penalty: 0.0 }
    }
}

/// Arena geometry and physics constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Half the side length of the square arena
    pub arena_half_size: f32,
    pub player_radius: f32,
    /// Acceleration of one thruster (units/s²)
    pub thrust: f32,
    /// Linear drag coefficient (1/s)
    pub drag: f32,
    pub max_speed: f32,
    /// Episode time limit in simulated seconds
    pub max_game_length: f32,
    /// Closing-speed difference under which a contact counts as a tie
    pub contact_tolerance: f32,
    /// Uniform jitter applied to spawn positions
    pub spawn_jitter: f32,
    pub rewards: RewardConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            arena_half_size: 10.0,
            player_radius: 0.75,
            thrust: 12.0,
            drag: 1.5,
            max_speed: 8.0,
            max_game_length: 60.0,
            contact_tolerance: 0.05,
            spawn_jitter: 0.5,
            rewards: RewardConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Body {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

/// Two-player duel arena
#[derive(Debug)]
pub struct DuelArena {
    config: ArenaConfig,
    bodies: [Body; NUM_PLAYERS],
    elapsed: f64,
    done: bool,
}

impl DuelArena {
    /// Create an arena with default rules
    pub fn new() -> Self {
        Self::with_config(ArenaConfig::default())
    }

    /// Create an arena with custom rules
    pub fn with_config(config: ArenaConfig) -> Self {
        Self { config, bodies: [Body::default(); NUM_PLAYERS], elapsed: 0.0, done: true }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Simulated seconds since the last reset
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    fn spawn(&mut self) {
        let mut rng = rand::thread_rng();
        let jitter = self.config.spawn_jitter.max(0.0);
        let start_x = self.config.arena_half_size * 0.5;

        for (seat, body) in self.bodies.iter_mut().enumerate() {
            let side = if seat == 0 { -1.0 } else { 1.0 };
            let (dx, dy) = if jitter > 0.0 {
                (rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
            } else {
                (0.0, 0.0)
            };
            *body = Body { x: side * start_x + dx, y: dy, vx: 0.0, vy: 0.0 };
        }
    }

    /// Mirror factor along x for a seat
    fn mirror(seat: usize) -> f32 {
        if seat == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn integrate(&mut self, actions: &[Vec<f32>], dt: f32) {
        for (seat, body) in self.bodies.iter_mut().enumerate() {
            let pressed = |i: usize| if actions[seat].get(i).copied().unwrap_or(0.0) > 0.5 { 1.0 } else { 0.0 };
            let (up, down, left, right) = (pressed(0), pressed(1), pressed(2), pressed(3));

            let ax = (right - left) * Self::mirror(seat) * self.config.thrust;
            let ay = (up - down) * self.config.thrust;

            body.vx += (ax - self.config.drag * body.vx) * dt;
            body.vy += (ay - self.config.drag * body.vy) * dt;

            let speed = (body.vx * body.vx + body.vy * body.vy).sqrt();
            if speed > self.config.max_speed {
                let scale = self.config.max_speed / speed;
                body.vx *= scale;
                body.vy *= scale;
            }

            body.x += body.vx * dt;
            body.y += body.vy * dt;
        }
    }

    fn out_of_bounds(&self, seat: usize) -> bool {
        let body = &self.bodies[seat];
        let limit = self.config.arena_half_size;
        body.x.abs() > limit || body.y.abs() > limit
    }

    /// Decide the outcome of a contact, if the players touch
    fn contact_outcome(&self) -> Option<OutcomeLabels> {
        let [a, b] = self.bodies;
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= 2.0 * self.config.player_radius {
            return None;
        }

        let (nx, ny) = if dist > f32::EPSILON { (dx / dist, dy / dist) } else { (1.0, 0.0) };
        let closing_a = a.vx * nx + a.vy * ny;
        let closing_b = -(b.vx * nx + b.vy * ny);

        Some(if (closing_a - closing_b).abs() <= self.config.contact_tolerance {
            OutcomeLabels::tie(NUM_PLAYERS)
        } else if closing_a > closing_b {
            OutcomeLabels::win_for(0, NUM_PLAYERS)
        } else {
            OutcomeLabels::win_for(1, NUM_PLAYERS)
        })
    }

    fn judge(&self) -> Option<OutcomeLabels> {
        match (self.out_of_bounds(0), self.out_of_bounds(1)) {
            (true, true) => return Some(OutcomeLabels::tie(NUM_PLAYERS)),
            (true, false) => return Some(OutcomeLabels::win_for(1, NUM_PLAYERS)),
            (false, true) => return Some(OutcomeLabels::win_for(0, NUM_PLAYERS)),
            (false, false) => {}
        }

        if let Some(outcome) = self.contact_outcome() {
            return Some(outcome);
        }

        if self.elapsed + 1e-6 >= self.config.max_game_length as f64 {
            return Some(OutcomeLabels::tie(NUM_PLAYERS));
        }

        None
    }

    fn observation(&self, seat: usize) -> Vec<f32> {
        let m = Self::mirror(seat);
        let h = self.config.arena_half_size;
        let v = self.config.max_speed;
        let own = self.bodies[seat];
        let opp = self.bodies[1 - seat];
        let remaining = (1.0 - self.elapsed / self.config.max_game_length as f64).max(0.0) as f32;

        vec![
            own.x * m / h,
            own.y / h,
            own.vx * m / v,
            own.vy / v,
            opp.x * m / h,
            opp.y / h,
            opp.vx * m / v,
            opp.vy / v,
            remaining,
        ]
    }

    fn snapshot(&self, rewards: Vec<f32>, outcome: Option<OutcomeLabels>) -> EnvStep {
        EnvStep {
            observations: (0..NUM_PLAYERS).map(|seat| self.observation(seat)).collect(),
            rewards,
            done: outcome.is_some(),
            outcome,
        }
    }

    fn terminal_reward(&self, outcome: &OutcomeLabels, seat: usize) -> f32 {
        use crate::env::Outcome;

        match outcome.for_seat(seat) {
            Some(Outcome::Win) => self.config.rewards.win,
            Some(Outcome::Loss) => self.config.rewards.loss,
            Some(Outcome::Tie) | None => self.config.rewards.tie,
        }
    }
}

impl Default for DuelArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaEnvironment for DuelArena {
    fn reset(&mut self) -> Result<EnvStep> {
        self.spawn();
        self.elapsed = 0.0;
        self.done = false;
        Ok(self.snapshot(vec![0.0; NUM_PLAYERS], None))
    }

    fn step(&mut self, actions: &[Vec<f32>], delta_time: f32) -> Result<EnvStep> {
        if self.done {
            bail!("step called on a finished episode; reset first");
        }
        if actions.len() != NUM_PLAYERS {
            bail!("expected {} action vectors, got {}", NUM_PLAYERS, actions.len());
        }
        if !(delta_time > 0.0) {
            bail!("delta_time must be positive, got {}", delta_time);
        }

        self.integrate(actions, delta_time);
        self.elapsed += delta_time as f64;

        let step_reward = -self.config.rewards.time_penalty * delta_time;
        let mut rewards = vec![step_reward; NUM_PLAYERS];

        let outcome = self.judge();
        if let Some(outcome) = &outcome {
            for (seat, reward) in rewards.iter_mut().enumerate() {
                *reward += self.terminal_reward(outcome, seat);
            }
            self.done = true;
        }

        Ok(self.snapshot(rewards, outcome))
    }

    fn num_players(&self) -> usize {
        NUM_PLAYERS
    }

    fn observation_size(&self) -> usize {
        OBS_SIZE
    }

    fn action_size(&self) -> usize {
        ACTION_SIZE
    }

    fn action_spaces(&self) -> Vec<ActionSpace> {
        vec![ActionSpace::Discrete; ACTION_SIZE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Outcome;

    fn still_arena(rewards: RewardConfig) -> DuelArena {
        DuelArena::with_config(ArenaConfig { spawn_jitter: 0.0, rewards, ..Default::default() })
    }

    fn idle() -> Vec<Vec<f32>> {
        vec![vec![0.0; ACTION_SIZE]; NUM_PLAYERS]
    }

    #[test]
    fn test_duel_reset_shapes() {
        let mut env = DuelArena::new();
        let step = env.reset().unwrap();

        assert_eq!(step.observations.len(), 2);
        assert!(step.observations.iter().all(|o| o.len() == OBS_SIZE));
        assert!(!step.done);
        assert!(step.outcome.is_none());
        assert_eq!(env.action_spaces().len(), env.action_size());
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = DuelArena::new();
        assert!(env.step(&idle(), 0.05).is_err());
    }

    #[test]
    fn test_timeout_is_a_tie_paid_once() {
        let rewards = RewardConfig { tie: -0.25, ..Default::default() };
        let mut env = still_arena(rewards);
        env.reset().unwrap();

        // 60 s at 0.05 s per tick
        let mut tie_payments = 0;
        let mut ticks = 0;
        loop {
            let step = env.step(&idle(), 0.05).unwrap();
            ticks += 1;
            for &r in &step.rewards {
                if r != 0.0 {
                    assert_eq!(r, -0.25);
                    tie_payments += 1;
                }
            }
            if step.done {
                assert_eq!(step.outcome.unwrap().as_slice(), &[Outcome::Tie, Outcome::Tie]);
                break;
            }
            assert!(ticks < 2000, "episode never timed out");
        }

        assert_eq!(ticks, 1200);
        // once per seat, on the terminal tick only
        assert_eq!(tie_payments, 2);
    }

    #[test]
    fn test_leaving_the_arena_loses() {
        let mut env = still_arena(RewardConfig::default());
        env.reset().unwrap();
        env.bodies[0].x = -env.config.arena_half_size - 0.1;

        let step = env.step(&idle(), 0.05).unwrap();
        assert!(step.done);
        assert_eq!(step.outcome.unwrap().as_slice(), &[Outcome::Loss, Outcome::Win]);
        assert_eq!(step.rewards, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_faster_rammer_wins_contact() {
        let mut env = still_arena(RewardConfig::default());
        env.reset().unwrap();
        env.bodies[0] = Body { x: -0.5, y: 0.0, vx: 4.0, vy: 0.0 };
        env.bodies[1] = Body { x: 0.5, y: 0.0, vx: 0.0, vy: 0.0 };

        let step = env.step(&idle(), 0.01).unwrap();
        assert!(step.done);
        assert_eq!(step.outcome.unwrap().for_seat(0), Some(Outcome::Win));
    }

    #[test]
    fn test_seat_one_is_mirrored() {
        let mut env = still_arena(RewardConfig::default());
        env.reset().unwrap();
        let step = env.step(&idle(), 0.05).unwrap();

        // Both seats see themselves on the left at the same distance
        let own0 = step.observations[0][0];
        let own1 = step.observations[1][0];
        assert!((own0 - own1).abs() < 1e-6);
        assert!(own0 < 0.0);
    }

    #[test]
    fn test_mirrored_thrusters_move_towards_opponent() {
        let mut env = still_arena(RewardConfig::default());
        env.reset().unwrap();

        // "right" thruster for both seats means "towards the opponent"
        let actions = vec![vec![0.0, 0.0, 0.0, 1.0], vec![0.0, 0.0, 0.0, 1.0]];
        env.step(&actions, 0.05).unwrap();

        assert!(env.bodies[0].vx > 0.0);
        assert!(env.bodies[1].vx < 0.0);
    }
}
