//! Training metrics
//!
//! Counters and histories are updated once per finished episode; rates and
//! moving averages are derived when a snapshot is taken.

use std::time::Instant;

use serde::Serialize;

use crate::{buffer::EpisodeSummary, env::Outcome, train::TrainingStats};

/// Episodes included in moving averages
pub const MOVING_AVERAGE_WINDOW: usize = 100;

/// Cumulative training metrics, written only by the session loop
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    pub games: usize,
    pub wins: usize,
    pub losses: usize,
    pub ties: usize,

    /// Total reward of every finished episode
    pub reward_history: Vec<f32>,

    /// Decisions per finished episode
    pub length_history: Vec<usize>,

    /// Training iterations run (including ones whose update failed)
    pub iterations: usize,

    /// Transitions collected across all rollouts
    pub transitions: usize,

    pub last_stats: Option<TrainingStats>,
    started_at: Option<Instant>,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything and start the clock
    pub fn start(&mut self) {
        *self = Self { started_at: Some(Instant::now()), ..Self::default() };
    }

    pub fn record_episode(&mut self, episode: &EpisodeSummary) {
        self.games += 1;
        match episode.outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Tie => self.ties += 1,
        }
        self.reward_history.push(episode.total_reward);
        self.length_history.push(episode.length);
    }

    pub fn record_iteration(&mut self, transitions: usize, stats: Option<TrainingStats>) {
        self.iterations += 1;
        self.transitions += transitions;
        if stats.is_some() {
            self.last_stats = stats;
        }
    }

    /// Derive rates and averages from the current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let win_rate = if self.games == 0 { 0.0 } else { self.wins as f64 / self.games as f64 };

        MetricsSnapshot {
            games: self.games,
            wins: self.wins,
            losses: self.losses,
            ties: self.ties,
            win_rate,
            avg_reward: tail_mean(self.reward_history.iter().map(|&r| r as f64)),
            avg_length: tail_mean(self.length_history.iter().map(|&l| l as f64)),
            iterations: self.iterations,
            transitions: self.transitions,
            entropy: self.last_stats.as_ref().map(|s| s.entropy),
            elapsed_seconds: self.started_at.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0),
        }
    }
}

fn tail_mean<I>(values: I) -> f64
where
    I: DoubleEndedIterator<Item = f64>,
{
    let (sum, n) = values
        .rev()
        .take(MOVING_AVERAGE_WINDOW)
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Point-in-time view of the metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub games: usize,
    pub wins: usize,
    pub losses: usize,
    pub ties: usize,

    /// Wins over all games
    pub win_rate: f64,

    /// Mean episode reward over the last 100 games
    pub avg_reward: f64,

    /// Mean episode length over the last 100 games
    pub avg_length: f64,

    pub iterations: usize,
    pub transitions: usize,

    /// Policy entropy from the latest update
    pub entropy: Option<f64>,

    pub elapsed_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::OutcomeLabels;

    fn episode(outcome: Outcome, total_reward: f32, length: usize) -> EpisodeSummary {
        EpisodeSummary {
            outcome,
            labels: OutcomeLabels::tie(2),
            total_reward,
            length,
            duration: length as f32 * 0.1,
            opponent: "random".to_string(),
        }
    }

    #[test]
    fn test_counts_and_win_rate() {
        let mut metrics = TrainingMetrics::new();
        metrics.record_episode(&episode(Outcome::Win, 1.0, 10));
        metrics.record_episode(&episode(Outcome::Loss, -1.0, 20));
        metrics.record_episode(&episode(Outcome::Win, 1.0, 30));
        metrics.record_episode(&episode(Outcome::Tie, 0.0, 40));

        let snap = metrics.snapshot();
        assert_eq!((snap.games, snap.wins, snap.losses, snap.ties), (4, 2, 1, 1));
        assert_eq!(snap.win_rate, 0.5);
        assert_eq!(snap.avg_reward, 0.25);
        assert_eq!(snap.avg_length, 25.0);
        assert_eq!(snap.entropy, None);
    }

    #[test]
    fn test_moving_average_uses_last_window() {
        let mut metrics = TrainingMetrics::new();
        for _ in 0..50 {
            metrics.record_episode(&episode(Outcome::Loss, -1.0, 1));
        }
        for _ in 0..MOVING_AVERAGE_WINDOW {
            metrics.record_episode(&episode(Outcome::Win, 1.0, 3));
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.avg_reward, 1.0);
        assert_eq!(snap.avg_length, 3.0);
        assert_eq!(metrics.reward_history.len(), 150);
    }

    #[test]
    fn test_start_resets() {
        let mut metrics = TrainingMetrics::new();
        metrics.record_episode(&episode(Outcome::Win, 1.0, 1));
        metrics.record_iteration(64, Some(TrainingStats { entropy: 0.7, ..Default::default() }));
        assert_eq!(metrics.snapshot().entropy, Some(0.7));

        metrics.start();
        let snap = metrics.snapshot();
        assert_eq!(snap.games, 0);
        assert_eq!(snap.iterations, 0);
        assert!(snap.elapsed_seconds >= 0.0);
    }

    #[test]
    fn test_failed_update_keeps_previous_stats() {
        let mut metrics = TrainingMetrics::new();
        metrics.record_iteration(10, Some(TrainingStats { entropy: 0.5, ..Default::default() }));
        metrics.record_iteration(10, None);
        assert_eq!(metrics.iterations, 2);
        assert_eq!(metrics.transitions, 20);
        assert_eq!(metrics.snapshot().entropy, Some(0.5));
    }
}
