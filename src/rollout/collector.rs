//! Rollout collector
//!
//! Fills one buffer per call by playing the trained agent against pool
//! opponents. Each transition is one agent decision held for
//! `action_interval_seconds` of simulated time (frame-skip). Episodes reset
//! lazily and draw a fresh opponent on every reset; an episode still running
//! when the buffer fills carries over into the next call.

use anyhow::{anyhow, bail, Result};

use super::config::CollectorConfig;
use crate::{
    buffer::{EpisodeSummary, RolloutBuffer, Transition},
    env::{ArenaEnvironment, EnvStep},
    opponent::{OpponentBehavior, OpponentPool},
    policy::PolicyAgent,
    session::SessionControl,
};

const INTERVAL_EPSILON: f32 = 1e-6;

/// One collector's contribution to a training iteration
#[derive(Debug)]
pub struct Rollout {
    pub collector_id: usize,
    pub buffer: RolloutBuffer,

    /// Episodes that finished while filling the buffer
    pub episodes: Vec<EpisodeSummary>,
}

/// Episode in progress
struct EpisodeState {
    last: EnvStep,
    opponent: Box<dyn OpponentBehavior>,
    total_reward: f32,
    length: usize,
    elapsed: f32,
}

/// Where an episode stands after one decision
enum EpisodeProgress {
    Continuing(EpisodeState),
    Ended(EpisodeSummary),
}

/// Drives one environment instance
pub struct RolloutCollector {
    id: usize,
    env: Box<dyn ArenaEnvironment>,
    config: CollectorConfig,
    episode: Option<EpisodeState>,

    /// Episodes ended since the last successful call or drain
    finished: Vec<EpisodeSummary>,
}

impl RolloutCollector {
    pub fn new(id: usize, env: Box<dyn ArenaEnvironment>, config: CollectorConfig) -> Result<Self> {
        config.validate()?;
        if config.trained_seat >= env.num_players() {
            bail!(
                "trained seat {} does not exist in a {}-player environment",
                config.trained_seat,
                env.num_players()
            );
        }
        Ok(Self { id, env, config, episode: None, finished: Vec::new() })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Drop the episode in progress; the next call starts from a reset
    pub fn invalidate(&mut self) {
        self.episode = None;
    }

    /// Episodes that ended during a call that failed or was stopped
    ///
    /// A successful call hands its episodes out in [`Rollout::episodes`]
    /// instead, so every finished episode is reported exactly once.
    pub fn take_finished_episodes(&mut self) -> Vec<EpisodeSummary> {
        std::mem::take(&mut self.finished)
    }

    fn start_episode(&mut self, pool: &OpponentPool) -> Result<EpisodeState> {
        let first = self.env.reset()?;
        let opponent = pool.sample_behavior();
        tracing::trace!("Collector {} starting episode against {}", self.id, opponent.name());
        Ok(EpisodeState { last: first, opponent, total_reward: 0.0, length: 0, elapsed: 0.0 })
    }

    /// Collect exactly `rollout_max_length` transitions
    ///
    /// Yields to the scheduler every `yield_interval` transitions and returns
    /// `Ok(None)` if the session was stopped at one of those points. The
    /// returned buffer has every `next_value` resolved. Episodes that end
    /// before an error or a stop stay available through
    /// [`take_finished_episodes`](Self::take_finished_episodes).
    pub async fn collect_rollout(
        &mut self,
        agent: &PolicyAgent,
        pool: &OpponentPool,
        control: &SessionControl,
    ) -> Result<Option<Rollout>> {
        let mut buffer = RolloutBuffer::new(self.config.rollout_max_length);

        while !buffer.is_full() {
            let episode = match self.episode.take() {
                Some(episode) => episode,
                None => self.start_episode(pool)?,
            };
            let (transition, progress) = self.decide_and_step(agent, episode)?;
            buffer.push(transition)?;

            match progress {
                EpisodeProgress::Continuing(state) => self.episode = Some(state),
                EpisodeProgress::Ended(summary) => {
                    tracing::debug!(
                        "Collector {} episode ended: {:?} vs {} after {} decisions",
                        self.id,
                        summary.outcome,
                        summary.opponent,
                        summary.length
                    );
                    self.finished.push(summary);
                }
            }

            if buffer.len() % self.config.yield_interval == 0 {
                tokio::task::yield_now().await;
                if control.is_stopped() {
                    tracing::debug!("Collector {} stopped after {} transitions", self.id, buffer.len());
                    return Ok(None);
                }
            }
        }

        let bootstrap_value = match (&self.episode, buffer.last()) {
            (_, Some(last)) if last.done => 0.0,
            (Some(state), _) => agent.value(state.last.observation(self.config.trained_seat)?)?,
            (None, _) => 0.0,
        };
        buffer.resolve_next_values(bootstrap_value);

        let episodes = self.take_finished_episodes();
        Ok(Some(Rollout { collector_id: self.id, buffer, episodes }))
    }

    /// Choose actions for every seat and hold them for one decision interval
    fn decide_and_step(
        &mut self,
        agent: &PolicyAgent,
        mut episode: EpisodeState,
    ) -> Result<(Transition, EpisodeProgress)> {
        let seat = self.config.trained_seat;
        let observation = episode.last.observation(seat)?.to_vec();
        let act = agent.act(&observation)?;

        let mut actions = Vec::with_capacity(self.env.num_players());
        for player in 0..self.env.num_players() {
            if player == seat {
                actions.push(act.action.clone());
            } else {
                actions.push(episode.opponent.decide(episode.last.observation(player)?));
            }
        }

        let dt = self.config.delta_time;
        let interval = self.config.action_interval_seconds;
        let mut reward = 0.0;
        let mut held = 0.0;
        let step = loop {
            let step = self.env.step(&actions, dt)?;
            reward += step.reward(seat);
            held += dt;
            if step.done || held + INTERVAL_EPSILON >= interval {
                break step;
            }
        };

        episode.total_reward += reward;
        episode.length += 1;
        episode.elapsed += held;

        let outcome = if step.done {
            let labels = step
                .outcome
                .clone()
                .ok_or_else(|| anyhow!("environment ended an episode without outcome labels"))?;
            Some(labels)
        } else {
            None
        };

        let transition = Transition {
            observation,
            action: act.action,
            reward,
            done: step.done,
            value: act.value,
            log_prob: act.log_prob,
            next_value: None,
            outcome: outcome.clone(),
        };

        let progress = match outcome {
            Some(labels) => {
                let outcome = labels
                    .for_seat(seat)
                    .ok_or_else(|| anyhow!("outcome labels do not cover seat {}", seat))?;
                EpisodeProgress::Ended(EpisodeSummary {
                    outcome,
                    labels,
                    total_reward: episode.total_reward,
                    length: episode.length,
                    duration: episode.elapsed,
                    opponent: episode.opponent.name().to_string(),
                })
            }
            None => {
                episode.last = step;
                EpisodeProgress::Continuing(episode)
            }
        };

        Ok((transition, progress))
    }
}
