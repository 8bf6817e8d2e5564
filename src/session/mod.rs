//! Training session orchestrator
//!
//! A session owns the trained agent, its PPO trainer, the opponent pool and
//! one rollout collector per concurrent environment. Each loop iteration:
//!
//! 1. waits out a pause, or finishes if stopped
//! 2. fans out every collector over a shared `&PolicyAgent`, joins them and
//!    records every episode that ended, including those of failed collectors
//! 3. builds one batch with per-buffer GAE
//! 4. runs a PPO update with `&mut PolicyAgent`
//! 5. publishes progress, auto-saves, and completes once `max_games` is reached
//!
//! The loop runs as a local task on a single thread; collectors interleave
//! only at their yield points, and the trainer cannot run while any
//! collector still borrows the agent.

mod config;
mod control;
mod events;
mod metrics;

use anyhow::Result;
use crossbeam_channel::Receiver;
use futures::future::join_all;
use tokio::task::{self, JoinHandle};

pub use config::{SessionConfig, PPO_ALGORITHM};
pub use control::{SessionControl, SessionState};
pub use events::{EventSink, SessionEvent};
pub use metrics::{MetricsSnapshot, TrainingMetrics, MOVING_AVERAGE_WINDOW};

use crate::{
    buffer::TrainingBatch,
    env::{ActionSpace, ArenaEnvironment},
    error::ConfigError,
    opponent::{OpponentOption, OpponentPool},
    policy::PolicyAgent,
    rollout::{Rollout, RolloutCollector},
    store::ModelStore,
    train::{PPOTrainer, TrainingStats},
};

/// Creates one environment per collector
pub type EnvFactory = Box<dyn Fn() -> Result<Box<dyn ArenaEnvironment>>>;

/// Assembles a [`TrainingSession`]
///
/// The environment factory and the agent are required; the pool defaults
/// to a single random opponent and the store is optional.
pub struct SessionBuilder {
    config: SessionConfig,
    env_factory: Option<EnvFactory>,
    agent: Option<PolicyAgent>,
    pool: Option<OpponentPool>,
    store: Option<Box<dyn ModelStore>>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self { config, env_factory: None, agent: None, pool: None, store: None }
    }

    pub fn env_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn ArenaEnvironment>> + 'static,
    {
        self.env_factory = Some(Box::new(factory));
        self
    }

    pub fn agent(mut self, agent: PolicyAgent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn opponent_pool(mut self, pool: OpponentPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn store<S: ModelStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Validate everything and create the trainer
    ///
    /// One environment is built up front to check that its observation and
    /// action shapes match the agent.
    pub fn build(self) -> Result<TrainingSession> {
        self.config.validate()?;
        let env_factory = self.env_factory.ok_or(ConfigError::MissingEnvironment)?;
        let mut agent = self.agent.ok_or(ConfigError::MissingAgent)?;

        let probe = env_factory()?;
        let observation_size = probe.observation_size();
        let action_spaces = probe.action_spaces();
        if observation_size != agent.observation_size() || action_spaces.as_slice() != agent.action_spaces() {
            return Err(ConfigError::Invalid(format!(
                "environment has {} observations / {:?} actions but the agent expects {} / {:?}",
                observation_size,
                action_spaces,
                agent.observation_size(),
                agent.action_spaces()
            ))
            .into());
        }
        if self.config.collector.trained_seat >= probe.num_players() {
            return Err(ConfigError::Invalid(format!(
                "trained seat {} does not exist in a {}-player environment",
                self.config.collector.trained_seat,
                probe.num_players()
            ))
            .into());
        }
        drop(probe);

        let pool = match self.pool {
            Some(mut pool) => {
                pool.set_shape(observation_size, action_spaces.clone());
                pool
            }
            None => OpponentPool::new(observation_size, action_spaces.clone()),
        };

        agent.activate();
        let trainer = PPOTrainer::new(self.config.ppo.clone(), &agent)?;

        tracing::info!(
            "Training session ready: policy {}, {} collectors x {} transitions, {} games",
            agent.policy_architecture(),
            self.config.num_rollouts,
            self.config.collector.rollout_max_length,
            self.config.max_games
        );

        Ok(TrainingSession {
            config: self.config,
            env_factory,
            agent,
            trainer,
            pool,
            store: self.store,
            collectors: Vec::new(),
            control: SessionControl::new(),
            events: EventSink::new(),
            metrics: TrainingMetrics::new(),
            action_spaces,
        })
    }
}

/// Self-play PPO training session
pub struct TrainingSession {
    config: SessionConfig,
    env_factory: EnvFactory,
    agent: PolicyAgent,
    trainer: PPOTrainer,
    pool: OpponentPool,
    store: Option<Box<dyn ModelStore>>,
    collectors: Vec<RolloutCollector>,
    control: SessionControl,
    events: EventSink,
    metrics: TrainingMetrics,
    action_spaces: Vec<ActionSpace>,
}

impl std::fmt::Debug for TrainingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingSession")
            .field("state", &self.control.state())
            .field("config", &self.config)
            .field("collectors", &self.collectors.len())
            .field("games", &self.metrics.games)
            .finish()
    }
}

impl TrainingSession {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for pausing, resuming and stopping the running loop
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    /// Receive progress events from the next `start` on
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn agent(&self) -> &PolicyAgent {
        &self.agent
    }

    pub fn trainer(&self) -> &PPOTrainer {
        &self.trainer
    }

    pub fn pool(&self) -> &OpponentPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut OpponentPool {
        &mut self.pool
    }

    /// Freeze the current weights into a pool opponent
    ///
    /// Replaces any option with the same id.
    pub fn snapshot_opponent(&mut self, id: &str, label: &str, weight: f64) -> Result<()> {
        let bundle = self.agent.export()?;
        self.pool.add_option(OpponentOption::policy(id, label, bundle, weight));
        tracing::info!("Added snapshot '{}' to the opponent pool (weight {})", id, weight);
        Ok(())
    }

    /// Launch the training loop on the current `LocalSet`
    ///
    /// Moves idle to training and resets the metrics and environments before
    /// returning. The join handle hands the session back once the loop
    /// finishes. Starting a session that is not idle does nothing.
    ///
    /// Panics if called outside a `LocalSet`.
    pub fn start(mut self) -> JoinHandle<Result<Self>> {
        let began = self.control.begin();
        if began {
            self.collectors.clear();
            self.metrics.start();
            tracing::info!("Training started");
        } else {
            tracing::warn!("Ignoring start: session is {:?}", self.control.state());
        }

        task::spawn_local(async move {
            if !began {
                return Ok(self);
            }
            self.run().await
        })
    }

    async fn run(mut self) -> Result<Self> {
        loop {
            task::yield_now().await;
            if self.control.wait_while_paused().await != SessionState::Training {
                return Ok(self.finish_stopped());
            }

            let iteration = self.metrics.iterations + 1;
            self.events.emit(SessionEvent::RolloutStarted { iteration });
            if let Err(e) = self.ensure_collectors() {
                self.wind_down();
                return Err(e);
            }

            let games_before = self.metrics.games;
            let rollouts = match self.collect_all().await {
                Some(rollouts) => rollouts,
                None => return Ok(self.finish_stopped()),
            };

            let gamma = self.config.ppo.gamma as f32;
            let lambda = self.config.ppo.gae_lambda as f32;
            let batch = TrainingBatch::from_rollouts(rollouts.iter().map(|r| &r.buffer), gamma, lambda);
            task::yield_now().await;

            let (transitions, stats) = match batch {
                Ok(batch) => (batch.len(), self.train(&batch)),
                Err(e) => {
                    tracing::warn!("Iteration {}: could not build training batch: {:#}", iteration, e);
                    (0, None)
                }
            };
            task::yield_now().await;

            self.metrics.record_iteration(transitions, stats);
            let snapshot = self.metrics.snapshot();
            tracing::info!(
                "Iteration {}: {} games, win rate {:.3}, avg reward {:.3}",
                iteration,
                snapshot.games,
                snapshot.win_rate,
                snapshot.avg_reward
            );
            self.events.emit(SessionEvent::TrainingProgress(snapshot));

            if self.control.is_stopped() {
                return Ok(self.finish_stopped());
            }

            let interval = self.config.auto_save_interval;
            if interval > 0 && games_before / interval < self.metrics.games / interval {
                self.save("auto-save");
            }

            if self.metrics.games >= self.config.max_games {
                self.control.complete();
                self.save("completion");
                let snapshot = self.metrics.snapshot();
                tracing::info!(
                    "Training complete after {} games in {:.1}s",
                    snapshot.games,
                    snapshot.elapsed_seconds
                );
                self.events.emit(SessionEvent::TrainingComplete(snapshot));
                return Ok(self);
            }
        }
    }

    fn ensure_collectors(&mut self) -> Result<()> {
        while self.collectors.len() < self.config.num_rollouts {
            let id = self.collectors.len();
            let env = (self.env_factory)()?;
            if env.action_spaces() != self.action_spaces {
                return Err(ConfigError::Invalid(format!(
                    "environment {} changed its action spaces to {:?}",
                    id,
                    env.action_spaces()
                ))
                .into());
            }
            self.collectors.push(RolloutCollector::new(id, env, self.config.collector.clone())?);
        }
        Ok(())
    }

    /// Run every collector to completion and record the episodes they ended
    ///
    /// `None` means the session was stopped while collecting. A collector
    /// that fails is logged and reset; the others still contribute. Games
    /// that finished before a failure or a stop are still counted.
    async fn collect_all(&mut self) -> Option<Vec<Rollout>> {
        let agent = &self.agent;
        let pool = &self.pool;
        let control = &self.control;
        let results = join_all(
            self.collectors
                .iter_mut()
                .map(|collector| collector.collect_rollout(agent, pool, control)),
        )
        .await;

        let mut rollouts = Vec::with_capacity(results.len());
        let mut stopped = false;
        for (collector, result) in self.collectors.iter_mut().zip(results) {
            let episodes = match result {
                Ok(Some(mut rollout)) => {
                    let episodes = std::mem::take(&mut rollout.episodes);
                    rollouts.push(rollout);
                    episodes
                }
                Ok(None) => {
                    stopped = true;
                    collector.take_finished_episodes()
                }
                Err(e) => {
                    tracing::warn!("Collector {} failed, resetting its episode: {:#}", collector.id(), e);
                    collector.invalidate();
                    collector.take_finished_episodes()
                }
            };
            for episode in episodes {
                self.metrics.record_episode(&episode);
                self.events.emit(SessionEvent::EpisodeEnded(episode));
            }
        }

        if stopped || self.control.is_stopped() {
            None
        } else {
            Some(rollouts)
        }
    }

    fn train(&mut self, batch: &TrainingBatch) -> Option<TrainingStats> {
        if batch.is_empty() {
            return None;
        }
        match self.trainer.update(&mut self.agent, batch) {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!("PPO update failed, continuing with the next iteration: {:#}", e);
                None
            }
        }
    }

    /// Best-effort save of the current weights under `model_key`
    fn save(&mut self, reason: &str) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let result = self.agent.export().and_then(|bundle| store.save(&self.config.model_key, &bundle));
        match result {
            Ok(()) => tracing::info!("Saved '{}' ({})", self.config.model_key, reason),
            Err(e) => tracing::warn!("Saving '{}' failed ({}): {:#}", self.config.model_key, reason, e),
        }
    }

    fn finish_stopped(mut self) -> Self {
        self.wind_down();
        self
    }

    /// Return to idle, discard in-flight episodes and save
    fn wind_down(&mut self) {
        self.control.stop();
        self.collectors.clear();
        self.save("stop");
        let snapshot = self.metrics.snapshot();
        tracing::info!("Training stopped after {} games", snapshot.games);
        self.events.emit(SessionEvent::Stopped(snapshot));
    }
}
