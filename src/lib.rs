//! # Arena self-play
//!
//! Self-play PPO training core for two-player arena games.
//!
//! A [`session::TrainingSession`] runs several rollout collectors against a
//! weighted pool of opponents, computes GAE advantages per buffer and
//! optimizes an actor-critic [`policy::PolicyAgent`] with clipped PPO, all on
//! a single thread with cooperative yields.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arena_selfplay::prelude::*;
//!
//! # async fn train() -> anyhow::Result<()> {
//! let arena = DuelArena::new();
//! let agent = PolicyAgent::new(arena.observation_size(), arena.action_spaces(), NetworkConfig::default())?;
//!
//! let session = TrainingSession::builder(SessionConfig::default().max_games(200))
//!     .env_factory(|| Ok(Box::new(DuelArena::new()) as Box<dyn ArenaEnvironment>))
//!     .agent(agent)
//!     .store(MemoryModelStore::new())
//!     .build()?;
//!
//! let local = tokio::task::LocalSet::new();
//! let session = local.run_until(async move { session.start().await }).await??;
//! println!("{:?}", session.metrics().snapshot());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

/// Environment adapter contract and the reference duel arena
pub mod env;

/// Actor-critic policy agent, network construction and weight bundles
pub mod policy;

/// Opponent behaviors and the weighted opponent pool
pub mod opponent;

/// Rollout buffers and advantage estimation
pub mod buffer;

/// Rollout collection with frame-skip
pub mod rollout;

/// PPO optimization
pub mod train;

/// Training session orchestration
pub mod session;

/// Model persistence
pub mod store;

/// Typed fatal errors
pub mod error;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        env::{
            duel::{ArenaConfig, DuelArena, RewardConfig},
            ActionSpace, ArenaEnvironment, EnvStep, Outcome, OutcomeLabels,
        },
        error::{BundleError, ConfigError},
        opponent::{OpponentBehavior, OpponentOption, OpponentPool},
        policy::{AgentBundle, AgentMode, NetworkConfig, PolicyAgent},
        rollout::CollectorConfig,
        session::{SessionConfig, SessionControl, SessionEvent, SessionState, TrainingSession},
        store::{FileModelStore, MemoryModelStore, ModelStore, StoreFormat},
        train::PPOConfig,
    };
}

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
