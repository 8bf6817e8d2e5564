//! Train a duel arena policy with PPO self-play
//!
//! Each generation trains against the opponent pool, then freezes the
//! current weights as a new pool opponent so later generations face
//! their predecessors as well as the random mover.
//!
//! # Usage
//!
//! ```bash
//! # Default settings, models written to ./models
//! cargo run --example train_duel --release
//!
//! # Session settings from JSON, three generations, bincode models
//! cargo run --example train_duel --release -- --config duel.json --generations 3 --bincode
//! ```

use std::path::PathBuf;

use anyhow::Result;
use arena_selfplay::prelude::*;
use tokio::task::LocalSet;

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    output: PathBuf,
    generations: usize,
    snapshot_weight: f64,
    format: StoreFormat,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            output: PathBuf::from("models"),
            generations: 1,
            snapshot_weight: 1.0,
            format: StoreFormat::Json,
        }
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = iter.next().map(PathBuf::from),
            "--output" => {
                if let Some(dir) = iter.next() {
                    args.output = PathBuf::from(dir);
                }
            }
            "--generations" => {
                if let Some(n) = iter.next() {
                    args.generations = n.parse().unwrap_or(args.generations);
                }
            }
            "--snapshot-weight" => {
                if let Some(w) = iter.next() {
                    args.snapshot_weight = w.parse().unwrap_or(args.snapshot_weight);
                }
            }
            "--bincode" => args.format = StoreFormat::Bincode,
            _ => eprintln!("Unknown argument: {}", arg),
        }
    }
    args
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();
    let config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    tracing::info!("Session config: {}", serde_json::to_string(&config)?);

    let store = FileModelStore::new(&args.output, args.format)?;
    let arena = DuelArena::new();
    let mut agent = PolicyAgent::new(arena.observation_size(), arena.action_spaces(), NetworkConfig::default())?;
    match store.load(&config.model_key) {
        Ok(Some(bundle)) => {
            agent.load_bundle(&bundle)?;
            tracing::info!("Resuming from saved model '{}'", config.model_key);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Ignoring unreadable saved model: {:#}", e),
    }

    let mut session = TrainingSession::builder(config)
        .env_factory(|| Ok(Box::new(DuelArena::new()) as Box<dyn ArenaEnvironment>))
        .agent(agent)
        .store(store)
        .build()?;
    let events = session.subscribe();

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let local = LocalSet::new();

    for generation in 1..=args.generations {
        tracing::info!("=== Generation {}/{} ===", generation, args.generations);
        session.control().stop();
        session = local.block_on(&runtime, async move { session.start().await })??;

        for event in events.try_iter() {
            if let SessionEvent::TrainingComplete(metrics) | SessionEvent::Stopped(metrics) = event {
                tracing::info!(
                    "Generation {} finished: {} games, win rate {:.1}%, avg reward {:.3}, {:.1}s",
                    generation,
                    metrics.games,
                    metrics.win_rate * 100.0,
                    metrics.avg_reward,
                    metrics.elapsed_seconds
                );
            }
        }

        if generation < args.generations {
            let id = format!("gen-{}", generation);
            session.snapshot_opponent(&id, &format!("Generation {}", generation), args.snapshot_weight)?;
        }
    }

    Ok(())
}
