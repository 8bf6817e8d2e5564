//! Rollout collection
//!
//! A collector drives one environment instance and fills one fixed-length
//! buffer per call, yielding to the scheduler as it goes.

pub mod collector;
pub mod config;

pub use collector::{Rollout, RolloutCollector};
pub use config::CollectorConfig;
