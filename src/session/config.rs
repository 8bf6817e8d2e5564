//! Session configuration
//!
//! A full session is described by one JSON document; every field is
//! optional and falls back to its default.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, rollout::CollectorConfig, train::PPOConfig};

/// The only training algorithm a session can run
pub const PPO_ALGORITHM: &str = "ppo";

/// Configuration for a training session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Finished games after which the session completes
    pub max_games: usize,

    /// Save the agent every this many finished games (0 disables)
    pub auto_save_interval: usize,

    /// Collectors run concurrently per iteration
    pub num_rollouts: usize,

    /// Training algorithm name
    pub algorithm: String,

    /// Key the agent is saved under
    pub model_key: String,

    pub collector: CollectorConfig,
    pub ppo: PPOConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_games: 1000,
            auto_save_interval: 100,
            num_rollouts: 4,
            algorithm: PPO_ALGORITHM.to_string(),
            model_key: "arena-agent".to_string(),
            collector: CollectorConfig::default(),
            ppo: PPOConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("parsing session config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading session config {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn max_games(mut self, games: usize) -> Self {
        self.max_games = games;
        self
    }

    pub fn auto_save_interval(mut self, games: usize) -> Self {
        self.auto_save_interval = games;
        self
    }

    pub fn num_rollouts(mut self, n: usize) -> Self {
        self.num_rollouts = n;
        self
    }

    pub fn algorithm(mut self, name: impl Into<String>) -> Self {
        self.algorithm = name.into();
        self
    }

    pub fn model_key(mut self, key: impl Into<String>) -> Self {
        self.model_key = key.into();
        self
    }

    pub fn collector(mut self, config: CollectorConfig) -> Self {
        self.collector = config;
        self
    }

    pub fn ppo(mut self, config: PPOConfig) -> Self {
        self.ppo = config;
        self
    }

    /// Validate configuration
    ///
    /// An unknown algorithm is a [`ConfigError::UnsupportedAlgorithm`]; the
    /// name is matched case-insensitively.
    pub fn validate(&self) -> Result<()> {
        if !self.algorithm.eq_ignore_ascii_case(PPO_ALGORITHM) {
            return Err(ConfigError::UnsupportedAlgorithm(self.algorithm.clone()).into());
        }
        if self.max_games == 0 {
            return Err(ConfigError::Invalid("max_games must be positive".to_string()).into());
        }
        if self.num_rollouts == 0 {
            return Err(ConfigError::Invalid("num_rollouts must be positive".to_string()).into());
        }
        if self.model_key.is_empty() {
            return Err(ConfigError::Invalid("model_key must not be empty".to_string()).into());
        }
        self.collector.validate()?;
        self.ppo.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_rollouts, 4);
        assert_eq!(config.algorithm, "ppo");
    }

    #[test]
    fn test_unsupported_algorithm() {
        let err = SessionConfig::new().algorithm("dqn").validate().unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::UnsupportedAlgorithm(name)) => assert_eq!(name, "dqn"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(SessionConfig::new().algorithm("PPO").validate().is_ok());
    }

    #[test]
    fn test_invalid_counts() {
        assert!(SessionConfig::new().num_rollouts(0).validate().is_err());
        assert!(SessionConfig::new().max_games(0).validate().is_err());
        assert!(SessionConfig::new().model_key("").validate().is_err());
        let bad_ppo = PPOConfig::new().epochs(0);
        assert!(SessionConfig::new().ppo(bad_ppo).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{
                "max_games": 20,
                "collector": { "rollout_max_length": 128 },
                "ppo": { "learning_rate": 0.001 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_games, 20);
        assert_eq!(config.auto_save_interval, 100);
        assert_eq!(config.collector.rollout_max_length, 128);
        assert_eq!(config.collector.yield_interval, CollectorConfig::default().yield_interval);
        assert_eq!(config.ppo.learning_rate, 0.001);
        assert_eq!(config.ppo.epochs, PPOConfig::default().epochs);
    }

    #[test]
    fn test_json_rejects_unknown_algorithm() {
        assert!(SessionConfig::from_json_str(r#"{ "algorithm": "a2c" }"#).is_err());
        assert!(SessionConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let config = SessionConfig::new().max_games(7).num_rollouts(2);
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(SessionConfig::from_json_file(&path).unwrap(), config);
        assert!(SessionConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
