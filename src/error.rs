//! Typed errors for the conditions that must reach the caller
//!
//! Everything else in the crate propagates `anyhow::Error`; these variants are
//! wrapped into it so callers can `downcast_ref` when they need to tell a
//! configuration mistake apart from an incompatible weight bundle.

/// Errors raised while assembling or configuring a training session.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported training algorithm '{0}' (supported: ppo)")]
    UnsupportedAlgorithm(String),

    #[error("a training session requires a policy agent")]
    MissingAgent,

    #[error("a training session requires an environment factory")]
    MissingEnvironment,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised when importing weights whose shape does not match the agent.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("{network} architecture mismatch: expected {expected}, found {found}")]
    ArchitectureMismatch {
        network: &'static str,
        expected: String,
        found: String,
    },

    #[error("{network} bundle is missing weight '{name}'")]
    MissingWeight { network: &'static str, name: String },

    #[error("{network} bundle carries unknown weight '{name}'")]
    UnexpectedWeight { network: &'static str, name: String },

    #[error("weight '{name}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        found: Vec<i64>,
    },

    #[error("weight '{name}' declares {declared} values but carries {actual}")]
    ValueCount {
        name: String,
        declared: usize,
        actual: usize,
    },
}
