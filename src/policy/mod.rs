//! Policy and value networks for the trained agent
//!
//! This module provides the tch-backed actor-critic agent, the MLP builder it
//! uses, and the serialized bundle format used for persistence and frozen
//! opponents.

pub mod agent;
pub mod bundle;
pub mod network;

pub use agent::{ActOutput, AgentMode, PolicyAgent};
pub use bundle::{AgentBundle, NamedTensor, NetworkBundle};
pub use network::{Activation, NetworkArchitecture, NetworkConfig};
