//! Feedforward networks for the policy agent
//!
//! The agent owns two independent MLPs, a policy network producing one output
//! per action dimension and a value network producing a single estimate.
//!
//! ```text
//! Input (observation)
//!         |
//!   [Dense(h0)] -> act
//!         |
//!        ...
//!         |
//!   [Dense(hn)] -> act
//!         |
//!    [Dense(out)]
//! ```

use serde::{Deserialize, Serialize};
use tch::nn::{self, Init};

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    ReLU,
    Tanh,
}

impl Activation {
    fn apply(self, x: &tch::Tensor) -> tch::Tensor {
        match self {
            Activation::ReLU => x.relu(),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Configuration shared by the policy and value networks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub hidden_sizes: Vec<i64>,
    pub activation: Activation,
    pub use_orthogonal_init: bool,

    /// Whether the Gaussian log-std of continuous dimensions is trained
    pub learn_log_std: bool,

    /// Starting log-std of continuous dimensions
    pub initial_log_std: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![64, 64],
            activation: Activation::Tanh,
            use_orthogonal_init: true,
            learn_log_std: true,
            initial_log_std: -0.5,
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set hidden layer sizes
    pub fn hidden_sizes(mut self, sizes: Vec<i64>) -> Self {
        self.hidden_sizes = sizes;
        self
    }

    /// Set hidden activation
    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Train or freeze the continuous log-std
    pub fn learn_log_std(mut self, learn: bool) -> Self {
        self.learn_log_std = learn;
        self
    }

    /// Set the starting log-std
    pub fn initial_log_std(mut self, log_std: f64) -> Self {
        self.initial_log_std = log_std;
        self
    }

    /// Architecture of one network built from this config
    pub fn architecture(&self, input_size: i64, output_size: i64) -> NetworkArchitecture {
        NetworkArchitecture {
            input_size,
            hidden_sizes: self.hidden_sizes.clone(),
            output_size,
            activation: self.activation,
        }
    }
}

/// Shape of one network, serialized next to its weights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkArchitecture {
    pub input_size: i64,
    pub hidden_sizes: Vec<i64>,
    pub output_size: i64,
    pub activation: Activation,
}

impl std::fmt::Display for NetworkArchitecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.input_size)?;
        for h in &self.hidden_sizes {
            write!(f, "-{}", h)?;
        }
        write!(f, "-{} ({:?})", self.output_size, self.activation)
    }
}

/// Build an MLP under `path`
///
/// Hidden layers are named `fc0..fcN`, the output layer `out`. Orthogonal
/// init uses gain √2 for hidden layers and `output_gain` for the output.
pub fn build_mlp(
    path: &nn::Path,
    architecture: &NetworkArchitecture,
    use_orthogonal_init: bool,
    output_gain: f64,
) -> nn::Sequential {
    let hidden_init = if use_orthogonal_init {
        Init::Orthogonal { gain: 2.0_f64.sqrt() }
    } else {
        Init::Randn { mean: 0.0, stdev: 0.01 }
    };
    let output_init = if use_orthogonal_init {
        Init::Orthogonal { gain: output_gain }
    } else {
        Init::Randn { mean: 0.0, stdev: 0.01 }
    };

    let hidden_config = nn::LinearConfig { ws_init: hidden_init, ..Default::default() };
    let output_config = nn::LinearConfig { ws_init: output_init, ..Default::default() };

    let activation = architecture.activation;
    let mut seq = nn::seq();
    let mut in_dim = architecture.input_size;

    for (i, &width) in architecture.hidden_sizes.iter().enumerate() {
        seq = seq
            .add(nn::linear(path / format!("fc{}", i), in_dim, width, hidden_config))
            .add_fn(move |x| activation.apply(x));
        in_dim = width;
    }

    seq.add(nn::linear(path / "out", in_dim, architecture.output_size, output_config))
}
