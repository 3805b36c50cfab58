//! Restricted Boltzmann Machines and Deep Belief Networks
//!
//! This library provides generative energy-based models trained with
//! Contrastive Divergence: Bernoulli, Gaussian and Multinomial Restricted
//! Boltzmann Machines, and a Deep Belief Network built by greedy layer-wise
//! pretraining of a stack of RBMs.
//!
//! # Modules
//!
//! - `data`: mini-batch partitioning and one-hot encoding helpers
//! - `train`: learning-rate and momentum schedules
//! - `rbm`: the RBM unit contract and its three variants
//! - `dbn`: the Deep Belief Network stack
//!
//! # Example
//!
//! ```no_run
//! use deep_belief::rbm::{BernoulliRbm, RbmUnit, TrainConfig};
//! use ndarray::array;
//!
//! let data = array![
//!     [1.0, 1.0, 0.0, 0.0],
//!     [1.0, 1.0, 0.0, 0.0],
//!     [0.0, 0.0, 1.0, 1.0],
//!     [0.0, 0.0, 1.0, 1.0],
//! ];
//!
//! let mut rbm = BernoulliRbm::new(4, 2, Some(42));
//! let config = TrainConfig::default().max_epochs(50).batch_size(2);
//! rbm.train(&data, None, &config).unwrap();
//!
//! // Hidden-unit probabilities are the learned feature representation.
//! let (probs, _states) = rbm.sample_hidden_from_visible(&data, 1);
//! assert_eq!(probs.ncols(), 2);
//! ```

pub mod data;
pub mod dbn;
pub mod rbm;
pub mod train;

pub use data::{generate_batches, one_hot, BatchPolicy};
pub use dbn::Dbn;
pub use rbm::{
    BernoulliRbm, Diagnostics, GaussianRbm, GibbsSample, MultinomialRbm, RbmUnit, SavedRbm,
    TrainConfig, TrainHooks,
};
pub use train::{DecayRule, LearningRateSchedule, MomentumSchedule};

/// Error types for the crate
#[derive(thiserror::Error, Debug)]
pub enum RbmError {
    /// Inconsistent constructor arguments or invalid hyperparameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed or missing fields in a persisted model record, or a failed
    /// read/write of one.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A layer index outside the network.
    #[error("layer index {index} out of range for a network with {layers} layers")]
    LayerOutOfRange { index: usize, layers: usize },
}

impl From<std::io::Error> for RbmError {
    fn from(err: std::io::Error) -> Self {
        RbmError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for RbmError {
    fn from(err: serde_json::Error) -> Self {
        RbmError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RbmError>;
