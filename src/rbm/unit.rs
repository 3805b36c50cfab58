//! The training/sampling/persistence contract shared by all RBM variants.

use std::path::Path;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::data::BatchPolicy;
use crate::train::DecayRule;
use crate::Result;

/// Gradient statistics produced by one CD-k pass over a mini-batch.
#[derive(Debug, Clone)]
pub struct GibbsSample {
    /// Positive minus negative associations, shape `(num_visible, num_hidden)`
    /// in the unit's visible/hidden representation.
    pub associations_delta: Array2<f64>,
    /// Hidden probability delta between the data and the reconstruction,
    /// shape `(batch, num_hidden)`.
    pub hidden_bias_delta: Array2<f64>,
    /// Reconstructed visible units after k steps, shape `(batch, num_visible)`.
    pub visible_new: Array2<f64>,
    /// Hidden probabilities sampled from the reconstruction,
    /// shape `(batch, num_hidden)`.
    pub hidden_probs_new: Array2<f64>,
}

/// Per-unit training diagnostics, appended to by every `train` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Total squared reconstruction error per epoch.
    pub costs: Vec<f64>,
    /// Average free energy of the first training batch, sampled periodically.
    pub train_free_energies: Vec<f64>,
    /// Average free energy of the validation set, sampled periodically.
    pub validation_free_energies: Vec<f64>,
}

/// Hyperparameters for one `train` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub max_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub gibbs_k: usize,
    pub decay: DecayRule,
    pub batch_policy: BatchPolicy,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_epochs: 100,
            batch_size: 10,
            learning_rate: 0.1,
            momentum: 0.5,
            gibbs_k: 1,
            decay: DecayRule::Constant,
            batch_policy: BatchPolicy::KeepRemainder,
        }
    }
}

impl TrainConfig {
    pub fn max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn gibbs_k(mut self, gibbs_k: usize) -> Self {
        self.gibbs_k = gibbs_k;
        self
    }

    pub fn decay(mut self, decay: DecayRule) -> Self {
        self.decay = decay;
        self
    }

    pub fn batch_policy(mut self, batch_policy: BatchPolicy) -> Self {
        self.batch_policy = batch_policy;
        self
    }

    /// Validate the hyperparameters against the dataset before any epoch runs.
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if self.max_epochs == 0 {
            return Err(crate::RbmError::Configuration(
                "max_epochs must be at least 1".into(),
            ));
        }
        if self.gibbs_k == 0 {
            return Err(crate::RbmError::Configuration(
                "gibbs_k must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(crate::RbmError::Configuration(
                "batch size must be at least 1".into(),
            ));
        }
        if self.batch_size > n_samples {
            return Err(crate::RbmError::Configuration(format!(
                "batch size {} exceeds dataset size {}",
                self.batch_size, n_samples
            )));
        }
        Ok(())
    }
}

/// Optional callbacks observed at epoch boundaries during training.
#[derive(Default)]
pub struct TrainHooks<'a> {
    /// Called with one reconstructed visible sample at the end of each epoch.
    pub display: Option<&'a mut dyn FnMut(ArrayView1<'_, f64>)>,
    /// Called with the epoch index after each epoch; returning `true` stops
    /// training cleanly at that boundary.
    pub stop: Option<&'a mut dyn FnMut(usize) -> bool>,
}

/// The contract shared by all Restricted Boltzmann Machine variants.
///
/// A unit owns its weight matrix, bias vectors, momentum velocity and
/// diagnostics, and mutates them only inside `train`. The visible/hidden
/// dimensions reported here are in the unit's internal representation
/// (for the multinomial variant, categorical units times their arity).
pub trait RbmUnit {
    fn num_visible(&self) -> usize;
    fn num_hidden(&self) -> usize;

    /// Run k steps of Gibbs sampling starting from the visible configuration
    /// `v0` and return the gradient statistics of the chain.
    fn gibbs_sampling(&mut self, v0: &Array2<f64>, k: usize) -> GibbsSample;

    /// Hidden probabilities and sampled states for a batch of visible units.
    ///
    /// `gibbs_k` of 1 is a single upward pass; larger values alternate
    /// reconstruction and re-sampling before the final hidden draw.
    fn sample_hidden_from_visible(
        &mut self,
        v: &Array2<f64>,
        gibbs_k: usize,
    ) -> (Array2<f64>, Array2<f64>);

    /// Visible probabilities (or values) and sampled states for a batch of
    /// hidden units, after `gibbs_k` alternating sampling steps.
    fn sample_visible_from_hidden(
        &mut self,
        h: &Array2<f64>,
        gibbs_k: usize,
    ) -> (Array2<f64>, Array2<f64>);

    /// Average free energy of `data` under the current parameters. Purely
    /// diagnostic; lower means better fit.
    fn average_free_energy(&self, data: &Array2<f64>) -> f64;

    /// Train with CD-k, mutating weights, biases and velocity in place and
    /// appending to the diagnostics.
    fn train(
        &mut self,
        data: &Array2<f64>,
        validation: Option<&Array2<f64>>,
        config: &TrainConfig,
    ) -> Result<()> {
        self.train_with_hooks(data, validation, config, &mut TrainHooks::default())
    }

    /// Like `train`, with display and cancellation callbacks observed at
    /// epoch boundaries.
    fn train_with_hooks(
        &mut self,
        data: &Array2<f64>,
        validation: Option<&Array2<f64>>,
        config: &TrainConfig,
        hooks: &mut TrainHooks<'_>,
    ) -> Result<()>;

    /// Persist the full trainable state and diagnostics as a JSON record.
    fn save_configuration(&self, path: &Path) -> Result<()>;

    /// Restore state previously written by `save_configuration`.
    fn load_configuration(&mut self, path: &Path) -> Result<()>;

    fn diagnostics(&self) -> &Diagnostics;
}
