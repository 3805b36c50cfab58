//! Gaussian-Bernoulli RBM: real-valued visible units, binary hidden units.
//!
//! Visible units carry a fixed, shared dispersion `sigma`. Hidden
//! pre-activations divide the visible values by sigma^2 and the
//! reconstruction draws each visible unit from N(mean, sigma^2).

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use crate::{RbmError, Result};

use super::cd::{self, CdModel};
use super::storage::SavedRbm;
use super::unit::{Diagnostics, GibbsSample, RbmUnit, TrainConfig, TrainHooks};

/// Default dispersion of the visible units.
pub const DEFAULT_SIGMA: f64 = 0.2;

/// Restricted Boltzmann Machine with Gaussian visible and Bernoulli hidden
/// units.
#[derive(Debug, Clone)]
pub struct GaussianRbm {
    /// Weight matrix (num_visible x num_hidden)
    pub weights: Array2<f64>,
    /// Hidden bias (num_hidden)
    pub hidden_bias: Array1<f64>,
    /// Visible bias (num_visible)
    pub visible_bias: Array1<f64>,
    /// Number of visible units
    pub num_visible: usize,
    /// Number of hidden units
    pub num_hidden: usize,
    /// Shared standard deviation of the visible units, fixed during training
    pub sigma: f64,
    velocity: Array2<f64>,
    diagnostics: Diagnostics,
    rng: StdRng,
}

impl GaussianRbm {
    /// Create a new unit with small random weights and `sigma` at
    /// [`DEFAULT_SIGMA`].
    pub fn new(num_visible: usize, num_hidden: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let normal = Normal::new(0.0, 0.01).unwrap();
        let weights = Array2::from_shape_fn((num_visible, num_hidden), |_| rng.sample(normal));

        Self {
            weights,
            hidden_bias: Array1::zeros(num_hidden),
            visible_bias: Array1::ones(num_visible),
            num_visible,
            num_hidden,
            sigma: DEFAULT_SIGMA,
            velocity: Array2::zeros((num_visible, num_hidden)),
            diagnostics: Diagnostics::default(),
            rng,
        }
    }

    /// Create a unit from explicit parameters. All of them must be supplied
    /// together and agree on the layer sizes.
    pub fn with_params(
        weights: Array2<f64>,
        hidden_bias: Array1<f64>,
        visible_bias: Array1<f64>,
        sigma: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let (num_visible, num_hidden) = weights.dim();
        if hidden_bias.len() != num_hidden || visible_bias.len() != num_visible {
            return Err(RbmError::Configuration(format!(
                "bias lengths ({}, {}) do not match weight matrix shape ({}, {})",
                visible_bias.len(),
                hidden_bias.len(),
                num_visible,
                num_hidden
            )));
        }
        Self {
            weights,
            hidden_bias,
            visible_bias,
            num_visible,
            num_hidden,
            sigma: DEFAULT_SIGMA,
            velocity: Array2::zeros((num_visible, num_hidden)),
            diagnostics: Diagnostics::default(),
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
        .with_sigma(sigma)
    }

    /// Replace the visible dispersion. Must be strictly positive.
    pub fn with_sigma(mut self, sigma: f64) -> Result<Self> {
        if sigma <= 0.0 {
            return Err(RbmError::Configuration(format!(
                "sigma must be positive, got {}",
                sigma
            )));
        }
        self.sigma = sigma;
        Ok(self)
    }

    /// Hidden pre-activations `(v / sigma^2)·W + b` for a batch of visible
    /// rows.
    pub fn hidden_activations(&self, v: &Array2<f64>) -> Array2<f64> {
        let s2 = self.sigma * self.sigma;
        v.mapv(|x| x / s2).dot(&self.weights) + &self.hidden_bias
    }

    /// P(h_j = 1 | v) for a batch of visible rows.
    pub fn hidden_probabilities(&self, v: &Array2<f64>) -> Array2<f64> {
        self.hidden_activations(v).mapv(cd::sigmoid)
    }

    /// Mean of the Gaussian reconstruction `h·W^T + a` for a batch of hidden
    /// rows.
    pub fn visible_means(&self, h: &Array2<f64>) -> Array2<f64> {
        h.dot(&self.weights.t()) + &self.visible_bias
    }

    fn sample_visible_values(&mut self, h: &Array2<f64>) -> Array2<f64> {
        let means = self.visible_means(h);
        let normal = Normal::new(0.0, self.sigma).unwrap();
        let rng = &mut self.rng;
        means.mapv(|m| m + rng.sample(normal))
    }

    fn gibbs_pass(&mut self, v0: &Array2<f64>, k: usize) -> GibbsSample {
        let k = k.max(1);

        let h_probs_0 = self.hidden_probabilities(v0);
        let mut h_states = cd::sample_binary(&mut self.rng, &h_probs_0);
        let pos_associations = v0.t().dot(&h_probs_0);

        let mut v_values = v0.to_owned();
        let mut h_probs_new = h_probs_0.clone();
        let mut neg_associations = Array2::zeros(pos_associations.raw_dim());

        for step in 0..k {
            v_values = self.sample_visible_values(&h_states);
            h_probs_new = self.hidden_probabilities(&v_values);
            h_states = cd::sample_binary(&mut self.rng, &h_probs_new);
            if step + 1 == k {
                neg_associations = v_values.t().dot(&h_probs_new);
            }
        }

        let s2 = self.sigma * self.sigma;
        GibbsSample {
            associations_delta: (pos_associations - neg_associations) / s2,
            hidden_bias_delta: &h_probs_0 - &h_probs_new,
            visible_new: v_values,
            hidden_probs_new: h_probs_new,
        }
    }

    fn free_energy(&self, data: &Array2<f64>) -> f64 {
        let wx_b = self.hidden_activations(data);
        let s2 = self.sigma * self.sigma;
        // Quadratic visible term ||v - a||^2 / (2 sigma^2) per row.
        let vbias_term = data
            .outer_iter()
            .map(|row| {
                (&row - &self.visible_bias).mapv(|x| x * x).sum() / (2.0 * s2)
            })
            .collect::<Array1<f64>>();
        let hidden_term = wx_b.mapv(|x| (1.0 + x.exp()).ln()).sum_axis(Axis(1));
        (vbias_term - hidden_term).mean().unwrap_or(0.0)
    }
}

impl CdModel for GaussianRbm {
    fn name(&self) -> &'static str {
        "gaussian rbm"
    }

    fn gibbs(&mut self, v0: &Array2<f64>, k: usize) -> GibbsSample {
        self.gibbs_pass(v0, k)
    }

    fn weights_mut(&mut self) -> &mut Array2<f64> {
        &mut self.weights
    }

    fn hidden_bias_mut(&mut self) -> &mut Array1<f64> {
        &mut self.hidden_bias
    }

    fn visible_bias_mut(&mut self) -> &mut Array1<f64> {
        &mut self.visible_bias
    }

    fn velocity_mut(&mut self) -> &mut Array2<f64> {
        &mut self.velocity
    }

    fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    fn batch_free_energy(&self, data: &Array2<f64>) -> f64 {
        self.free_energy(data)
    }

    fn free_energy_interval(&self) -> usize {
        10
    }

    fn visible_bias_scale(&self) -> f64 {
        1.0 / (self.sigma * self.sigma)
    }
}

impl RbmUnit for GaussianRbm {
    fn num_visible(&self) -> usize {
        self.num_visible
    }

    fn num_hidden(&self) -> usize {
        self.num_hidden
    }

    fn gibbs_sampling(&mut self, v0: &Array2<f64>, k: usize) -> GibbsSample {
        self.gibbs_pass(v0, k)
    }

    fn sample_hidden_from_visible(
        &mut self,
        v: &Array2<f64>,
        gibbs_k: usize,
    ) -> (Array2<f64>, Array2<f64>) {
        let mut probs = self.hidden_probabilities(v);
        let mut states = cd::sample_binary(&mut self.rng, &probs);
        for _ in 1..gibbs_k.max(1) {
            let values = self.sample_visible_values(&states);
            probs = self.hidden_probabilities(&values);
            states = cd::sample_binary(&mut self.rng, &probs);
        }
        (probs, states)
    }

    fn sample_visible_from_hidden(
        &mut self,
        h: &Array2<f64>,
        gibbs_k: usize,
    ) -> (Array2<f64>, Array2<f64>) {
        let mut means = self.visible_means(h);
        let mut values = self.sample_visible_values(h);
        for _ in 1..gibbs_k.max(1) {
            let h_probs = self.hidden_probabilities(&values);
            let h_states = cd::sample_binary(&mut self.rng, &h_probs);
            means = self.visible_means(&h_states);
            values = self.sample_visible_values(&h_states);
        }
        (means, values)
    }

    fn average_free_energy(&self, data: &Array2<f64>) -> f64 {
        self.free_energy(data)
    }

    fn train_with_hooks(
        &mut self,
        data: &Array2<f64>,
        validation: Option<&Array2<f64>>,
        config: &TrainConfig,
        hooks: &mut TrainHooks<'_>,
    ) -> Result<()> {
        cd::train(self, data, validation, config, hooks)
    }

    fn save_configuration(&self, path: &Path) -> Result<()> {
        SavedRbm {
            w: self.weights.clone(),
            h_bias: self.hidden_bias.clone(),
            v_bias: self.visible_bias.clone(),
            num_visible: self.num_visible,
            num_hidden: self.num_hidden,
            costs: self.diagnostics.costs.clone(),
            train_free_energies: self.diagnostics.train_free_energies.clone(),
            validation_free_energies: self.diagnostics.validation_free_energies.clone(),
            sigma: Some(self.sigma),
            k_visible: None,
            k_hidden: None,
        }
        .write(path)
    }

    fn load_configuration(&mut self, path: &Path) -> Result<()> {
        let record = SavedRbm::read(path)?;
        let sigma = record.sigma.ok_or_else(|| {
            RbmError::Persistence("record does not describe a gaussian unit".into())
        })?;
        if record.k_visible.is_some() || record.k_hidden.is_some() {
            return Err(RbmError::Persistence(
                "record describes a multinomial unit".into(),
            ));
        }
        self.diagnostics = record.diagnostics();
        self.num_visible = record.num_visible;
        self.num_hidden = record.num_hidden;
        self.sigma = sigma;
        self.velocity = Array2::zeros(record.w.dim());
        self.weights = record.w;
        self.hidden_bias = record.h_bias;
        self.visible_bias = record.v_bias;
        Ok(())
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
