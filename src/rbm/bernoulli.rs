//! Restricted Boltzmann Machine with binary visible and hidden units.
//!
//! Energy function: E(v,h) = -v·W·h - a·v - b·h

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use crate::{RbmError, Result};

use super::cd::{self, CdModel};
use super::storage::SavedRbm;
use super::unit::{Diagnostics, GibbsSample, RbmUnit, TrainConfig, TrainHooks};

/// Restricted Boltzmann Machine with Bernoulli visible and hidden units.
#[derive(Debug, Clone)]
pub struct BernoulliRbm {
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
    velocity: Array2<f64>,
    diagnostics: Diagnostics,
    rng: StdRng,
}

impl BernoulliRbm {
    /// Create a new unit with small random weights.
    ///
    /// Weights are drawn from N(0, 0.1); biases start at one (the visible
    /// bias is replaced by the empirical log-odds of each feature when
    /// training starts). Pass a seed for reproducible sampling.
    pub fn new(num_visible: usize, num_hidden: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let normal = Normal::new(0.0, 0.1).unwrap();
        let weights = Array2::from_shape_fn((num_visible, num_hidden), |_| rng.sample(normal));

        Self {
            weights,
            hidden_bias: Array1::ones(num_hidden),
            visible_bias: Array1::ones(num_visible),
            num_visible,
            num_hidden,
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
        Ok(Self {
            weights,
            hidden_bias,
            visible_bias,
            num_visible,
            num_hidden,
            velocity: Array2::zeros((num_visible, num_hidden)),
            diagnostics: Diagnostics::default(),
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        })
    }

    /// P(h_j = 1 | v) = sigmoid(b_j + v·W_·j) for a batch of visible rows.
    pub fn hidden_probabilities(&self, v: &Array2<f64>) -> Array2<f64> {
        (v.dot(&self.weights) + &self.hidden_bias).mapv(cd::sigmoid)
    }

    /// P(v_i = 1 | h) = sigmoid(a_i + h·W_i·) for a batch of hidden rows.
    pub fn visible_probabilities(&self, h: &Array2<f64>) -> Array2<f64> {
        (h.dot(&self.weights.t()) + &self.visible_bias).mapv(cd::sigmoid)
    }

    fn gibbs_pass(&mut self, v0: &Array2<f64>, k: usize) -> GibbsSample {
        let k = k.max(1);

        let h_probs_0 = self.hidden_probabilities(v0);
        let mut h_states = cd::sample_binary(&mut self.rng, &h_probs_0);
        let pos_associations = v0.t().dot(&h_probs_0);

        let mut v_probs = v0.to_owned();
        let mut h_probs_new = h_probs_0.clone();
        let mut neg_associations = Array2::zeros(pos_associations.raw_dim());

        for step in 0..k {
            v_probs = self.visible_probabilities(&h_states);
            h_probs_new = self.hidden_probabilities(&v_probs);
            h_states = cd::sample_binary(&mut self.rng, &h_probs_new);
            if step + 1 == k {
                neg_associations = v_probs.t().dot(&h_probs_new);
            }
        }

        GibbsSample {
            associations_delta: pos_associations - neg_associations,
            hidden_bias_delta: &h_probs_0 - &h_probs_new,
            visible_new: v_probs,
            hidden_probs_new: h_probs_new,
        }
    }

    fn free_energy(&self, data: &Array2<f64>) -> f64 {
        let wx_b = data.dot(&self.weights) + &self.hidden_bias;
        let vbias_term = data.dot(&self.visible_bias);
        let hidden_term = wx_b.mapv(|x| (1.0 + x.exp()).ln()).sum_axis(Axis(1));
        (-hidden_term - vbias_term).mean().unwrap_or(0.0)
    }
}

impl CdModel for BernoulliRbm {
    fn name(&self) -> &'static str {
        "bernoulli rbm"
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
        25
    }

    fn before_training(&mut self, data: &Array2<f64>) {
        // Visible bias from the empirical activation rate of each feature,
        // clamped just shy of 1 to keep the logarithm finite.
        if let Some(mean) = data.mean_axis(Axis(0)) {
            self.visible_bias = mean.mapv(|p| (1.0 / (1.0 - p.min(0.99999))).ln());
        }
    }
}

impl RbmUnit for BernoulliRbm {
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
            let v_probs = self.visible_probabilities(&states);
            probs = self.hidden_probabilities(&v_probs);
            states = cd::sample_binary(&mut self.rng, &probs);
        }
        (probs, states)
    }

    fn sample_visible_from_hidden(
        &mut self,
        h: &Array2<f64>,
        gibbs_k: usize,
    ) -> (Array2<f64>, Array2<f64>) {
        let mut probs = self.visible_probabilities(h);
        let mut states = cd::sample_binary(&mut self.rng, &probs);
        for _ in 1..gibbs_k.max(1) {
            let h_probs = self.hidden_probabilities(&states);
            let h_states = cd::sample_binary(&mut self.rng, &h_probs);
            probs = self.visible_probabilities(&h_states);
            states = cd::sample_binary(&mut self.rng, &probs);
        }
        (probs, states)
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
            sigma: None,
            k_visible: None,
            k_hidden: None,
        }
        .write(path)
    }

    fn load_configuration(&mut self, path: &Path) -> Result<()> {
        let record = SavedRbm::read(path)?;
        if record.sigma.is_some() || record.k_visible.is_some() || record.k_hidden.is_some() {
            return Err(RbmError::Persistence(
                "record does not describe a bernoulli unit".into(),
            ));
        }
        self.diagnostics = record.diagnostics();
        self.num_visible = record.num_visible;
        self.num_hidden = record.num_hidden;
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_data() -> Array2<f64> {
        array![
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    #[test]
    fn test_creation_shapes() {
        let rbm = BernoulliRbm::new(10, 5, Some(7));
        assert_eq!(rbm.num_visible, 10);
        assert_eq!(rbm.num_hidden, 5);
        assert_eq!(rbm.weights.shape(), &[10, 5]);
        assert_eq!(rbm.hidden_bias.len(), 5);
        assert_eq!(rbm.visible_bias.len(), 10);
    }

    #[test]
    fn test_with_params_rejects_mismatched_biases() {
        let err = BernoulliRbm::with_params(
            Array2::zeros((4, 2)),
            Array1::zeros(3),
            Array1::zeros(4),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }

    #[test]
    fn test_gibbs_sampling_shapes() {
        let mut rbm = BernoulliRbm::new(4, 2, Some(1));
        let sample = rbm.gibbs_sampling(&toy_data(), 1);

        assert_eq!(sample.associations_delta.shape(), &[4, 2]);
        assert_eq!(sample.hidden_bias_delta.shape(), &[8, 2]);
        assert_eq!(sample.visible_new.shape(), &[8, 4]);
        assert_eq!(sample.hidden_probs_new.shape(), &[8, 2]);
    }

    #[test]
    fn test_probabilities_are_in_unit_interval() {
        let mut rbm = BernoulliRbm::new(4, 3, Some(2));
        let (h_probs, h_states) = rbm.sample_hidden_from_visible(&toy_data(), 1);
        assert!(h_probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(h_states.iter().all(|&s| s == 0.0 || s == 1.0));

        let (v_probs, v_states) = rbm.sample_visible_from_hidden(&h_states, 1);
        assert!(v_probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(v_states.iter().all(|&s| s == 0.0 || s == 1.0));
    }

    #[test]
    fn test_single_step_sampling_matches_direct_probabilities() {
        let data = toy_data();
        let mut rbm = BernoulliRbm::new(4, 3, Some(12));
        let direct = rbm.hidden_probabilities(&data);
        let (probs, _) = rbm.sample_hidden_from_visible(&data, 1);
        assert_eq!(probs, direct);
    }

    #[test]
    fn test_multi_step_sampling_keeps_the_contract() {
        let data = toy_data();
        let mut rbm = BernoulliRbm::new(4, 3, Some(14));

        let (h_probs, h_states) = rbm.sample_hidden_from_visible(&data, 3);
        assert_eq!(h_probs.shape(), &[8, 3]);
        assert!(h_probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(h_states.iter().all(|&s| s == 0.0 || s == 1.0));

        let (v_probs, v_states) = rbm.sample_visible_from_hidden(&h_states, 2);
        assert_eq!(v_probs.shape(), &[8, 4]);
        assert!(v_probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(v_states.iter().all(|&s| s == 0.0 || s == 1.0));
    }

    #[test]
    fn test_free_energy_is_idempotent() {
        let rbm = BernoulliRbm::new(4, 2, Some(3));
        let data = toy_data();
        let first = rbm.average_free_energy(&data);
        let second = rbm.average_free_energy(&data);
        assert_eq!(first, second);
        assert!(first.is_finite());
    }

    #[test]
    fn test_training_reduces_reconstruction_error() {
        let mut rbm = BernoulliRbm::new(4, 2, Some(42));
        let config = TrainConfig::default()
            .max_epochs(50)
            .batch_size(4)
            .learning_rate(0.1)
            .momentum(0.5)
            .gibbs_k(1);

        rbm.train(&toy_data(), None, &config).unwrap();

        let costs = &rbm.diagnostics().costs;
        assert_eq!(costs.len(), 50);
        assert!(costs[49] < costs[0]);
    }

    #[test]
    fn test_training_with_full_batch_runs() {
        let data = toy_data();
        let mut rbm = BernoulliRbm::new(4, 2, Some(5));
        let config = TrainConfig::default().max_epochs(3).batch_size(8);
        rbm.train(&data, None, &config).unwrap();
        assert_eq!(rbm.diagnostics().costs.len(), 3);
    }

    #[test]
    fn test_always_active_feature_keeps_bias_finite() {
        // One column at a constant 1 would make the log-odds init blow up
        // without the clamp.
        let data = array![
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 0.0, 0.0],
        ];
        let mut rbm = BernoulliRbm::new(3, 2, Some(9));
        let config = TrainConfig::default().max_epochs(2).batch_size(2);
        rbm.train(&data, None, &config).unwrap();
        assert!(rbm.visible_bias.iter().all(|b| b.is_finite()));
        assert!(rbm.weights.iter().all(|w| w.is_finite()));
    }

    #[test]
    fn test_batch_size_exceeding_dataset_fails_before_training() {
        let mut rbm = BernoulliRbm::new(4, 2, Some(4));
        let config = TrainConfig::default().batch_size(9);
        let err = rbm.train(&toy_data(), None, &config).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
        assert!(rbm.diagnostics().costs.is_empty());
    }

    #[test]
    fn test_zero_gibbs_k_is_rejected() {
        let mut rbm = BernoulliRbm::new(4, 2, Some(4));
        let config = TrainConfig::default().gibbs_k(0);
        let err = rbm.train(&toy_data(), None, &config).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }

    #[test]
    fn test_cancellation_hook_stops_at_epoch_boundary() {
        let mut rbm = BernoulliRbm::new(4, 2, Some(6));
        let config = TrainConfig::default().max_epochs(100).batch_size(4);
        let mut stop = |epoch: usize| epoch >= 4;
        let mut hooks = TrainHooks {
            display: None,
            stop: Some(&mut stop),
        };
        rbm.train_with_hooks(&toy_data(), None, &config, &mut hooks)
            .unwrap();
        assert_eq!(rbm.diagnostics().costs.len(), 5);
    }

    #[test]
    fn test_display_hook_sees_reconstructions() {
        let mut rbm = BernoulliRbm::new(4, 2, Some(8));
        let config = TrainConfig::default().max_epochs(3).batch_size(4);
        let mut seen = 0usize;
        let mut display = |row: ndarray::ArrayView1<'_, f64>| {
            assert_eq!(row.len(), 4);
            seen += 1;
        };
        let mut hooks = TrainHooks {
            display: Some(&mut display),
            stop: None,
        };
        rbm.train_with_hooks(&toy_data(), None, &config, &mut hooks)
            .unwrap();
        assert_eq!(seen, 3);
    }
}
