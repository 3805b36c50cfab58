//! Multinomial RBM: K-ary categorical visible and hidden units.
//!
//! Each logical unit is a group of K one-hot slots in the expanded weight
//! matrix. Activations are normalized per group with a softmax and states
//! are drawn from the resulting categorical distribution, so exactly one
//! slot per group is active.

use std::path::Path;

use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use crate::data::one_hot_rows;
use crate::{RbmError, Result};

use super::cd::{self, CdModel};
use super::storage::SavedRbm;
use super::unit::{Diagnostics, GibbsSample, RbmUnit, TrainConfig, TrainHooks};

/// Restricted Boltzmann Machine over categorical units.
///
/// `num_visible` and `num_hidden` count logical units; the parameter
/// matrices are expanded by the arities `k_visible` and `k_hidden`, so the
/// weight matrix has shape `(num_visible * k_visible, num_hidden * k_hidden)`.
#[derive(Debug, Clone)]
pub struct MultinomialRbm {
    /// Expanded weight matrix
    pub weights: Array2<f64>,
    /// Hidden bias (num_hidden * k_hidden)
    pub hidden_bias: Array1<f64>,
    /// Visible bias (num_visible * k_visible)
    pub visible_bias: Array1<f64>,
    /// Number of logical visible units
    pub num_visible: usize,
    /// Number of logical hidden units
    pub num_hidden: usize,
    /// Arity of each visible unit
    pub k_visible: usize,
    /// Arity of each hidden unit
    pub k_hidden: usize,
    velocity: Array2<f64>,
    diagnostics: Diagnostics,
    rng: StdRng,
}

/// Normalize each K-slot group of every row with a softmax.
fn softmax_groups(activations: &Array2<f64>, k: usize) -> Array2<f64> {
    let mut out = activations.clone();
    for mut row in out.rows_mut() {
        let groups = row.len() / k;
        for g in 0..groups {
            let mut slot = row.slice_mut(s![g * k..(g + 1) * k]);
            let max = slot.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            slot.mapv_inplace(|x| (x - max).exp());
            let sum = slot.sum();
            slot.mapv_inplace(|x| x / sum);
        }
    }
    out
}

/// Draw one slot per K-slot group from the categorical distribution given by
/// the group's probabilities.
fn sample_categorical(rng: &mut StdRng, probs: &Array2<f64>, k: usize) -> Array2<f64> {
    let mut states = Array2::zeros(probs.raw_dim());
    for (i, row) in probs.rows().into_iter().enumerate() {
        let groups = row.len() / k;
        for g in 0..groups {
            let draw: f64 = rng.gen();
            let mut acc = 0.0;
            let mut chosen = k - 1;
            for j in 0..k {
                acc += row[g * k + j];
                if draw < acc {
                    chosen = j;
                    break;
                }
            }
            states[[i, g * k + chosen]] = 1.0;
        }
    }
    states
}

impl MultinomialRbm {
    /// Create a new unit over `num_visible` categorical visible units of
    /// arity `k_visible` and `num_hidden` hidden units of arity `k_hidden`.
    pub fn new(
        num_visible: usize,
        num_hidden: usize,
        k_visible: usize,
        k_hidden: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        if k_visible < 2 || k_hidden < 2 {
            return Err(RbmError::Configuration(format!(
                "unit arities must be at least 2, got ({}, {})",
                k_visible, k_hidden
            )));
        }
        if num_visible == 0 || num_hidden == 0 {
            return Err(RbmError::Configuration(
                "layer sizes must be at least 1".into(),
            ));
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let shape = (num_visible * k_visible, num_hidden * k_hidden);
        let normal = Normal::new(0.0, 0.01).unwrap();
        let weights = Array2::from_shape_fn(shape, |_| rng.sample(normal));

        Ok(Self {
            weights,
            hidden_bias: Array1::zeros(shape.1),
            visible_bias: Array1::zeros(shape.0),
            num_visible,
            num_hidden,
            k_visible,
            k_hidden,
            velocity: Array2::zeros(shape),
            diagnostics: Diagnostics::default(),
            rng,
        })
    }

    /// Map input rows to the expanded one-hot representation.
    ///
    /// Rows of `num_visible` category indices are one-hot encoded; rows that
    /// already have the expanded width pass through unchanged.
    pub fn encode(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if data.ncols() == self.num_visible * self.k_visible {
            Ok(data.to_owned())
        } else if data.ncols() == self.num_visible {
            one_hot_rows(data, self.k_visible)
        } else {
            Err(RbmError::Configuration(format!(
                "input width {} matches neither {} categorical units nor their {}-slot encoding",
                data.ncols(),
                self.num_visible,
                self.num_visible * self.k_visible
            )))
        }
    }

    /// Per-group hidden probabilities for a batch of expanded visible rows.
    pub fn hidden_probabilities(&self, v: &Array2<f64>) -> Array2<f64> {
        softmax_groups(&(v.dot(&self.weights) + &self.hidden_bias), self.k_hidden)
    }

    /// Per-group visible probabilities for a batch of expanded hidden rows.
    pub fn visible_probabilities(&self, h: &Array2<f64>) -> Array2<f64> {
        softmax_groups(
            &(h.dot(&self.weights.t()) + &self.visible_bias),
            self.k_visible,
        )
    }

    fn gibbs_pass(&mut self, v0: &Array2<f64>, k: usize) -> GibbsSample {
        let k = k.max(1);

        let h_probs_0 = self.hidden_probabilities(v0);
        let mut h_states = sample_categorical(&mut self.rng, &h_probs_0, self.k_hidden);
        let pos_associations = v0.t().dot(&h_probs_0);

        let mut v_states = v0.to_owned();
        let mut h_probs_new = h_probs_0.clone();
        let mut neg_associations = Array2::zeros(pos_associations.raw_dim());

        for step in 0..k {
            let v_probs = self.visible_probabilities(&h_states);
            v_states = sample_categorical(&mut self.rng, &v_probs, self.k_visible);
            h_probs_new = self.hidden_probabilities(&v_states);
            h_states = sample_categorical(&mut self.rng, &h_probs_new, self.k_hidden);
            if step + 1 == k {
                neg_associations = v_states.t().dot(&h_probs_new);
            }
        }

        GibbsSample {
            associations_delta: pos_associations - neg_associations,
            hidden_bias_delta: &h_probs_0 - &h_probs_new,
            visible_new: v_states,
            hidden_probs_new: h_probs_new,
        }
    }

    fn free_energy(&self, data: &Array2<f64>) -> f64 {
        let wx_b = data.dot(&self.weights) + &self.hidden_bias;
        let vbias_term = data.dot(&self.visible_bias);
        // Log-sum-exp over the K slots of each hidden group.
        let mut hidden_term = Array1::zeros(data.nrows());
        for (i, row) in wx_b.rows().into_iter().enumerate() {
            let mut acc = 0.0;
            for g in 0..self.num_hidden {
                let slot = row.slice(s![g * self.k_hidden..(g + 1) * self.k_hidden]);
                let max = slot.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                acc += max + slot.mapv(|x| (x - max).exp()).sum().ln();
            }
            hidden_term[i] = acc;
        }
        (-hidden_term - vbias_term).mean().unwrap_or(0.0)
    }
}

impl CdModel for MultinomialRbm {
    fn name(&self) -> &'static str {
        "multinomial rbm"
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

    fn encode_input(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.encode(data)
    }
}

impl RbmUnit for MultinomialRbm {
    fn num_visible(&self) -> usize {
        self.num_visible * self.k_visible
    }

    fn num_hidden(&self) -> usize {
        self.num_hidden * self.k_hidden
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
        let mut states = sample_categorical(&mut self.rng, &probs, self.k_hidden);
        for _ in 1..gibbs_k.max(1) {
            let v_probs = self.visible_probabilities(&states);
            let v_states = sample_categorical(&mut self.rng, &v_probs, self.k_visible);
            probs = self.hidden_probabilities(&v_states);
            states = sample_categorical(&mut self.rng, &probs, self.k_hidden);
        }
        (probs, states)
    }

    fn sample_visible_from_hidden(
        &mut self,
        h: &Array2<f64>,
        gibbs_k: usize,
    ) -> (Array2<f64>, Array2<f64>) {
        let mut probs = self.visible_probabilities(h);
        let mut states = sample_categorical(&mut self.rng, &probs, self.k_visible);
        for _ in 1..gibbs_k.max(1) {
            let h_probs = self.hidden_probabilities(&states);
            let h_states = sample_categorical(&mut self.rng, &h_probs, self.k_hidden);
            probs = self.visible_probabilities(&h_states);
            states = sample_categorical(&mut self.rng, &probs, self.k_visible);
        }
        (probs, states)
    }

    /// Average free energy of `data`, which may be given either as category
    /// indices or in the expanded one-hot representation. Returns NaN if the
    /// input width matches neither.
    fn average_free_energy(&self, data: &Array2<f64>) -> f64 {
        match self.encode(data) {
            Ok(encoded) => self.free_energy(&encoded),
            Err(_) => f64::NAN,
        }
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
            k_visible: Some(self.k_visible),
            k_hidden: Some(self.k_hidden),
        }
        .write(path)
    }

    fn load_configuration(&mut self, path: &Path) -> Result<()> {
        let record = SavedRbm::read(path)?;
        let (k_visible, k_hidden) = match (record.k_visible, record.k_hidden) {
            (Some(kv), Some(kh)) if kv >= 2 && kh >= 2 => (kv, kh),
            _ => {
                return Err(RbmError::Persistence(
                    "record does not describe a multinomial unit".into(),
                ))
            }
        };
        self.diagnostics = record.diagnostics();
        self.num_visible = record.num_visible;
        self.num_hidden = record.num_hidden;
        self.k_visible = k_visible;
        self.k_hidden = k_hidden;
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
    use approx::assert_relative_eq;
    use ndarray::array;

    // 2 categorical visible units of arity 3, as category indices.
    fn toy_indices() -> Array2<f64> {
        array![
            [0.0, 2.0],
            [0.0, 2.0],
            [1.0, 1.0],
            [1.0, 1.0],
            [2.0, 0.0],
            [2.0, 0.0],
        ]
    }

    #[test]
    fn test_expanded_shapes() {
        let rbm = MultinomialRbm::new(2, 3, 3, 2, Some(1)).unwrap();
        assert_eq!(rbm.weights.shape(), &[6, 6]);
        assert_eq!(rbm.visible_bias.len(), 6);
        assert_eq!(rbm.hidden_bias.len(), 6);
        assert_eq!(rbm.num_visible(), 6);
        assert_eq!(rbm.num_hidden(), 6);
    }

    #[test]
    fn test_degenerate_arity_is_rejected() {
        let err = MultinomialRbm::new(2, 3, 1, 2, None).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
        let err = MultinomialRbm::new(2, 3, 3, 0, None).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }

    #[test]
    fn test_encode_accepts_indices_and_one_hot() {
        let rbm = MultinomialRbm::new(2, 2, 3, 2, Some(2)).unwrap();

        let encoded = rbm.encode(&toy_indices()).unwrap();
        assert_eq!(encoded.shape(), &[6, 6]);
        assert_eq!(encoded.row(0).to_vec(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);

        // Expanded input passes through untouched.
        let again = rbm.encode(&encoded).unwrap();
        assert_eq!(again, encoded);

        let err = rbm.encode(&Array2::zeros((3, 4))).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }

    #[test]
    fn test_group_probabilities_sum_to_one() {
        let rbm = MultinomialRbm::new(2, 2, 3, 2, Some(3)).unwrap();
        let v = rbm.encode(&toy_indices()).unwrap();
        let h_probs = rbm.hidden_probabilities(&v);

        for row in h_probs.rows() {
            for g in 0..2 {
                let group_sum: f64 = row.slice(s![g * 2..(g + 1) * 2]).sum();
                assert_relative_eq!(group_sum, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_sampled_states_are_one_hot_per_group() {
        let mut rbm = MultinomialRbm::new(2, 2, 3, 2, Some(4)).unwrap();
        let v = rbm.encode(&toy_indices()).unwrap();
        let (_, h_states) = rbm.sample_hidden_from_visible(&v, 1);

        for row in h_states.rows() {
            for g in 0..2 {
                let group_sum: f64 = row.slice(s![g * 2..(g + 1) * 2]).sum();
                assert_relative_eq!(group_sum, 1.0);
            }
            assert!(row.iter().all(|&s| s == 0.0 || s == 1.0));
        }

        // Multi-step chains keep the one-hot invariant in both directions.
        let (_, h_states) = rbm.sample_hidden_from_visible(&v, 3);
        let (_, v_states) = rbm.sample_visible_from_hidden(&h_states, 2);
        for row in v_states.rows() {
            for g in 0..2 {
                let group_sum: f64 = row.slice(s![g * 3..(g + 1) * 3]).sum();
                assert_relative_eq!(group_sum, 1.0);
            }
        }
    }

    #[test]
    fn test_training_on_indices_runs() {
        let mut rbm = MultinomialRbm::new(2, 2, 3, 2, Some(5)).unwrap();
        let config = TrainConfig::default()
            .max_epochs(20)
            .batch_size(3)
            .learning_rate(0.05);
        rbm.train(&toy_indices(), None, &config).unwrap();
        assert_eq!(rbm.diagnostics().costs.len(), 20);
        assert!(rbm.weights.iter().all(|w| w.is_finite()));
    }

    #[test]
    fn test_free_energy_on_indices_matches_encoded() {
        let rbm = MultinomialRbm::new(2, 2, 3, 2, Some(6)).unwrap();
        let indices = toy_indices();
        let encoded = rbm.encode(&indices).unwrap();
        assert_relative_eq!(
            rbm.average_free_energy(&indices),
            rbm.average_free_energy(&encoded)
        );
    }
}
