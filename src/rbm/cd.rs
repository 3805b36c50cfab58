//! The Contrastive Divergence training engine shared by all RBM variants.
//!
//! Variants plug in their activation and sampling rules through [`CdModel`];
//! the epoch/batch loop, momentum update, schedules and diagnostics live here.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;

use super::unit::{Diagnostics, GibbsSample, TrainConfig, TrainHooks};
use crate::data::generate_batches;
use crate::train::{LearningRateSchedule, MomentumSchedule};
use crate::Result;

/// Internal hooks a variant provides to the shared CD-k loop.
pub(crate) trait CdModel {
    fn name(&self) -> &'static str;

    fn gibbs(&mut self, v0: &Array2<f64>, k: usize) -> GibbsSample;

    fn weights_mut(&mut self) -> &mut Array2<f64>;
    fn hidden_bias_mut(&mut self) -> &mut Array1<f64>;
    fn visible_bias_mut(&mut self) -> &mut Array1<f64>;
    fn velocity_mut(&mut self) -> &mut Array2<f64>;
    fn diagnostics_mut(&mut self) -> &mut Diagnostics;
    fn rng_mut(&mut self) -> &mut StdRng;

    /// Average free energy of a batch already in the unit's representation.
    fn batch_free_energy(&self, data: &Array2<f64>) -> f64;

    /// How many epochs between free-energy diagnostics.
    fn free_energy_interval(&self) -> usize;

    /// Map raw input rows to the representation the unit samples in.
    fn encode_input(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(data.to_owned())
    }

    /// One-time setup from the training set before the first epoch.
    fn before_training(&mut self, _data: &Array2<f64>) {}

    /// Scaling applied to the visible-bias gradient (1 for binary units,
    /// 1/sigma^2 for Gaussian visible units).
    fn visible_bias_scale(&self) -> f64 {
        1.0
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Threshold a matrix of Bernoulli probabilities into 0/1 states.
pub(crate) fn sample_binary(rng: &mut StdRng, probs: &Array2<f64>) -> Array2<f64> {
    probs.mapv(|p| if rng.gen::<f64>() < p { 1.0 } else { 0.0 })
}

/// Run the CD-k training loop on `model`.
pub(crate) fn train<M: CdModel>(
    model: &mut M,
    data: &Array2<f64>,
    validation: Option<&Array2<f64>>,
    config: &TrainConfig,
    hooks: &mut TrainHooks<'_>,
) -> Result<()> {
    config.validate(data.nrows())?;

    let data = model.encode_input(data)?;
    let validation = match validation {
        Some(v) => Some(model.encode_input(v)?),
        None => None,
    };

    model.before_training(&data);

    let batches = generate_batches(&data, config.batch_size, config.batch_policy)?;
    let mut rate_schedule = LearningRateSchedule::new(config.learning_rate, config.decay)?;
    let mut momentum_schedule = MomentumSchedule::new(config.momentum, config.max_epochs);

    log::info!(
        "training {} with CD-{} for {} epochs on {} samples ({} batches)",
        model.name(),
        config.gibbs_k,
        config.max_epochs,
        data.nrows(),
        batches.len()
    );

    for epoch in 0..config.max_epochs {
        let alpha = rate_schedule.update();
        let momentum = momentum_schedule.update();

        let mut total_error = 0.0;
        let mut last_visible: Option<Array2<f64>> = None;

        for batch in &batches {
            let sample = model.gibbs(batch, config.gibbs_k);
            let batch_len = batch.nrows() as f64;

            // Classical momentum: the applied delta becomes the new velocity.
            let velocity = model.velocity_mut().clone();
            let delta_w =
                alpha * (&sample.associations_delta / batch_len) + momentum * &velocity;
            *model.weights_mut() += &delta_w;
            *model.velocity_mut() = delta_w;

            let h_delta = sample
                .hidden_bias_delta
                .mean_axis(Axis(0))
                .expect("batch is non-empty");
            *model.hidden_bias_mut() += &(alpha * h_delta);

            let scale = model.visible_bias_scale();
            let v_delta = (batch - &sample.visible_new)
                .mean_axis(Axis(0))
                .expect("batch is non-empty");
            *model.visible_bias_mut() += &(alpha * scale * v_delta);

            total_error += (batch - &sample.visible_new).mapv(|x| x * x).sum() / batch_len;
            last_visible = Some(sample.visible_new);
        }

        log::debug!("epoch {}: reconstruction error {:.6}", epoch, total_error);
        if epoch % 10 == 0 || epoch + 1 == config.max_epochs {
            log::info!(
                "epoch {}/{}: reconstruction error {:.6}",
                epoch + 1,
                config.max_epochs,
                total_error
            );
        }

        if epoch > 0 && epoch % model.free_energy_interval() == 0 {
            let fe = model.batch_free_energy(&batches[0]);
            model.diagnostics_mut().train_free_energies.push(fe);
            if let Some(valid) = &validation {
                let fe = model.batch_free_energy(valid);
                model.diagnostics_mut().validation_free_energies.push(fe);
            }
        }
        model.diagnostics_mut().costs.push(total_error);

        if let Some(display) = hooks.display.as_mut() {
            if let Some(visible) = &last_visible {
                let row = model.rng_mut().gen_range(0..visible.nrows());
                display(visible.row(row));
            }
        }
        if let Some(stop) = hooks.stop.as_mut() {
            if stop(epoch) {
                log::info!("training of {} stopped at epoch {}", model.name(), epoch);
                break;
            }
        }
    }

    Ok(())
}
