//! Per-epoch learning-rate and momentum schedules.

use serde::{Deserialize, Serialize};

use crate::{RbmError, Result};

/// How the learning rate evolves across epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayRule {
    /// The initial rate, unchanged.
    Constant,
    /// `rate * (1 - epoch / max_epochs)`, decaying toward zero.
    Linear { max_epochs: usize },
    /// `rate * factor^epoch` for a factor in (0, 1).
    Exponential { factor: f64 },
}

/// Stateful per-epoch learning-rate generator.
///
/// `update` is called once at the start of every epoch and returns the rate
/// for that epoch as a pure function of the internal epoch counter.
#[derive(Debug, Clone)]
pub struct LearningRateSchedule {
    rate: f64,
    rule: DecayRule,
    epoch: usize,
}

impl LearningRateSchedule {
    pub fn new(rate: f64, rule: DecayRule) -> Result<Self> {
        if rate <= 0.0 {
            return Err(RbmError::Configuration(format!(
                "learning rate must be positive, got {}",
                rate
            )));
        }
        match rule {
            DecayRule::Linear { max_epochs } if max_epochs == 0 => {
                return Err(RbmError::Configuration(
                    "linear decay requires at least one epoch".into(),
                ));
            }
            DecayRule::Exponential { factor } if factor <= 0.0 || factor >= 1.0 => {
                return Err(RbmError::Configuration(format!(
                    "exponential decay factor must be in (0, 1), got {}",
                    factor
                )));
            }
            _ => {}
        }
        Ok(Self {
            rate,
            rule,
            epoch: 0,
        })
    }

    /// The learning rate for the current epoch. Never negative.
    pub fn update(&mut self) -> f64 {
        let rate = match self.rule {
            DecayRule::Constant => self.rate,
            DecayRule::Linear { max_epochs } => {
                (self.rate * (1.0 - self.epoch as f64 / max_epochs as f64)).max(0.0)
            }
            DecayRule::Exponential { factor } => self.rate * factor.powi(self.epoch as i32),
        };
        self.epoch += 1;
        rate
    }
}

/// Fixed-rule momentum schedule.
///
/// Starting from `momentum`, steps up by 0.01 every
/// `floor(max_epochs / ((0.9 - momentum) / 0.01)) + 1` epochs, clamped at the
/// conventional 0.9 ceiling so very long runs cannot overshoot it.
#[derive(Debug, Clone)]
pub struct MomentumSchedule {
    momentum: f64,
    interval: usize,
    epoch: usize,
}

const MOMENTUM_CAP: f64 = 0.9;
const MOMENTUM_STEP: f64 = 0.01;

impl MomentumSchedule {
    pub fn new(momentum: f64, max_epochs: usize) -> Self {
        let interval = if momentum >= MOMENTUM_CAP {
            usize::MAX
        } else {
            (max_epochs as f64 / ((MOMENTUM_CAP - momentum) / MOMENTUM_STEP)).floor() as usize + 1
        };
        Self {
            momentum,
            interval,
            epoch: 0,
        }
    }

    /// The momentum for the current epoch.
    pub fn update(&mut self) -> f64 {
        if self.epoch > 0 && self.epoch % self.interval == 0 {
            self.momentum = (self.momentum + MOMENTUM_STEP).min(MOMENTUM_CAP);
        }
        self.epoch += 1;
        self.momentum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_rate_never_changes() {
        let mut schedule = LearningRateSchedule::new(0.1, DecayRule::Constant).unwrap();
        for _ in 0..20 {
            assert_relative_eq!(schedule.update(), 0.1);
        }
    }

    #[test]
    fn test_linear_decay_bounds() {
        let mut schedule =
            LearningRateSchedule::new(0.1, DecayRule::Linear { max_epochs: 10 }).unwrap();
        let rates: Vec<f64> = (0..10).map(|_| schedule.update()).collect();

        assert_relative_eq!(rates[0], 0.1);
        assert!(rates[9] <= 0.01 + 1e-12);
        assert!(rates.windows(2).all(|w| w[1] < w[0]));
        assert!(rates.iter().all(|&r| r >= 0.0));
        // Past max_epochs the rate stays clamped at zero.
        assert_relative_eq!(schedule.update(), 0.0);
        assert!(schedule.update() >= 0.0);
    }

    #[test]
    fn test_exponential_decay() {
        let mut schedule =
            LearningRateSchedule::new(0.1, DecayRule::Exponential { factor: 0.5 }).unwrap();
        assert_relative_eq!(schedule.update(), 0.1);
        assert_relative_eq!(schedule.update(), 0.05);
        assert_relative_eq!(schedule.update(), 0.025);
    }

    #[test]
    fn test_invalid_exponential_factor_is_rejected() {
        assert!(LearningRateSchedule::new(0.1, DecayRule::Exponential { factor: 1.5 }).is_err());
        assert!(LearningRateSchedule::new(0.1, DecayRule::Exponential { factor: 0.0 }).is_err());
    }

    #[test]
    fn test_non_positive_rate_is_rejected() {
        assert!(LearningRateSchedule::new(0.0, DecayRule::Constant).is_err());
    }

    #[test]
    fn test_momentum_steps_at_documented_interval() {
        // max_epochs = 50, momentum = 0.5: interval = floor(50 / 40) + 1 = 2.
        let mut schedule = MomentumSchedule::new(0.5, 50);
        assert_relative_eq!(schedule.update(), 0.5); // epoch 0
        assert_relative_eq!(schedule.update(), 0.5); // epoch 1
        assert_relative_eq!(schedule.update(), 0.51); // epoch 2
        assert_relative_eq!(schedule.update(), 0.51); // epoch 3
        assert_relative_eq!(schedule.update(), 0.52); // epoch 4
    }

    #[test]
    fn test_momentum_is_capped() {
        let mut schedule = MomentumSchedule::new(0.89, 1000);
        let last = (0..5000).map(|_| schedule.update()).fold(0.0, f64::max);
        assert!(last <= 0.9 + 1e-12);
    }

    #[test]
    fn test_momentum_at_cap_never_moves() {
        let mut schedule = MomentumSchedule::new(0.9, 100);
        for _ in 0..500 {
            assert_relative_eq!(schedule.update(), 0.9);
        }
    }
}
