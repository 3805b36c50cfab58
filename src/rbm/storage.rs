//! Persisted model records.

use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{RbmError, Result};

use super::unit::Diagnostics;

/// The on-disk JSON schema of a trained RBM unit.
///
/// `num_visible`/`num_hidden` count logical units; for the multinomial
/// variant the weight matrix is expanded by the unit arities, carried in
/// `k_visible`/`k_hidden`. The Gaussian variant additionally records its
/// fixed dispersion `sigma`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedRbm {
    pub w: Array2<f64>,
    pub h_bias: Array1<f64>,
    pub v_bias: Array1<f64>,
    pub num_visible: usize,
    pub num_hidden: usize,
    #[serde(default)]
    pub costs: Vec<f64>,
    #[serde(default)]
    pub train_free_energies: Vec<f64>,
    #[serde(default)]
    pub validation_free_energies: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_visible: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_hidden: Option<usize>,
}

impl SavedRbm {
    /// Write the record as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read and validate a record written by [`SavedRbm::write`].
    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let record: SavedRbm = serde_json::from_str(&json)?;
        record.validate()?;
        Ok(record)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            costs: self.costs.clone(),
            train_free_energies: self.train_free_energies.clone(),
            validation_free_energies: self.validation_free_energies.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let kv = self.k_visible.unwrap_or(1);
        let kh = self.k_hidden.unwrap_or(1);
        if kv == 0 || kh == 0 {
            return Err(RbmError::Persistence(
                "unit arities must be at least 1".into(),
            ));
        }
        let expected = (self.num_visible * kv, self.num_hidden * kh);
        if self.w.dim() != expected {
            return Err(RbmError::Persistence(format!(
                "weight matrix shape {:?} does not match unit counts {:?}",
                self.w.dim(),
                expected
            )));
        }
        if self.v_bias.len() != expected.0 {
            return Err(RbmError::Persistence(format!(
                "visible bias length {} does not match {} visible units",
                self.v_bias.len(),
                expected.0
            )));
        }
        if self.h_bias.len() != expected.1 {
            return Err(RbmError::Persistence(format!(
                "hidden bias length {} does not match {} hidden units",
                self.h_bias.len(),
                expected.1
            )));
        }
        if let Some(sigma) = self.sigma {
            if sigma <= 0.0 {
                return Err(RbmError::Persistence(format!(
                    "sigma must be positive, got {}",
                    sigma
                )));
            }
        }
        Ok(())
    }
}
