//! One-hot encodings for labels and categorical units.

use ndarray::Array2;

use crate::{RbmError, Result};

/// Encode a label vector as a one-hot matrix of shape `(labels.len(), n_classes)`.
pub fn one_hot(labels: &[usize], n_classes: usize) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((labels.len(), n_classes));
    for (i, &label) in labels.iter().enumerate() {
        if label >= n_classes {
            return Err(RbmError::Configuration(format!(
                "label {} at row {} is not below the class count {}",
                label, i, n_classes
            )));
        }
        out[[i, label]] = 1.0;
    }
    Ok(out)
}

/// Expand a matrix of category indices into one-hot groups of `k` slots.
///
/// Every entry must be an integral value in `0..k`. A `(n, units)` input
/// becomes a `(n, units * k)` output where each unit occupies `k` consecutive
/// columns with exactly one set to 1.
pub fn one_hot_rows(data: &Array2<f64>, k: usize) -> Result<Array2<f64>> {
    let (n, units) = data.dim();
    let mut out = Array2::zeros((n, units * k));
    for ((i, j), &value) in data.indexed_iter() {
        if value < 0.0 || value.fract() != 0.0 || value as usize >= k {
            return Err(RbmError::Configuration(format!(
                "entry {} at ({}, {}) is not a category index below {}",
                value, i, j, k
            )));
        }
        out[[i, j * k + value as usize]] = 1.0;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_one_hot_labels() {
        let encoded = one_hot(&[0, 2, 1], 3).unwrap();
        assert_eq!(
            encoded,
            array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]]
        );
    }

    #[test]
    fn test_one_hot_rejects_out_of_range_label() {
        let err = one_hot(&[0, 3], 3).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }

    #[test]
    fn test_one_hot_rows_expands_groups() {
        let data = array![[0.0, 2.0], [1.0, 1.0]];
        let encoded = one_hot_rows(&data, 3).unwrap();
        assert_eq!(
            encoded,
            array![
                [1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 0.0, 1.0, 0.0]
            ]
        );
    }

    #[test]
    fn test_one_hot_rows_rejects_fractional_entry() {
        let data = array![[0.5]];
        let err = one_hot_rows(&data, 2).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }
}
