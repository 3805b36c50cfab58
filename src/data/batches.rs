//! Mini-batch partitioning of a training set.

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::{RbmError, Result};

/// What to do with the final rows when the dataset size is not a multiple of
/// the batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// The final partial group is retained as a shorter batch.
    KeepRemainder,
    /// The final partial group is discarded.
    DropRemainder,
}

/// Partition `data` into consecutive groups of `batch_size` rows, in the
/// original row order.
///
/// Each batch is an owned copy of its rows. `batch_size` must be at least 1
/// and must not exceed the number of rows.
pub fn generate_batches(
    data: &Array2<f64>,
    batch_size: usize,
    policy: BatchPolicy,
) -> Result<Vec<Array2<f64>>> {
    let n = data.nrows();
    if batch_size == 0 {
        return Err(RbmError::Configuration(
            "batch size must be at least 1".into(),
        ));
    }
    if batch_size > n {
        return Err(RbmError::Configuration(format!(
            "batch size {} exceeds dataset size {}",
            batch_size, n
        )));
    }

    let mut batches = Vec::with_capacity(n / batch_size + 1);
    let mut start = 0;
    while start < n {
        let end = usize::min(start + batch_size, n);
        if end - start < batch_size && policy == BatchPolicy::DropRemainder {
            break;
        }
        batches.push(data.slice(s![start..end, ..]).to_owned());
        start = end;
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn rows(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 3), |(i, j)| (i * 3 + j) as f64)
    }

    #[test]
    fn test_even_partition_covers_all_rows_in_order() {
        let data = rows(12);
        let batches = generate_batches(&data, 4, BatchPolicy::KeepRemainder).unwrap();

        assert_eq!(batches.len(), 3);
        for batch in &batches {
            assert_eq!(batch.nrows(), 4);
        }

        let mut seen = 0;
        for batch in &batches {
            for row in batch.rows() {
                assert_eq!(row[0], (seen * 3) as f64);
                seen += 1;
            }
        }
        assert_eq!(seen, 12);
    }

    #[test]
    fn test_keep_remainder_retains_short_batch() {
        let data = rows(10);
        let batches = generate_batches(&data, 4, BatchPolicy::KeepRemainder).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].nrows(), 2);
    }

    #[test]
    fn test_drop_remainder_discards_short_batch() {
        let data = rows(10);
        let batches = generate_batches(&data, 4, BatchPolicy::DropRemainder).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.nrows() == 4));
    }

    #[test]
    fn test_batch_size_equal_to_dataset_yields_one_batch() {
        let data = rows(8);
        let batches = generate_batches(&data, 8, BatchPolicy::KeepRemainder).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], data);
    }

    #[test]
    fn test_batch_size_larger_than_dataset_is_rejected() {
        let data = array![[0.0, 1.0], [1.0, 0.0]];
        let err = generate_batches(&data, 3, BatchPolicy::KeepRemainder).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let data = array![[0.0, 1.0], [1.0, 0.0]];
        let err = generate_batches(&data, 0, BatchPolicy::KeepRemainder).unwrap_err();
        assert!(matches!(err, RbmError::Configuration(_)));
    }
}
