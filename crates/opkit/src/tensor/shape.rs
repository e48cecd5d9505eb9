//! Dimension bookkeeping for engine shapes.

use crate::error::{OpError, OpResult};

/// Computes the element count implied by `dims`.
///
/// An empty dimension list describes a scalar and yields 1. Negative
/// dimensions and products that overflow `usize` are rejected.
pub fn element_count(dims: &[i64]) -> OpResult<usize> {
    dims.iter().try_fold(1usize, |count, &dim| {
        let dim = usize::try_from(dim)
            .map_err(|_| OpError::shape(format!("negative dimension {dim} in shape {dims:?}")))?;
        count
            .checked_mul(dim)
            .ok_or_else(|| OpError::shape(format!("element count of shape {dims:?} overflows")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_elements() {
        assert_eq!(element_count(&[2, 3]).unwrap(), 6);
        assert_eq!(element_count(&[]).unwrap(), 1);
        assert_eq!(element_count(&[4, 0]).unwrap(), 0);
    }

    #[test]
    fn rejects_negative_and_overflowing_dims() {
        assert!(element_count(&[2, -1]).unwrap_err().is_shape_violation());
        assert!(element_count(&[i64::MAX, i64::MAX]).unwrap_err().is_shape_violation());
    }
}
