//! Local kernels and faer wrappers.
//!
//! This module provides the per-process building blocks the distributed block operations are
//! made of (conjugated dot products, squared norms, axpy), with optional Rayon parallelism, and
//! implements [`Operator`] for dense `faer::Mat<c64>` so small problems can be solved without
//! assembling a sparse matrix.
//!
//! # References
//! - [faer crate documentation](https://docs.rs/faer)

use crate::core::block::BlockVector;
use crate::core::traits::Operator;
use crate::core::C_ZERO;
use crate::error::KError;
use faer::{c64, Mat};

/// Local part of `xᴴ y`.
///
/// If the `rayon` feature is enabled, uses parallel iterators for performance.
pub fn dot_local(x: &[c64], y: &[c64]) -> c64 {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter()
            .zip(y.par_iter())
            .map(|(xi, yi)| xi.conj() * yi)
            .reduce(|| C_ZERO, |acc, v| acc + v)
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .zip(y.iter())
            .map(|(xi, yi)| xi.conj() * yi)
            .fold(C_ZERO, |acc, v| acc + v)
    }
}

/// Local part of `‖x‖₂²`.
pub fn norm_sqr_local(x: &[c64]) -> f64 {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        x.par_iter().map(|xi| xi.norm_sqr()).sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter().map(|xi| xi.norm_sqr()).sum()
    }
}

/// y ← y + alpha · x.
pub fn axpy_local(y: &mut [c64], alpha: c64, x: &[c64]) {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        y.par_iter_mut().zip(x.par_iter()).for_each(|(yi, xi)| *yi += alpha * xi);
    }
    #[cfg(not(feature = "rayon"))]
    {
        y.iter_mut().zip(x.iter()).for_each(|(yi, xi)| *yi += alpha * xi);
    }
}

/// Implements block operator application for a dense `faer::Mat`.
///
/// Dense operators are single-process only: the whole matrix and every row of the block must
/// be local.
impl Operator for Mat<c64> {
    fn nrows(&self) -> usize {
        Mat::nrows(self)
    }
    fn ncols(&self) -> usize {
        Mat::ncols(self)
    }
    fn apply(&self, x: &BlockVector, y: &mut BlockVector) -> Result<(), KError> {
        if x.map().comm().size() != 1 {
            return Err(KError::Unsupported("dense operators require a single process"));
        }
        if x.global_rows() != Mat::ncols(self) || y.global_rows() != Mat::nrows(self) || x.ncols() != y.ncols() {
            return Err(KError::ShapeMismatch(format!(
                "dense {}x{} applied to {}x{} into {}x{}",
                Mat::nrows(self), Mat::ncols(self), x.global_rows(), x.ncols(), y.global_rows(), y.ncols()
            )));
        }
        for j in 0..x.ncols() {
            let xj = x.col(j);
            let yj = y.col_mut(j);
            for (i, yi) in yj.iter_mut().enumerate() {
                *yi = (0..xj.len()).map(|k| self[(i, k)] * xj[k]).sum();
            }
        }
        Ok(())
    }
    fn diagonal(&self) -> Option<Vec<c64>> {
        let n = Mat::nrows(self).min(Mat::ncols(self));
        Some((0..n).map(|i| self[(i, i)]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::RowMap;
    use std::sync::Arc;

    #[test]
    fn dense_apply_two_columns() {
        let a = Mat::from_fn(2, 2, |i, j| c64::new((i * 2 + j) as f64, 0.0));
        let map = Arc::new(RowMap::serial(2));
        let x = BlockVector::from_fn(map.clone(), 2, |i, j| if i == j { c64::new(1.0, 0.0) } else { C_ZERO });
        let mut y = BlockVector::zeros(map, 2);
        a.apply(&x, &mut y).unwrap();
        // identity input returns the columns of A
        assert_eq!(y.col(0), &[c64::new(0.0, 0.0), c64::new(2.0, 0.0)]);
        assert_eq!(y.col(1), &[c64::new(1.0, 0.0), c64::new(3.0, 0.0)]);
    }

    #[test]
    fn dot_conjugates_left() {
        let x = [c64::new(0.0, 1.0)];
        let y = [c64::new(0.0, 1.0)];
        assert_eq!(dot_local(&x, &y), c64::new(1.0, 0.0));
        assert_eq!(norm_sqr_local(&x), 1.0);
    }
}
