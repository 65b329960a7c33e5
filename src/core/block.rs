//! Distributed dense block of complex column vectors.
//!
//! A `BlockVector` is the unit every Krylov operation works on: unknowns, right-hand sides
//! and each block of the Arnoldi basis. Storage is column-major over the locally owned rows;
//! all global quantities (inner products, norms) reduce through the row map's communicator.

use crate::core::wrappers::{axpy_local, dot_local, norm_sqr_local};
use crate::core::C_ZERO;
use crate::error::KError;
use crate::parallel::{reduce_sum_c64, RowMap};
use faer::{c64, Mat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct BlockVector {
    map: Arc<RowMap>,
    ncols: usize,
    data: Vec<c64>,
}

impl BlockVector {
    /// Zero block with `ncols` columns over `map`.
    pub fn zeros(map: Arc<RowMap>, ncols: usize) -> Self {
        let data = vec![C_ZERO; map.local_len() * ncols];
        Self { map, ncols, data }
    }

    /// Build from `f(global_row, col)` evaluated on the locally owned rows.
    pub fn from_fn(map: Arc<RowMap>, ncols: usize, f: impl Fn(usize, usize) -> c64) -> Self {
        let (n, off) = (map.local_len(), map.offset());
        let mut data = Vec::with_capacity(n * ncols);
        for j in 0..ncols {
            data.extend((0..n).map(|i| f(off + i, j)));
        }
        Self { map, ncols, data }
    }

    pub fn map(&self) -> &Arc<RowMap> { &self.map }
    pub fn ncols(&self) -> usize { self.ncols }
    pub fn local_rows(&self) -> usize { self.map.local_len() }
    pub fn global_rows(&self) -> usize { self.map.global_len() }

    pub fn col(&self, j: usize) -> &[c64] {
        let n = self.local_rows();
        &self.data[j * n..(j + 1) * n]
    }

    pub fn col_mut(&mut self, j: usize) -> &mut [c64] {
        let n = self.local_rows();
        &mut self.data[j * n..(j + 1) * n]
    }

    /// Local storage, column-major.
    pub fn as_slice(&self) -> &[c64] { &self.data }
    pub fn as_mut_slice(&mut self) -> &mut [c64] { &mut self.data }

    /// Copy of columns `start..start + count`.
    pub fn columns(&self, start: usize, count: usize) -> BlockVector {
        let n = self.local_rows();
        Self {
            map: Arc::clone(&self.map),
            ncols: count,
            data: self.data[start * n..(start + count) * n].to_vec(),
        }
    }

    /// Overwrite columns `start..start + src.ncols()` with `src`.
    pub fn set_columns(&mut self, start: usize, src: &BlockVector) {
        let n = self.local_rows();
        self.data[start * n..(start + src.ncols) * n].copy_from_slice(&src.data);
    }

    /// Block with `extra` zero columns appended.
    pub fn widened(&self, extra: usize) -> BlockVector {
        let mut data = self.data.clone();
        data.resize(data.len() + extra * self.local_rows(), C_ZERO);
        Self { map: Arc::clone(&self.map), ncols: self.ncols + extra, data }
    }

    pub fn fill(&mut self, value: c64) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Gram matrix `selfᴴ · other`, reduced over all processes.
    pub fn gram(&self, other: &BlockVector) -> Mat<c64> {
        let (p, q) = (self.ncols, other.ncols);
        let mut partial: Vec<c64> = Vec::with_capacity(p * q);
        for j in 0..q {
            for i in 0..p {
                partial.push(dot_local(self.col(i), other.col(j)));
            }
        }
        reduce_sum_c64(self.map.comm(), &mut partial);
        Mat::from_fn(p, q, |i, j| partial[j * p + i])
    }

    /// Euclidean norm of every column.
    pub fn column_norms(&self) -> Vec<f64> {
        let mut sq: Vec<f64> = (0..self.ncols).map(|j| norm_sqr_local(self.col(j))).collect();
        self.map.comm().reduce_sum(&mut sq);
        sq.into_iter().map(f64::sqrt).collect()
    }

    pub fn col_norm(&self, j: usize) -> f64 {
        self.map.comm().all_reduce(norm_sqr_local(self.col(j))).sqrt()
    }

    pub fn scale(&mut self, alpha: c64) {
        self.data.iter_mut().for_each(|v| *v *= alpha);
    }

    pub fn scale_col(&mut self, j: usize, alpha: c64) {
        self.col_mut(j).iter_mut().for_each(|v| *v *= alpha);
    }

    /// self ← self + alpha · x (whole block).
    pub fn axpy(&mut self, alpha: c64, x: &BlockVector) -> Result<(), KError> {
        self.check_same_shape(x)?;
        axpy_local(&mut self.data, alpha, &x.data);
        Ok(())
    }

    /// self ← self + alpha · a · c, with `c` of size `a.ncols() × self.ncols()`.
    pub fn add_product(&mut self, alpha: c64, a: &BlockVector, c: &Mat<c64>) -> Result<(), KError> {
        if c.nrows() != a.ncols || c.ncols() != self.ncols || a.local_rows() != self.local_rows() {
            return Err(KError::ShapeMismatch(format!(
                "block update: {}x{} += ({} rows x {}) * {}x{}",
                self.local_rows(), self.ncols, a.local_rows(), a.ncols, c.nrows(), c.ncols()
            )));
        }
        for j in 0..self.ncols {
            for l in 0..a.ncols {
                let coef = alpha * c[(l, j)];
                if coef != C_ZERO {
                    axpy_local(self.col_mut(j), coef, a.col(l));
                }
            }
        }
        Ok(())
    }

    /// Fill with uniform values in `[-1, 1) + i[-1, 1)`.
    ///
    /// Column `j` uses its own generator seeded with `seed + j` and drawn over the global row
    /// range, so the values are independent of how rows are distributed.
    pub fn randomize(&mut self, seed: u64) {
        let (n, off) = (self.local_rows(), self.map.offset());
        for j in 0..self.ncols {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(j as u64));
            for _ in 0..off {
                let _: (f64, f64) = (rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            }
            let col = &mut self.data[j * n..(j + 1) * n];
            for v in col.iter_mut() {
                let re = rng.gen_range(-1.0..1.0);
                let im = rng.gen_range(-1.0..1.0);
                *v = c64::new(re, im);
            }
        }
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.re.is_finite() && v.im.is_finite())
    }

    pub(crate) fn check_same_shape(&self, other: &BlockVector) -> Result<(), KError> {
        if self.ncols != other.ncols || !self.map.is_compatible(&other.map) {
            return Err(KError::ShapeMismatch(format!(
                "blocks of {}x{} and {}x{}",
                self.global_rows(), self.ncols, other.global_rows(), other.ncols
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn map(n: usize) -> Arc<RowMap> {
        Arc::new(RowMap::serial(n))
    }

    #[test]
    fn gram_is_conjugate_linear_in_first_argument() {
        let m = map(2);
        let x = BlockVector::from_fn(m.clone(), 1, |i, _| c64::new(i as f64, 1.0));
        let y = BlockVector::from_fn(m, 1, |_, _| c64::new(0.0, 1.0));
        // xᴴy = conj(0+i)·i + conj(1+i)·i = 1 + (1 + i)
        let g = x.gram(&y);
        assert_abs_diff_eq!(g[(0, 0)].re, 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(g[(0, 0)].im, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn add_product_matches_manual_combination() {
        let m = map(3);
        let a = BlockVector::from_fn(m.clone(), 2, |i, j| c64::new((i + j) as f64, 0.0));
        let mut y = BlockVector::zeros(m, 1);
        let c = Mat::from_fn(2, 1, |l, _| c64::new(1.0 + l as f64, 0.0));
        y.add_product(c64::new(1.0, 0.0), &a, &c).unwrap();
        for i in 0..3 {
            let expected = (i as f64) * 1.0 + (i as f64 + 1.0) * 2.0;
            assert_abs_diff_eq!(y.col(0)[i].re, expected, epsilon = 1e-14);
        }
    }

    #[test]
    fn randomize_is_seeded_per_column() {
        let mut a = BlockVector::zeros(map(5), 2);
        let mut b = BlockVector::zeros(map(5), 2);
        a.randomize(11);
        b.randomize(11);
        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a.col(0), a.col(1));
        // column 1 of seed 11 is column 0 of seed 12
        let mut c = BlockVector::zeros(map(5), 1);
        c.randomize(12);
        assert_eq!(a.col(1), c.col(0));
    }
}
