//! Block Arnoldi process with block Gram–Schmidt and DGKS re-orthogonalization.
//!
//! The process does not apply the operator itself: the caller forms `W = A·Z_i` (with
//! whatever preconditioning it wants) and hands `W` to [`BlockArnoldi::extend`], which
//! orthogonalizes it against the basis, orthonormalizes it internally, appends it as the next
//! basis block and returns the matching block column of the Hessenberg matrix.
//!
//! Columns that vanish under orthogonalization are replaced by seeded random directions
//! orthogonal to the basis, with zero Hessenberg entries. Once no such direction exists the
//! basis spans the whole space and the step is reported as exhausted.
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, 2nd Edition. SIAM. §6.12

use crate::core::block::BlockVector;
use crate::core::{C_ONE, C_ZERO};
use crate::error::KError;
use faer::{c64, Mat};
use std::f64::consts::FRAC_1_SQRT_2;

/// Re-orthogonalize when a column keeps less than this fraction of its norm.
const DGKS: f64 = FRAC_1_SQRT_2;
/// Breakdown threshold in units of machine epsilon, relative to the column's norm before
/// orthogonalization.
const BREAKDOWN_FACTOR: f64 = 100.0;

/// How the last orthonormalization went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// Every column kept a healthy norm.
    Full,
    /// This many columns broke down and were replaced by random directions.
    Deflated(usize),
    /// Some column broke down and the basis already spans the space; no block was appended.
    Exhausted { column: usize },
}

/// One Arnoldi step: the new Hessenberg block column and what happened to the block.
#[derive(Debug)]
pub struct ArnoldiStep {
    /// `(i + 2)·s × s`; the trailing `s × s` block is upper triangular.
    pub h: Mat<c64>,
    pub status: StepStatus,
}

pub struct BlockArnoldi {
    block_size: usize,
    basis: Vec<BlockVector>,
    seed: u64,
    draws: u64,
}

impl BlockArnoldi {
    /// Empty process for blocks of `block_size` columns; `capacity` basis blocks are reserved.
    pub fn new(block_size: usize, capacity: usize, seed: u64) -> Self {
        Self {
            block_size,
            basis: Vec::with_capacity(capacity + 1),
            seed,
            draws: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn basis(&self) -> &[BlockVector] {
        &self.basis
    }

    /// Latest basis block `V_i`.
    pub fn last(&self) -> Option<&BlockVector> {
        self.basis.last()
    }

    /// Reset the basis and orthonormalize `r0` into `V_0 = r0 · Z⁻¹`; returns `Z` (`s × s`,
    /// upper triangular).
    pub fn start(&mut self, r0: &BlockVector) -> Result<(Mat<c64>, StepStatus), KError> {
        if r0.ncols() != self.block_size {
            return Err(KError::ShapeMismatch(format!(
                "starting block has {} columns, block size is {}",
                r0.ncols(),
                self.block_size
            )));
        }
        self.basis.clear();
        let mut w = r0.clone();
        let mut none = Mat::<c64>::zeros(0, self.block_size);
        let (z, status) = self.orthonormalize(&mut w, &mut none)?;
        if !matches!(status, StepStatus::Exhausted { .. }) {
            self.basis.push(w);
        }
        Ok((z, status))
    }

    /// Orthogonalize `w` (typically `A·Z_i`) against the basis and append it as `V_{i+1}`.
    pub fn extend(&mut self, mut w: BlockVector) -> Result<ArnoldiStep, KError> {
        let s = self.block_size;
        let nb = self.basis.len();
        if nb == 0 {
            return Err(KError::SolveError("Arnoldi extended before start".into()));
        }
        if w.ncols() != s {
            return Err(KError::ShapeMismatch(format!("block of {} columns, expected {s}", w.ncols())));
        }
        let mut coeffs = Mat::<c64>::zeros(nb * s, s);
        let (r, status) = self.orthonormalize(&mut w, &mut coeffs)?;
        let h = Mat::from_fn((nb + 1) * s, s, |i, j| if i < nb * s { coeffs[(i, j)] } else { r[(i - nb * s, j)] });
        if !matches!(status, StepStatus::Exhausted { .. }) {
            self.basis.push(w);
        }
        Ok(ArnoldiStep { h, status })
    }

    /// Largest `‖V_iᴴ V_j − δ_ij I‖_F` over all pairs of basis blocks.
    pub fn orthogonality_error(&self) -> f64 {
        let mut worst = 0.0f64;
        for (i, vi) in self.basis.iter().enumerate() {
            for vj in &self.basis[i..] {
                let g = vi.gram(vj);
                let same = std::ptr::eq(vi, vj);
                let mut err = 0.0;
                for r in 0..g.nrows() {
                    for c in 0..g.ncols() {
                        let target = if same && r == c { C_ONE } else { C_ZERO };
                        err += (g[(r, c)] - target).norm_sqr();
                    }
                }
                worst = worst.max(err.sqrt());
            }
        }
        worst
    }

    /// Project `w` off the whole basis, accumulating coefficients into `coeffs`.
    fn project_basis(&self, w: &mut BlockVector, coeffs: &mut Mat<c64>) -> Result<(), KError> {
        let s = self.block_size;
        for (b, v) in self.basis.iter().enumerate() {
            let c = v.gram(w);
            w.add_product(-C_ONE, v, &c)?;
            for i in 0..s {
                for j in 0..w.ncols() {
                    coeffs[(b * s + i, j)] += c[(i, j)];
                }
            }
        }
        Ok(())
    }

    fn orthonormalize(
        &mut self,
        w: &mut BlockVector,
        coeffs: &mut Mat<c64>,
    ) -> Result<(Mat<c64>, StepStatus), KError> {
        let s = self.block_size;
        let norms0 = w.column_norms();
        self.project_basis(w, coeffs)?;
        if !self.basis.is_empty() {
            let norms1 = w.column_norms();
            if norms1.iter().zip(&norms0).any(|(n1, n0)| *n1 < DGKS * n0) {
                self.project_basis(w, coeffs)?;
            }
        }

        let mut r = Mat::<c64>::zeros(s, s);
        let mut deflated = 0;
        let mut exhausted = None;
        for j in 0..s {
            let mut x = w.columns(j, 1);
            let before = x.col_norm(0);
            let prev = w.columns(0, j);
            if j > 0 {
                let c = prev.gram(&x);
                x.add_product(-C_ONE, &prev, &c)?;
                for l in 0..j {
                    r[(l, j)] += c[(l, 0)];
                }
            }
            let mut nrm = x.col_norm(0);
            if nrm < DGKS * before {
                // second pass against the basis and the earlier columns of this block
                let mut extra = Mat::<c64>::zeros(coeffs.nrows(), 1);
                self.project_basis(&mut x, &mut extra)?;
                for i in 0..coeffs.nrows() {
                    coeffs[(i, j)] += extra[(i, 0)];
                }
                if j > 0 {
                    let c = prev.gram(&x);
                    x.add_product(-C_ONE, &prev, &c)?;
                    for l in 0..j {
                        r[(l, j)] += c[(l, 0)];
                    }
                }
                nrm = x.col_norm(0);
            }
            if norms0[j] == 0.0 || nrm <= BREAKDOWN_FACTOR * f64::EPSILON * norms0[j] {
                r[(j, j)] = C_ZERO;
                match self.random_direction(&mut x, &prev)? {
                    true => deflated += 1,
                    false => {
                        exhausted.get_or_insert(j);
                        x.fill(C_ZERO);
                    }
                }
                log::debug!(
                    "block Arnoldi: column {j} broke down (|w| = {nrm:.3e} of {:.3e})",
                    norms0[j]
                );
            } else {
                r[(j, j)] = c64::new(nrm, 0.0);
                x.scale_col(0, c64::new(1.0 / nrm, 0.0));
            }
            w.set_columns(j, &x);
        }
        let status = match exhausted {
            Some(column) => StepStatus::Exhausted { column },
            None if deflated > 0 => StepStatus::Deflated(deflated),
            None => StepStatus::Full,
        };
        Ok((r, status))
    }

    /// Overwrite `x` with a random unit vector orthogonal to the basis and to `prev`.
    /// Returns `false` when no such direction survives.
    fn random_direction(&mut self, x: &mut BlockVector, prev: &BlockVector) -> Result<bool, KError> {
        x.randomize(self.seed.wrapping_add(self.draws));
        self.draws += 1;
        let start = x.col_norm(0);
        let mut sink = Mat::<c64>::zeros(self.basis.len() * self.block_size, 1);
        for _ in 0..2 {
            self.project_basis(x, &mut sink)?;
            if prev.ncols() > 0 {
                let c = prev.gram(x);
                x.add_product(-C_ONE, prev, &c)?;
            }
        }
        let nrm = x.col_norm(0);
        if nrm <= 1e-10 * start {
            return Ok(false);
        }
        x.scale_col(0, c64::new(1.0 / nrm, 0.0));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Operator;
    use crate::parallel::RowMap;
    use std::sync::Arc;

    fn operator(n: usize) -> Mat<c64> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(3.0 + i as f64 * 0.1, 0.5)
            } else if j == i + 1 || i == j + 2 {
                c64::new(0.4, -0.2)
            } else {
                C_ZERO
            }
        })
    }

    #[test]
    fn basis_stays_orthonormal() {
        let n = 30;
        let a = operator(n);
        let map = Arc::new(RowMap::serial(n));
        let mut r0 = BlockVector::zeros(map.clone(), 3);
        r0.randomize(5);
        let mut arnoldi = BlockArnoldi::new(3, 6, 99);
        arnoldi.start(&r0).unwrap();
        for _ in 0..6 {
            let mut w = BlockVector::zeros(map.clone(), 3);
            a.apply(arnoldi.last().unwrap(), &mut w).unwrap();
            let step = arnoldi.extend(w).unwrap();
            assert_eq!(step.status, StepStatus::Full);
            assert!(arnoldi.orthogonality_error() < 1e-12);
        }
        assert_eq!(arnoldi.basis().len(), 7);
    }

    #[test]
    fn hessenberg_relation_holds() {
        // A V_0 = V_0 H_00 + V_1 H_10
        let n = 12;
        let a = operator(n);
        let map = Arc::new(RowMap::serial(n));
        let mut r0 = BlockVector::zeros(map.clone(), 2);
        r0.randomize(1);
        let mut arnoldi = BlockArnoldi::new(2, 2, 7);
        arnoldi.start(&r0).unwrap();
        let mut w = BlockVector::zeros(map.clone(), 2);
        a.apply(&arnoldi.basis()[0], &mut w).unwrap();
        let aw = w.clone();
        let step = arnoldi.extend(w).unwrap();
        let mut recon = BlockVector::zeros(map, 2);
        for (b, v) in arnoldi.basis().iter().enumerate() {
            let hb = Mat::from_fn(2, 2, |i, j| step.h[(b * 2 + i, j)]);
            recon.add_product(C_ONE, v, &hb).unwrap();
        }
        recon.axpy(-C_ONE, &aw).unwrap();
        assert!(recon.column_norms().iter().all(|&e| e < 1e-12));
    }

    #[test]
    fn dependent_columns_are_replaced() {
        let map = Arc::new(RowMap::serial(8));
        let mut r0 = BlockVector::zeros(map, 2);
        r0.randomize(3);
        let first = r0.columns(0, 1);
        r0.set_columns(1, &first);
        let mut arnoldi = BlockArnoldi::new(2, 1, 17);
        let (z, status) = arnoldi.start(&r0).unwrap();
        assert_eq!(status, StepStatus::Deflated(1));
        assert_eq!(z[(1, 1)], C_ZERO);
        assert!(arnoldi.orthogonality_error() < 1e-12);
    }

    #[test]
    fn exhausted_when_space_is_spanned() {
        // two basis blocks of width 2 span C^4; the next block has nowhere to go
        let n = 4;
        let a = operator(n);
        let map = Arc::new(RowMap::serial(n));
        let mut r0 = BlockVector::zeros(map.clone(), 2);
        r0.randomize(8);
        let mut arnoldi = BlockArnoldi::new(2, 3, 1);
        arnoldi.start(&r0).unwrap();
        let mut statuses = Vec::new();
        for _ in 0..2 {
            let mut w = BlockVector::zeros(map.clone(), 2);
            a.apply(arnoldi.last().unwrap(), &mut w).unwrap();
            statuses.push(arnoldi.extend(w).unwrap().status);
        }
        assert_eq!(statuses[0], StepStatus::Full);
        assert!(matches!(statuses[1], StepStatus::Exhausted { column: 0 }));
        assert_eq!(arnoldi.basis().len(), 2);
    }
}
