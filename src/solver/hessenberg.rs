//! Incremental QR factorization of the block upper-Hessenberg matrix.
//!
//! Storage for at most `max_blocks` block columns is allocated up front (once per restart
//! cycle). Each block column is reduced to upper-triangular form as soon as it arrives, by
//! applying every earlier Givens rotation and then `s` new rotations per column, `s²` per
//! block. The same rotations act on the projected right-hand side `[Z; 0]`, whose trailing
//! `s` rows hold the current least-squares residual of every column.

use crate::core::C_ZERO;
use crate::error::KError;
use crate::matrix::dense::{back_substitution, Givens};
use faer::{c64, Mat};

pub struct BlockHessenbergQr {
    s: usize,
    max_blocks: usize,
    r: Mat<c64>,
    g: Mat<c64>,
    rotations: Vec<(usize, usize, Givens)>,
    blocks: usize,
}

impl BlockHessenbergQr {
    /// Start a cycle with projected right-hand side `z` (`s × k`).
    pub fn new(s: usize, max_blocks: usize, z: &Mat<c64>) -> Result<Self, KError> {
        if z.nrows() != s || s == 0 || max_blocks == 0 {
            return Err(KError::DimensionError(format!(
                "Hessenberg QR with block size {s}, {max_blocks} blocks and a {}x{} right-hand side",
                z.nrows(),
                z.ncols()
            )));
        }
        let rows = (max_blocks + 1) * s;
        let g = Mat::from_fn(rows, z.ncols(), |i, j| if i < s { z[(i, j)] } else { C_ZERO });
        Ok(Self {
            s,
            max_blocks,
            r: Mat::zeros(rows, max_blocks * s),
            g,
            rotations: Vec::with_capacity(max_blocks * s * s),
            blocks: 0,
        })
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn is_full(&self) -> bool {
        self.blocks == self.max_blocks
    }

    /// Append block column `i = blocks()` of `H` (`(i + 2)·s × s`) and reduce it.
    pub fn push_block(&mut self, h: &Mat<c64>) -> Result<(), KError> {
        let (s, i) = (self.s, self.blocks);
        if self.is_full() {
            return Err(KError::DimensionError(format!("Hessenberg storage holds {} blocks", self.max_blocks)));
        }
        if h.nrows() != (i + 2) * s || h.ncols() != s {
            return Err(KError::ShapeMismatch(format!(
                "block column {i} of H is {}x{}, expected {}x{s}",
                h.nrows(),
                h.ncols(),
                (i + 2) * s
            )));
        }
        for jj in 0..s {
            let col = i * s + jj;
            for row in 0..h.nrows() {
                self.r[(row, col)] = h[(row, jj)];
            }
            for &(a, b, rot) in &self.rotations {
                let (mut x, mut y) = (self.r[(a, col)], self.r[(b, col)]);
                rot.apply(&mut x, &mut y);
                self.r[(a, col)] = x;
                self.r[(b, col)] = y;
            }
            // below the diagonal only rows up to (i + 1)·s + jj can be nonzero
            for k in (col + 1)..=((i + 1) * s + jj) {
                if self.r[(k, col)] == C_ZERO {
                    continue;
                }
                let (rot, rr) = Givens::new(self.r[(col, col)], self.r[(k, col)]);
                self.r[(col, col)] = rr;
                self.r[(k, col)] = C_ZERO;
                for j in 0..self.g.ncols() {
                    let (mut x, mut y) = (self.g[(col, j)], self.g[(k, j)]);
                    rot.apply(&mut x, &mut y);
                    self.g[(col, j)] = x;
                    self.g[(k, j)] = y;
                }
                self.rotations.push((col, k, rot));
            }
        }
        self.blocks += 1;
        Ok(())
    }

    /// Least-squares residual norm of every right-hand side column.
    pub fn residual_norms(&self) -> Vec<f64> {
        let lo = self.blocks * self.s;
        (0..self.g.ncols())
            .map(|j| (lo..lo + self.s).map(|i| self.g[(i, j)].norm_sqr()).sum::<f64>().sqrt())
            .collect()
    }

    /// Coefficients `Y` (`blocks()·s × k`) minimizing `‖[Z; 0] − H Y‖` column by column.
    pub fn solve(&self) -> Mat<c64> {
        let m = self.blocks * self.s;
        let scale = (0..m).map(|i| self.r[(i, i)].norm()).fold(0.0, f64::max);
        let g = Mat::from_fn(m, self.g.ncols(), |i, j| self.g[(i, j)]);
        back_substitution(&self.r, &g, m, scale * f64::EPSILON * m as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::least_squares;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random(rng: &mut StdRng) -> c64 {
        c64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn matches_dense_least_squares() {
        let (s, nb) = (2, 3);
        let mut rng = StdRng::seed_from_u64(21);
        let pool: Vec<c64> = (0..(nb + 1) * s * nb * s + s * s).map(|_| random(&mut rng)).collect();
        // block upper-Hessenberg: entry (i, j) nonzero when i < (j / s + 2) * s, with
        // upper-triangular sub-diagonal blocks
        let h = Mat::from_fn((nb + 1) * s, nb * s, |i, j| {
            let bj = j / s;
            let sub_block = i >= (bj + 1) * s;
            if i < (bj + 2) * s && !(sub_block && i - (bj + 1) * s > j % s) {
                pool[j * (nb + 1) * s + i]
            } else {
                C_ZERO
            }
        });
        let tail = (nb + 1) * s * nb * s;
        let z = Mat::from_fn(s, s, |i, j| if i <= j { pool[tail + j * s + i] } else { C_ZERO });
        let mut qr = BlockHessenbergQr::new(s, nb, &z).unwrap();
        for i in 0..nb {
            let hi = Mat::from_fn((i + 2) * s, s, |r, c| h[(r, i * s + c)]);
            qr.push_block(&hi).unwrap();
        }
        assert!(qr.is_full());
        let y = qr.solve();
        let norms = qr.residual_norms();
        for j in 0..s {
            let rhs: Vec<c64> = (0..(nb + 1) * s).map(|i| if i < s { z[(i, j)] } else { C_ZERO }).collect();
            let yref = least_squares(&h, &rhs).unwrap();
            for k in 0..nb * s {
                assert!((y[(k, j)] - yref[k]).norm() < 1e-10);
            }
            let res: f64 = (0..rhs.len())
                .map(|i| {
                    let hy: c64 = (0..nb * s).map(|k| h[(i, k)] * yref[k]).sum();
                    (rhs[i] - hy).norm_sqr()
                })
                .sum::<f64>()
                .sqrt();
            assert!((norms[j] - res).abs() < 1e-10);
        }
    }

    #[test]
    fn rejects_wrong_block_shape() {
        let z = Mat::<c64>::zeros(2, 2);
        let mut qr = BlockHessenbergQr::new(2, 4, &z).unwrap();
        assert!(qr.push_block(&Mat::<c64>::zeros(6, 2)).is_err());
    }
}
