//! Sparse row storage for the generator and the similarity transforms applied to it.

use super::nilpotency::Nilpotency;
use crate::core::C_ZERO;
use crate::error::KError;
use faer::c64;
use num_traits::Zero;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Square matrix held as one sorted map per row, used while the generator assembles the
/// global matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseRows {
    rows: Vec<BTreeMap<usize, c64>>,
}

impl SparseRows {
    pub fn zeros(n: usize) -> Self {
        Self { rows: vec![BTreeMap::new(); n] }
    }

    pub fn dim(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, i: usize) -> &BTreeMap<usize, c64> {
        &self.rows[i]
    }

    pub fn get(&self, i: usize, j: usize) -> c64 {
        self.rows[i].get(&j).copied().unwrap_or(C_ZERO)
    }

    pub fn set(&mut self, i: usize, j: usize, v: c64) {
        self.rows[i].insert(j, v);
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(BTreeMap::len).sum()
    }

    /// `self + alpha · other`.
    fn axpy(&mut self, alpha: f64, other: &SparseRows) {
        for (dst, src) in self.rows.iter_mut().zip(&other.rows) {
            for (&j, &v) in src {
                *dst.entry(j).or_insert(C_ZERO) += v * alpha;
            }
        }
    }

    /// `self · U`: column `l` moves to `l + 1` wherever `U` has a one at `(l, l + 1)`.
    fn times_nilpotent(&self, u: &Nilpotency) -> SparseRows {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|(l, _)| u.has_one(**l))
                    .map(|(&l, &v)| (l + 1, v))
                    .collect()
            })
            .collect();
        SparseRows { rows }
    }

    /// `U · self`: row `i` takes row `i + 1` wherever `U` has a one at `(i, i + 1)`.
    fn nilpotent_times(&self, u: &Nilpotency) -> SparseRows {
        let n = self.dim();
        let rows = (0..n)
            .map(|i| if u.has_one(i) { self.rows[i + 1].clone() } else { BTreeMap::new() })
            .collect();
        SparseRows { rows }
    }

    /// `self · exp(sign · U)`, an exact finite sum since `U` is nilpotent.
    pub fn times_exp(&self, u: &Nilpotency, sign: f64) -> SparseRows {
        let mut acc = self.clone();
        let mut term = self.clone();
        for k in 1..u.degree() {
            term = term.times_nilpotent(u);
            acc.axpy(sign.powi(k as i32) / factorial(k), &term);
        }
        acc
    }

    /// `exp(sign · U) · self`.
    pub fn exp_times(&self, u: &Nilpotency, sign: f64) -> SparseRows {
        let mut acc = self.clone();
        let mut term = self.clone();
        for k in 1..u.degree() {
            term = term.nilpotent_times(u);
            acc.axpy(sign.powi(k as i32) / factorial(k), &term);
        }
        acc
    }

    /// Drop explicit zeros left behind by cancellation.
    pub fn prune(&mut self) {
        for row in &mut self.rows {
            row.retain(|_, v| !v.is_zero());
        }
    }

    pub fn into_rows(self) -> Vec<BTreeMap<usize, c64>> {
        self.rows
    }
}

fn factorial(k: usize) -> f64 {
    (1..=k).map(|i| i as f64).product()
}

/// One step of the generator pipeline.
#[derive(Clone, Debug)]
pub enum Transform {
    /// Overwrite the diagonal with the target spectrum.
    DiagonalInject { spectrum: Vec<c64> },
    /// `A ← exp(−U) · A · exp(U)`.
    Shear { nilpotency: Nilpotency },
    /// `A ← P A Pᵀ` for a seeded random permutation `P`.
    Permute { seed: u64 },
}

impl Transform {
    pub fn is_similarity(&self) -> bool {
        !matches!(self, Transform::DiagonalInject { .. })
    }

    pub fn apply(&self, a: &mut SparseRows) -> Result<(), KError> {
        let n = a.dim();
        match self {
            Transform::DiagonalInject { spectrum } => {
                if spectrum.len() != n {
                    return Err(KError::DimensionError(format!(
                        "spectrum has {} values for a {n}x{n} matrix",
                        spectrum.len()
                    )));
                }
                for (i, &lambda) in spectrum.iter().enumerate() {
                    a.set(i, i, lambda);
                }
            }
            Transform::Shear { nilpotency } => {
                if nilpotency.size() != n {
                    return Err(KError::DimensionError(format!(
                        "nilpotency of size {} for a {n}x{n} matrix",
                        nilpotency.size()
                    )));
                }
                *a = a.times_exp(nilpotency, 1.0).exp_times(nilpotency, -1.0);
                a.prune();
            }
            Transform::Permute { seed } => {
                let perm = permutation(n, *seed);
                let mut out = SparseRows::zeros(n);
                for (i, row) in a.rows.iter().enumerate() {
                    for (&j, &v) in row {
                        out.set(perm[i], perm[j], v);
                    }
                }
                *a = out;
            }
        }
        Ok(())
    }
}

/// Seeded permutation of `0..n`.
pub fn permutation(n: usize, seed: u64) -> Vec<usize> {
    let mut p: Vec<usize> = (0..n).collect();
    p.shuffle(&mut StdRng::seed_from_u64(seed));
    p
}

/// Check that the pipeline injects the spectrum exactly once, before any similarity.
pub fn validate_pipeline(pipeline: &[Transform]) -> Result<(), KError> {
    let injects: Vec<usize> = pipeline
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_similarity())
        .map(|(i, _)| i)
        .collect();
    let first_similarity = pipeline.iter().position(Transform::is_similarity);
    match (injects.as_slice(), first_similarity) {
        ([at], Some(sim)) if *at > sim => Err(KError::DimensionError(
            "the spectrum must be injected before any similarity transform".into(),
        )),
        ([_], _) => Ok(()),
        _ => Err(KError::DimensionError(format!(
            "the pipeline must inject the spectrum exactly once, found {}",
            injects.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(a: &SparseRows) -> Vec<Vec<c64>> {
        (0..a.dim()).map(|i| (0..a.dim()).map(|j| a.get(i, j)).collect()).collect()
    }

    #[test]
    fn exp_and_inverse_cancel() {
        let n = 7;
        let u = Nilpotency::new(3, n).unwrap();
        let mut a = SparseRows::zeros(n);
        for i in 0..n {
            a.set(i, i, c64::new(i as f64 + 1.0, 0.5));
            if i > 0 {
                a.set(i, i - 1, c64::new(0.25, -0.1));
            }
        }
        let mut back = a.times_exp(&u, 1.0).times_exp(&u, -1.0);
        back.prune();
        let (d0, d1) = (dense(&a), dense(&back));
        for i in 0..n {
            for j in 0..n {
                assert!((d0[i][j] - d1[i][j]).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn pipeline_order_is_enforced() {
        let u = Nilpotency::new(1, 3).unwrap();
        let inject = Transform::DiagonalInject { spectrum: vec![C_ZERO; 3] };
        let shear = Transform::Shear { nilpotency: u };
        assert!(validate_pipeline(&[inject.clone(), shear.clone()]).is_ok());
        assert!(validate_pipeline(&[shear.clone(), inject.clone()]).is_err());
        assert!(validate_pipeline(&[shear]).is_err());
        assert!(validate_pipeline(&[inject.clone(), inject]).is_err());
    }

    #[test]
    fn permutation_is_a_bijection() {
        let mut p = permutation(20, 9);
        assert_eq!(p, permutation(20, 9));
        p.sort_unstable();
        assert_eq!(p, (0..20).collect::<Vec<_>>());
    }
}
