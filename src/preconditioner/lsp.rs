//! Least-squares polynomial preconditioner.
//!
//! Approximates `A⁻¹` by a polynomial `p(A)` of degree `d` chosen so that `λ·p(λ)` is close to
//! one over an estimate of the spectrum of `A`:
//!
//! 1. a short Arnoldi probe (block size one, seeded random start) yields a small Hessenberg
//!    matrix whose Ritz values approximate the outer spectrum;
//! 2. the spectral region is the Ritz values together with the boundary of a padded ellipse
//!    around their bounding box, centre `γ` and scale `ρ`;
//! 3. `p(λ) = Σ a_k ((λ−γ)/ρ)^k` is fitted by minimizing `Σ |1 − λ p(λ)|²` over the region.
//!
//! Applying the preconditioner evaluates `p(A)·Y` by Horner's rule with exactly `d` operator
//! applications.
//!
//! # References
//! - Saad, Y. (1987). Least squares polynomials in the complex plane and their use for solving
//!   nonsymmetric linear systems. SIAM J. Sci. Stat. Comput. 8(6).
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, 2nd Edition. SIAM. §12.3

use crate::core::block::BlockVector;
use crate::core::traits::Operator;
use crate::core::C_ONE;
use crate::error::KError;
use crate::matrix::dense::{hessenberg_eigenvalues, least_squares};
use crate::parallel::RowMap;
use crate::preconditioner::Preconditioner;
use crate::solver::arnoldi::{BlockArnoldi, StepStatus};
use faer::{c64, Mat};
use std::f64::consts::{PI, SQRT_2};
use std::fmt;
use std::sync::Arc;

/// Extra room around the Ritz bounding box, relative to the spectral radius estimate.
const PAD: f64 = 0.02;

#[derive(Clone, Debug)]
pub struct LsPolyParams {
    /// Polynomial degree `d` (operator applies per preconditioner application).
    pub degree: usize,
    /// Arnoldi steps used to estimate the spectrum.
    pub probe_steps: usize,
    pub seed: u64,
}

impl Default for LsPolyParams {
    fn default() -> Self {
        Self { degree: 10, probe_steps: 30, seed: 0x5eed }
    }
}

impl LsPolyParams {
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }
    pub fn with_probe_steps(mut self, steps: usize) -> Self {
        self.probe_steps = steps;
        self
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

pub struct LsPolynomial {
    op: Arc<dyn Operator>,
    center: c64,
    scale: f64,
    coeffs: Vec<c64>,
    ritz: Vec<c64>,
}

impl LsPolynomial {
    /// Probe `op` and fit the polynomial.
    pub fn build(op: Arc<dyn Operator>, map: Arc<RowMap>, params: &LsPolyParams) -> Result<Self, KError> {
        let n = op.nrows();
        if op.ncols() != n || map.global_len() != n {
            return Err(KError::ShapeMismatch(format!(
                "polynomial preconditioner for a {}x{} operator over {} rows",
                n,
                op.ncols(),
                map.global_len()
            )));
        }
        let ritz = ritz_values(op.as_ref(), map, params).map_err(|e| match e {
            KError::PreconditionerConstruction(_) => e,
            other => KError::PreconditionerConstruction(format!("spectrum probe failed: {other}")),
        })?;
        let radius = ritz.iter().map(|z| z.norm()).fold(0.0, f64::max);
        if !radius.is_finite() || ritz.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
            return Err(KError::PreconditionerConstruction("non-finite spectral estimate".into()));
        }
        if radius <= f64::EPSILON {
            return Err(KError::PreconditionerConstruction(
                "vanishing spectral estimate (zero operator?)".into(),
            ));
        }

        let (re_lo, re_hi) = bounds(ritz.iter().map(|z| z.re));
        let (im_lo, im_hi) = bounds(ritz.iter().map(|z| z.im));
        let center = c64::new(0.5 * (re_lo + re_hi), 0.5 * (im_lo + im_hi));
        // an ellipse with semi-axes √2·(half widths) passes through the box corners
        let ax = SQRT_2 * 0.5 * (re_hi - re_lo) + PAD * radius;
        let ay = SQRT_2 * 0.5 * (im_hi - im_lo) + PAD * radius;
        let scale = ax.max(ay);

        let samples = (4 * (params.degree + 1)).max(64);
        let mut region = ritz.clone();
        region.extend((0..samples).map(|k| {
            let t = 2.0 * PI * k as f64 / samples as f64;
            center + c64::new(ax * t.cos(), ay * t.sin())
        }));

        let d = params.degree;
        let m = Mat::from_fn(region.len(), d + 1, |r, k| {
            let lambda = region[r];
            lambda * ((lambda - center) / scale).powi(k as i32)
        });
        let ones = vec![C_ONE; region.len()];
        let coeffs = least_squares(&m, &ones)
            .map_err(|e| KError::PreconditionerConstruction(format!("polynomial fit failed: {e}")))?;
        if coeffs.iter().any(|a| !a.re.is_finite() || !a.im.is_finite()) {
            return Err(KError::PreconditionerConstruction("non-finite polynomial coefficients".into()));
        }
        log::debug!(
            "LSP: degree {d}, {} Ritz values, centre {:.4}{:+.4}i, scale {:.4e}",
            ritz.len(),
            center.re,
            center.im,
            scale
        );
        Ok(Self { op, center, scale, coeffs, ritz })
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn center(&self) -> c64 {
        self.center
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn coefficients(&self) -> &[c64] {
        &self.coeffs
    }

    pub fn ritz_values(&self) -> &[c64] {
        &self.ritz
    }

    /// Scalar evaluation `p(λ)`.
    pub fn eval(&self, lambda: c64) -> c64 {
        let zeta = (lambda - self.center) / self.scale;
        self.coeffs.iter().rev().fold(c64::new(0.0, 0.0), |acc, a| acc * zeta + a)
    }
}

impl Preconditioner for LsPolynomial {
    fn apply(&self, r: &BlockVector, z: &mut BlockVector) -> Result<(), KError> {
        r.check_same_shape(z)?;
        let d = self.degree();
        let inv_scale = c64::new(1.0 / self.scale, 0.0);
        let mut w = r.clone();
        w.scale(self.coeffs[d]);
        let mut t = BlockVector::zeros(Arc::clone(r.map()), r.ncols());
        for k in (0..d).rev() {
            self.op.apply(&w, &mut t)?;
            t.axpy(-self.center, &w)?;
            t.scale(inv_scale);
            t.axpy(self.coeffs[k], r)?;
            std::mem::swap(&mut w, &mut t);
        }
        z.as_mut_slice().copy_from_slice(w.as_slice());
        Ok(())
    }
}

impl fmt::Debug for LsPolynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LsPolynomial")
            .field("degree", &self.degree())
            .field("center", &self.center)
            .field("scale", &self.scale)
            .finish()
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Ritz values from an `m`-step Arnoldi probe started at a seeded random vector.
fn ritz_values(op: &dyn Operator, map: Arc<RowMap>, params: &LsPolyParams) -> Result<Vec<c64>, KError> {
    if map.global_len() == 0 {
        return Err(KError::PreconditionerConstruction("operator has no rows".into()));
    }
    let steps = params.probe_steps.clamp(1, map.global_len());
    let mut v0 = BlockVector::zeros(Arc::clone(&map), 1);
    v0.randomize(params.seed);
    let mut arnoldi = BlockArnoldi::new(1, steps, params.seed.wrapping_add(1));
    arnoldi.start(&v0)?;
    let mut h = Mat::<c64>::zeros(steps + 1, steps);
    let mut done = 0;
    for k in 0..steps {
        let mut w = BlockVector::zeros(Arc::clone(&map), 1);
        let v = arnoldi
            .last()
            .ok_or_else(|| KError::SolveError("empty Arnoldi basis".into()))?
            .clone();
        op.apply(&v, &mut w)?;
        let step = arnoldi.extend(w)?;
        for i in 0..step.h.nrows() {
            h[(i, k)] = step.h[(i, 0)];
        }
        done = k + 1;
        if matches!(step.status, StepStatus::Exhausted { .. }) {
            break;
        }
    }
    let hm = Mat::from_fn(done, done, |i, j| h[(i, j)]);
    hessenberg_eigenvalues(&hm)
        .map_err(|e| KError::PreconditionerConstruction(format!("Ritz values did not converge: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::C_ZERO;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn diagonal(values: &[c64]) -> Mat<c64> {
        Mat::from_fn(values.len(), values.len(), |i, j| if i == j { values[i] } else { C_ZERO })
    }

    struct Counting {
        inner: Mat<c64>,
        applies: AtomicUsize,
    }

    impl Operator for Counting {
        fn nrows(&self) -> usize {
            self.inner.nrows()
        }
        fn ncols(&self) -> usize {
            self.inner.ncols()
        }
        fn apply(&self, x: &BlockVector, y: &mut BlockVector) -> Result<(), KError> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            self.inner.apply(x, y)
        }
    }

    #[test]
    fn empty_operator_cannot_be_fitted() {
        let a: Arc<dyn Operator> = Arc::new(Mat::<c64>::zeros(0, 0));
        let r = LsPolynomial::build(a, Arc::new(RowMap::serial(0)), &LsPolyParams::default());
        assert!(matches!(r, Err(KError::PreconditionerConstruction(_))));
    }

    #[test]
    fn clusters_real_spectrum_near_one() {
        let n = 40;
        let eig: Vec<c64> = (0..n).map(|i| c64::new(1.0 + 2.0 * i as f64 / (n - 1) as f64, 0.0)).collect();
        let a: Arc<dyn Operator> = Arc::new(diagonal(&eig));
        let map = Arc::new(RowMap::serial(n));
        let params = LsPolyParams::default().with_degree(8).with_probe_steps(20);
        let p = LsPolynomial::build(a, map, &params).unwrap();
        assert_eq!(p.degree(), 8);
        let worst = eig.iter().map(|&l| (C_ONE - l * p.eval(l)).norm()).fold(0.0, f64::max);
        assert!(worst < 0.05, "max |1 - λp(λ)| = {worst}");
    }

    #[test]
    fn apply_matches_scalar_polynomial_with_degree_applies() {
        let n = 12;
        let eig: Vec<c64> = (0..n).map(|i| c64::new(2.0, 0.0) + c64::from_polar(0.6, i as f64)).collect();
        let counting = Arc::new(Counting { inner: diagonal(&eig), applies: AtomicUsize::new(0) });
        let map = Arc::new(RowMap::serial(n));
        let params = LsPolyParams::default().with_degree(5).with_probe_steps(n);
        let p = LsPolynomial::build(counting.clone(), map.clone(), &params).unwrap();
        let mut r = BlockVector::zeros(map.clone(), 2);
        r.randomize(4);
        let mut z = BlockVector::zeros(map, 2);
        counting.applies.store(0, Ordering::SeqCst);
        p.apply(&r, &mut z).unwrap();
        assert_eq!(counting.applies.load(Ordering::SeqCst), 5);
        for j in 0..2 {
            for i in 0..n {
                let expected = p.eval(eig[i]) * r.col(j)[i];
                assert!((z.col(j)[i] - expected).norm() < 1e-10 * (1.0 + expected.norm()));
            }
        }
    }

    #[test]
    fn zero_operator_is_rejected() {
        let n = 6;
        let a: Arc<dyn Operator> = Arc::new(Mat::<c64>::zeros(n, n));
        let err = LsPolynomial::build(a, Arc::new(RowMap::serial(n)), &LsPolyParams::default()).unwrap_err();
        assert!(matches!(err, KError::PreconditionerConstruction(_)));
    }
}
