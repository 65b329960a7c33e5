//! Small dense complex kernels on top of Faer storage.
//!
//! Everything here works on projected matrices whose size is bounded by the Krylov
//! dimension or the polynomial degree, so the routines favour clarity over blocking.

use crate::core::{C_ONE, C_ZERO};
use crate::error::KError;
use faer::{c64, Mat};

/// Complex plane rotation `[c  s; -conj(s)  c]` with real `c`.
#[derive(Clone, Copy, Debug)]
pub struct Givens {
    pub c: f64,
    pub s: c64,
}

impl Givens {
    /// Rotation mapping `(a, b)` to `(r, 0)`.
    pub fn new(a: c64, b: c64) -> (Self, c64) {
        let (na, nb) = (a.norm(), b.norm());
        if nb == 0.0 {
            return (Self { c: 1.0, s: C_ZERO }, a);
        }
        if na == 0.0 {
            return (Self { c: 0.0, s: b.conj() / nb }, c64::new(nb, 0.0));
        }
        let nu = na.hypot(nb);
        let alpha = a / na;
        (Self { c: na / nu, s: alpha * b.conj() / nu }, alpha * nu)
    }

    /// Rotate the pair `(x, y)` in place.
    #[inline]
    pub fn apply(&self, x: &mut c64, y: &mut c64) {
        let (xv, yv) = (*x, *y);
        *x = xv * self.c + self.s * yv;
        *y = yv * self.c - self.s.conj() * xv;
    }

    /// Right-multiply the column pair `(x, y)` by the conjugate transpose.
    #[inline]
    pub fn apply_adjoint_right(&self, x: &mut c64, y: &mut c64) {
        let (xv, yv) = (*x, *y);
        *x = xv * self.c + yv * self.s.conj();
        *y = yv * self.c - xv * self.s;
    }
}

/// Solve the upper-triangular system `R y = g` for every column of `g`, with zero-pivot
/// protection: a column of `R` with a vanishing pivot contributes nothing.
pub fn back_substitution(r: &Mat<c64>, g: &Mat<c64>, m: usize, epsilon: f64) -> Mat<c64> {
    let k = g.ncols();
    let mut y = Mat::<c64>::zeros(m, k);
    for col in 0..k {
        for i in (0..m).rev() {
            let mut acc = g[(i, col)];
            for j in (i + 1)..m {
                acc -= r[(i, j)] * y[(j, col)];
            }
            y[(i, col)] = if r[(i, i)].norm() > epsilon { acc / r[(i, i)] } else { C_ZERO };
        }
    }
    y
}

/// Least-squares solution of `min ‖A x − b‖₂` by Householder QR (`A` is `m×n`, `m ≥ n`).
pub fn least_squares(a: &Mat<c64>, b: &[c64]) -> Result<Vec<c64>, KError> {
    let (m, n) = (a.nrows(), a.ncols());
    if m < n || b.len() != m {
        return Err(KError::ShapeMismatch(format!(
            "least squares with {m}x{n} matrix and rhs of length {}",
            b.len()
        )));
    }
    let mut r = a.clone();
    let mut rhs = b.to_vec();
    for k in 0..n {
        let norm_x = (k..m).map(|i| r[(i, k)].norm_sqr()).sum::<f64>().sqrt();
        if norm_x == 0.0 {
            continue;
        }
        let x0 = r[(k, k)];
        let phase = if x0.norm() == 0.0 { C_ONE } else { x0 / x0.norm() };
        let alpha = -phase * norm_x;
        // v = x - alpha e1, H = I - 2 v vᴴ / (vᴴ v)
        let mut v: Vec<c64> = (k..m).map(|i| r[(i, k)]).collect();
        v[0] -= alpha;
        let vnorm_sqr: f64 = v.iter().map(|z| z.norm_sqr()).sum();
        if vnorm_sqr == 0.0 {
            continue;
        }
        for j in k..n {
            let dot: c64 = v.iter().enumerate().map(|(l, vl)| vl.conj() * r[(k + l, j)]).sum();
            let f = dot * (2.0 / vnorm_sqr);
            for (l, vl) in v.iter().enumerate() {
                r[(k + l, j)] -= f * vl;
            }
        }
        let dot: c64 = v.iter().enumerate().map(|(l, vl)| vl.conj() * rhs[k + l]).sum();
        let f = dot * (2.0 / vnorm_sqr);
        for (l, vl) in v.iter().enumerate() {
            rhs[k + l] -= f * vl;
        }
    }
    let scale = (0..n).map(|i| r[(i, i)].norm()).fold(0.0, f64::max);
    if scale == 0.0 {
        return Err(KError::SolveError("least-squares matrix is zero".into()));
    }
    let g = Mat::from_fn(n, 1, |i, _| rhs[i]);
    let y = back_substitution(&r, &g, n, scale * 1e-14);
    Ok((0..n).map(|i| y[(i, 0)]).collect())
}

/// Eigenvalues of an upper-Hessenberg matrix by the shifted QR algorithm with deflation.
///
/// Entries below the first sub-diagonal are ignored.
pub fn hessenberg_eigenvalues(h: &Mat<c64>) -> Result<Vec<c64>, KError> {
    let n = h.nrows();
    if h.ncols() != n {
        return Err(KError::ShapeMismatch(format!("{}x{} is not square", n, h.ncols())));
    }
    let mut a = Mat::from_fn(n, n, |i, j| if i <= j + 1 { h[(i, j)] } else { C_ZERO });
    let mut eig = Vec::with_capacity(n);
    let mut hi = n;
    let mut iters = 0usize;
    let budget = 60 * n.max(1);
    while hi > 0 {
        if hi == 1 {
            eig.push(a[(0, 0)]);
            break;
        }
        // find the start of the active unreduced block
        let mut lo = hi - 1;
        while lo > 0 {
            let sub = a[(lo, lo - 1)].norm();
            let diag = a[(lo, lo)].norm() + a[(lo - 1, lo - 1)].norm();
            if sub <= f64::EPSILON * diag.max(f64::MIN_POSITIVE) {
                a[(lo, lo - 1)] = C_ZERO;
                break;
            }
            lo -= 1;
        }
        if lo == hi - 1 {
            eig.push(a[(hi - 1, hi - 1)]);
            hi -= 1;
            iters = 0;
            continue;
        }
        iters += 1;
        if iters > budget {
            return Err(KError::SolveError(format!(
                "Hessenberg QR did not converge ({} of {n} eigenvalues found)",
                eig.len()
            )));
        }
        let mu = if iters % 11 == 0 {
            // exceptional shift to break cycles
            a[(hi - 1, hi - 1)] + c64::new(0.75 * a[(hi - 1, hi - 2)].norm(), 0.0)
        } else {
            wilkinson_shift(a[(hi - 2, hi - 2)], a[(hi - 2, hi - 1)], a[(hi - 1, hi - 2)], a[(hi - 1, hi - 1)])
        };
        for k in lo..hi {
            a[(k, k)] -= mu;
        }
        let mut rots = Vec::with_capacity(hi - lo - 1);
        for k in lo..hi - 1 {
            let (g, r) = Givens::new(a[(k, k)], a[(k + 1, k)]);
            a[(k, k)] = r;
            a[(k + 1, k)] = C_ZERO;
            for j in (k + 1)..hi {
                let (mut x, mut y) = (a[(k, j)], a[(k + 1, j)]);
                g.apply(&mut x, &mut y);
                a[(k, j)] = x;
                a[(k + 1, j)] = y;
            }
            rots.push(g);
        }
        for (idx, g) in rots.iter().enumerate() {
            let k = lo + idx;
            for i in lo..=(k + 1).min(hi - 1) {
                let (mut x, mut y) = (a[(i, k)], a[(i, k + 1)]);
                g.apply_adjoint_right(&mut x, &mut y);
                a[(i, k)] = x;
                a[(i, k + 1)] = y;
            }
        }
        for k in lo..hi {
            a[(k, k)] += mu;
        }
    }
    Ok(eig)
}

/// Eigenvalue of the trailing 2×2 block `[p q; r s]` closest to `s`.
fn wilkinson_shift(p: c64, q: c64, r: c64, s: c64) -> c64 {
    let half_tr = (p + s) * 0.5;
    let det = p * s - q * r;
    let disc = (half_tr * half_tr - det).sqrt();
    let (l1, l2) = (half_tr + disc, half_tr - disc);
    if (l1 - s).norm() <= (l2 - s).norm() { l1 } else { l2 }
}
