//! Convergence tracking & tolerance checks for the block solver.
//!
//! Every right-hand side column is tested on its own: column `j` has converged once
//! `‖r_j‖ / base_j ≤ tol`, where the baseline is `‖b_j‖`, or `‖r0_j‖` when `b_j = 0`.

/// Stopping criteria.
#[derive(Clone, Debug)]
pub struct Convergence {
    pub tol: f64,
    /// Budget of block iterations over all restart cycles.
    pub max_iters: usize,
    pub max_restarts: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    Unconverged,
}

#[derive(Clone, Debug)]
pub struct SolveStats {
    pub status: SolveStatus,
    /// Block iterations, summed over all right-hand side groups.
    pub iterations: usize,
    pub restarts: usize,
    /// Largest relative true residual over the columns.
    pub final_residual: f64,
    /// Relative true residual of every column.
    pub residuals: Vec<f64>,
}

impl SolveStats {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

impl Convergence {
    pub fn new(tol: f64, max_iters: usize, max_restarts: usize) -> Self {
        Self { tol, max_iters, max_restarts }
    }

    /// Per-column baselines: `‖b_j‖`, falling back to `‖r0_j‖`, then to one.
    pub fn baselines(b_norms: &[f64], r0_norms: &[f64]) -> Vec<f64> {
        b_norms
            .iter()
            .zip(r0_norms)
            .map(|(&b, &r)| if b > 0.0 { b } else if r > 0.0 { r } else { 1.0 })
            .collect()
    }

    pub fn relative(norms: &[f64], baselines: &[f64]) -> Vec<f64> {
        norms.iter().zip(baselines).map(|(n, b)| n / b).collect()
    }

    /// True when every column satisfies the tolerance.
    pub fn check(&self, norms: &[f64], baselines: &[f64]) -> bool {
        norms.iter().zip(baselines).all(|(n, b)| n / b <= self.tol)
    }
}
