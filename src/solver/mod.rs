//! Krylov solver interfaces.

use crate::error::KError;
use crate::problem::LinearProblem;
use crate::utils::convergence::SolveStats;

/// Common interface for the iterative solvers.
pub trait LinearSolver {
    /// Solve the problem in place, writing the result into its unknown block.
    /// Returns iteration stats (including convergence info).
    fn solve(&mut self, problem: &mut LinearProblem) -> Result<SolveStats, KError>;
}

pub mod arnoldi;
pub mod hessenberg;

pub mod block_gmres;
pub use block_gmres::{BlockGmresParams, BlockGmresSolver};

impl LinearSolver for BlockGmresSolver {
    fn solve(&mut self, problem: &mut LinearProblem) -> Result<SolveStats, KError> {
        BlockGmresSolver::solve(self, problem)
    }
}
