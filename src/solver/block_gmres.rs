//! Restarted block GMRES with flexible right preconditioning.
//!
//! Solves `A X = B` for several right-hand sides at once. Right-hand sides are processed in
//! groups of `block_size` columns; a short last group is padded with seeded random columns
//! whose solutions are discarded. Each group runs restart cycles of at most `num_blocks`
//! block iterations:
//!
//! 1. `R = M_l (B − A X)` is orthonormalized into `V_0`, `R = V_0 Z`;
//! 2. iteration `i` forms `Z_i = M_r V_i` when the group's iteration index is a multiple of
//!    `latency` (otherwise `Z_i = V_i`), then `W = M_l A Z_i` is orthogonalized into
//!    `V_{i+1}` by block Gram–Schmidt (see [`BlockArnoldi`]);
//! 3. the new block column of `H` is folded into an incremental Givens QR
//!    ([`BlockHessenbergQr`]) whose rotated right-hand side gives every column's residual
//!    estimate without forming the iterate;
//! 4. at the end of a cycle `X += Σ Z_i Y_i` and the true residual is recomputed.
//!
//! Since the basis `Z_i` is stored, a preconditioner that changes between iterations (here:
//! applied only every `latency` iterations) keeps the minimal-residual property.
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, 2nd Edition. SIAM. §6.12, §9.4
//! - Vital, B. (1990). Etude de quelques méthodes de résolution de problèmes linéaires de
//!   grande taille sur multiprocesseur. PhD thesis, Université de Rennes.

use crate::core::block::BlockVector;
use crate::core::C_ONE;
use crate::error::KError;
use crate::problem::LinearProblem;
use crate::solver::arnoldi::{BlockArnoldi, StepStatus};
use crate::solver::hessenberg::BlockHessenbergQr;
use crate::utils::convergence::{Convergence, SolveStats, SolveStatus};
use crate::utils::verbosity::MsgType;
use faer::Mat;
use std::sync::Arc;
use std::time::Instant;

/// Solver parameters, as parsed from the command line.
#[derive(Clone, Debug)]
pub struct BlockGmresParams {
    pub block_size: usize,
    pub num_blocks: usize,
    pub tol: f64,
    pub max_iters: usize,
    pub max_restarts: usize,
    /// Report residuals every this many iterations; non-positive disables reports.
    pub output_frequency: i64,
    pub latency: usize,
    pub verbosity: MsgType,
    pub seed: u64,
}

impl Default for BlockGmresParams {
    fn default() -> Self {
        Self {
            block_size: 100,
            num_blocks: 50,
            tol: 1e-5,
            max_iters: 5000,
            max_restarts: 1000,
            output_frequency: -1,
            latency: 1,
            verbosity: MsgType::default(),
            seed: 0,
        }
    }
}

/// Block GMRES solver.
pub struct BlockGmresSolver {
    pub conv: Convergence,
    pub block_size: usize,
    /// Block iterations per restart cycle.
    pub num_blocks: usize,
    /// Apply the right preconditioner every `latency` iterations.
    pub latency: usize,
    pub output_frequency: i64,
    pub verbosity: MsgType,
    pub seed: u64,
    /// Called after every block iteration with the iteration count and the relative residual
    /// estimate of every column.
    pub monitor: Option<Box<dyn FnMut(usize, &[f64])>>,
    /// Largest relative residual estimate after every iteration.
    pub residual_history: Vec<f64>,
    /// Iterations of the current solve over all groups; drives the latency schedule.
    solve_iters: usize,
}

/// Why a restart cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CycleExit {
    Converged,
    Full,
    Budget,
    Exhausted { column: usize },
}

impl BlockGmresSolver {
    pub fn new(tol: f64, max_iters: usize, num_blocks: usize) -> Self {
        let defaults = BlockGmresParams::default();
        Self {
            conv: Convergence::new(tol, max_iters, defaults.max_restarts),
            block_size: 1,
            num_blocks,
            latency: 1,
            output_frequency: defaults.output_frequency,
            verbosity: defaults.verbosity,
            seed: defaults.seed,
            monitor: None,
            residual_history: Vec::new(),
            solve_iters: 0,
        }
    }

    pub fn from_params(p: &BlockGmresParams) -> Self {
        Self::new(p.tol, p.max_iters, p.num_blocks)
            .with_block_size(p.block_size)
            .with_max_restarts(p.max_restarts)
            .with_latency(p.latency)
            .with_output_frequency(p.output_frequency)
            .with_verbosity(p.verbosity)
            .with_seed(p.seed)
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }
    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.conv.max_restarts = max_restarts;
        self
    }
    pub fn with_latency(mut self, latency: usize) -> Self {
        self.latency = latency;
        self
    }
    pub fn with_output_frequency(mut self, frequency: i64) -> Self {
        self.output_frequency = frequency;
        self
    }
    pub fn with_verbosity(mut self, verbosity: MsgType) -> Self {
        self.verbosity = verbosity;
        self
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    /// Set a callback to monitor residual estimates during the solve.
    pub fn with_monitor<F>(mut self, f: F) -> Self
    where
        F: FnMut(usize, &[f64]) + 'static,
    {
        self.monitor = Some(Box::new(f));
        self
    }

    fn says(&self, what: MsgType) -> bool {
        self.verbosity.intersects(what)
    }

    /// Solve the problem in place, leaving the best iterate in its unknown block.
    ///
    /// # Returns
    /// * `Ok(SolveStats)` whether or not the tolerance was met
    /// * `Err(KError)` for setup errors (problem not set, bad parameters)
    pub fn solve(&mut self, problem: &mut LinearProblem) -> Result<SolveStats, KError> {
        if !problem.is_set() {
            return Err(KError::ProblemNotSet);
        }
        if self.block_size == 0 || self.num_blocks == 0 || self.latency == 0 {
            return Err(KError::DimensionError(format!(
                "block size {}, {} blocks per cycle and latency {} must all be positive",
                self.block_size, self.num_blocks, self.latency
            )));
        }
        let n = problem.rhs().global_rows();
        let s = if self.block_size > n {
            if self.says(MsgType::WARNINGS) {
                log::warn!("block size {} exceeds the problem size, using {n}", self.block_size);
            }
            n
        } else {
            self.block_size
        };
        let start = Instant::now();
        self.residual_history.clear();
        self.solve_iters = 0;

        let k = problem.num_rhs();
        let mut iterations = 0;
        let mut restarts = 0;
        let mut converged = true;
        for first in (0..k).step_by(s) {
            let cols = s.min(k - first);
            let (ok, group_iters, group_restarts) = self.solve_group(problem, first, cols, s)?;
            converged &= ok;
            iterations += group_iters;
            restarts += group_restarts;
        }

        let r = problem.compute_residual(problem.lhs())?;
        let baselines =
            Convergence::baselines(&problem.rhs().column_norms(), &problem.initial_residual()?.column_norms());
        let residuals = Convergence::relative(&r.column_norms(), &baselines);
        let final_residual = residuals.iter().copied().fold(0.0, f64::max);
        let status = if converged { SolveStatus::Converged } else { SolveStatus::Unconverged };
        if self.says(MsgType::FINAL_SUMMARY) {
            log::info!(
                "{}: {:?} after {iterations} block iterations and {restarts} restarts, max relative residual {:.3e}",
                problem.label(),
                status,
                final_residual
            );
        }
        if self.says(MsgType::TIMING_DETAILS) {
            log::info!("{}: solve time {:.3} s", problem.label(), start.elapsed().as_secs_f64());
        }
        Ok(SolveStats { status, iterations, restarts, final_residual, residuals })
    }

    /// Iterate on columns `first..first + cols` of the problem with a block of `s` columns.
    /// Returns `(converged, iterations, restarts)`.
    fn solve_group(
        &mut self,
        problem: &mut LinearProblem,
        first: usize,
        cols: usize,
        s: usize,
    ) -> Result<(bool, usize, usize), KError> {
        let map = Arc::clone(problem.rhs().map());
        let mut b = problem.rhs().columns(first, cols);
        let mut x = problem.lhs().columns(first, cols);
        if cols < s {
            let mut pad = BlockVector::zeros(Arc::clone(&map), s - cols);
            pad.randomize(self.seed.wrapping_add(0x9e37_79b9).wrapping_add(first as u64));
            b = b.widened(s - cols);
            b.set_columns(cols, &pad);
            x = x.widened(s - cols);
        }

        let mut mb = BlockVector::zeros(Arc::clone(&map), s);
        let start = problem
            .apply_left_prec(&b, &mut mb)
            .and_then(|_| self.residual(problem, &x, &b));
        let mut r = match start {
            Ok(r) => r,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                if self.says(MsgType::ERRORS) {
                    log::error!("{}: cannot start columns {first}..{}: {e}", problem.label(), first + cols);
                }
                return Ok((false, 0, 0));
            }
        };
        let baselines = Convergence::baselines(&mb.column_norms(), &r.column_norms());

        let mut iters = 0;
        let mut cycles = 0;
        let mut fatal = None;
        let mut converged = self.conv.check(&r.column_norms()[..cols], &baselines[..cols]);
        while !converged && cycles <= self.conv.max_restarts && iters < self.conv.max_iters {
            if cycles > 0 && self.says(MsgType::DEBUG) {
                log::debug!("{}: restart {cycles} after {iters} iterations", problem.label());
            }
            let outcome = self.cycle(problem, &mut x, &r, &baselines, cols, &mut iters, cycles);
            cycles += 1;
            let outcome = match self.residual(problem, &x, &b) {
                Ok(next) => {
                    r = next;
                    let true_norms = r.column_norms();
                    converged = self.conv.check(&true_norms[..cols], &baselines[..cols]);
                    if self.says(MsgType::STATUS_TEST_DETAILS) {
                        let rel = Convergence::relative(&true_norms[..cols], &baselines[..cols]);
                        log::info!("{}: cycle {cycles}, true relative residuals [{}]", problem.label(), fmt_norms(&rel));
                    }
                    outcome
                }
                Err(e) => {
                    converged = false;
                    outcome.and(Err(e))
                }
            };
            match outcome {
                Ok(CycleExit::Exhausted { column }) if !converged => {
                    if self.says(MsgType::WARNINGS) {
                        log::warn!(
                            "{}: {}",
                            problem.label(),
                            KError::OrthogonalizationBreakdown { iteration: iters, column }
                        );
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    if self.says(MsgType::ERRORS) {
                        log::error!("{}: iteration stopped: {e}", problem.label());
                    }
                    break;
                }
            }
        }

        // the iterate is kept even when the group ends in a fault
        problem.lhs_mut().set_columns(first, &x.columns(0, cols));
        match fatal {
            Some(e) => Err(e),
            None => Ok((converged, iters, cycles.saturating_sub(1))),
        }
    }

    /// `M_l (B − A X)`.
    fn residual(&self, problem: &LinearProblem, x: &BlockVector, b: &BlockVector) -> Result<BlockVector, KError> {
        let mut ax = BlockVector::zeros(Arc::clone(b.map()), x.ncols());
        problem.apply_operator(x, &mut ax)?;
        ax.scale(-C_ONE);
        ax.axpy(C_ONE, b)?;
        if !problem.has_left_prec() {
            return Ok(ax);
        }
        let mut r = BlockVector::zeros(Arc::clone(b.map()), x.ncols());
        problem.apply_left_prec(&ax, &mut r)?;
        Ok(r)
    }

    /// One restart cycle from residual `r`. `x` receives the least-squares update of every
    /// completed iteration even when the cycle ends with an error.
    #[allow(clippy::too_many_arguments)]
    fn cycle(
        &mut self,
        problem: &LinearProblem,
        x: &mut BlockVector,
        r: &BlockVector,
        baselines: &[f64],
        cols: usize,
        iters: &mut usize,
        cycle: usize,
    ) -> Result<CycleExit, KError> {
        let s = r.ncols();
        let mut arnoldi = BlockArnoldi::new(s, self.num_blocks, self.seed.wrapping_add(1 + cycle as u64));
        let (z, status) = arnoldi.start(r)?;
        if let StepStatus::Exhausted { column } = status {
            return Ok(CycleExit::Exhausted { column });
        }
        let mut qr = BlockHessenbergQr::new(s, self.num_blocks, &z)?;
        let mut basis: Vec<BlockVector> = Vec::with_capacity(self.num_blocks);

        let exit = self.fill_cycle(problem, &mut arnoldi, &mut qr, &mut basis, baselines, cols, iters);

        if qr.blocks() > 0 {
            let y = qr.solve();
            for (i, zi) in basis.iter().enumerate() {
                let yi = Mat::from_fn(s, s, |a, b| y[(i * s + a, b)]);
                x.add_product(C_ONE, zi, &yi)?;
            }
        }
        if !x.is_finite() {
            return Err(KError::SolveError("non-finite iterate".into()));
        }
        exit
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_cycle(
        &mut self,
        problem: &LinearProblem,
        arnoldi: &mut BlockArnoldi,
        qr: &mut BlockHessenbergQr,
        basis: &mut Vec<BlockVector>,
        baselines: &[f64],
        cols: usize,
        iters: &mut usize,
    ) -> Result<CycleExit, KError> {
        let s = arnoldi.block_size();
        while !qr.is_full() {
            if *iters >= self.conv.max_iters {
                return Ok(CycleExit::Budget);
            }
            let v = arnoldi
                .last()
                .ok_or_else(|| KError::SolveError("empty Krylov basis".into()))?;
            let map = Arc::clone(v.map());
            let zi = if problem.has_right_prec() && self.solve_iters % self.latency == 0 {
                let mut zi = BlockVector::zeros(Arc::clone(&map), s);
                problem.apply_right_prec(v, &mut zi)?;
                zi
            } else {
                v.clone()
            };
            let mut w = BlockVector::zeros(map, s);
            problem.apply_preconditioned_operator(&zi, &mut w)?;
            if !w.is_finite() {
                return Err(KError::SolveError(format!("non-finite operator output at iteration {}", *iters)));
            }
            let step = arnoldi.extend(w)?;
            qr.push_block(&step.h)?;
            basis.push(zi);
            *iters += 1;
            self.solve_iters += 1;

            let rel = Convergence::relative(&qr.residual_norms()[..cols], &baselines[..cols]);
            self.residual_history.push(rel.iter().copied().fold(0.0, f64::max));
            if let Some(ref mut monitor) = self.monitor {
                monitor(*iters, &rel);
            }
            if self.output_frequency > 0
                && *iters % self.output_frequency as usize == 0
                && self.says(MsgType::ITERATION_DETAILS)
            {
                log::info!("{}: iter {:5}, relative residual estimates [{}]", problem.label(), *iters, fmt_norms(&rel));
            }
            if self.says(MsgType::ORTHO_DETAILS) {
                log::debug!("iter {}: orthogonality error {:.3e}", *iters, arnoldi.orthogonality_error());
            }
            match step.status {
                StepStatus::Exhausted { column } => return Ok(CycleExit::Exhausted { column }),
                StepStatus::Deflated(count) if self.says(MsgType::ORTHO_DETAILS) => {
                    log::debug!("iter {}: {count} column(s) replaced by random directions", *iters);
                }
                _ => {}
            }
            if rel.iter().all(|&e| e <= self.conv.tol) {
                return Ok(CycleExit::Converged);
            }
        }
        Ok(CycleExit::Full)
    }
}

fn fmt_norms(values: &[f64]) -> String {
    values.iter().map(|v| format!("{v:.3e}")).collect::<Vec<_>>().join(", ")
}

impl Default for BlockGmresSolver {
    fn default() -> Self {
        Self::from_params(&BlockGmresParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Operator;
    use crate::core::C_ZERO;
    use crate::parallel::RowMap;
    use faer::c64;

    fn tridiagonal(n: usize) -> Mat<c64> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(4.0, 1.0)
            } else if i + 1 == j {
                c64::new(-1.0, 0.2)
            } else if j + 1 == i {
                c64::new(-0.5, 0.0)
            } else {
                C_ZERO
            }
        })
    }

    fn problem(n: usize, k: usize) -> (LinearProblem, BlockVector) {
        let map = Arc::new(RowMap::serial(n));
        let a: Arc<dyn Operator> = Arc::new(tridiagonal(n));
        let mut x_true = BlockVector::zeros(map.clone(), k);
        x_true.randomize(3);
        let mut b = BlockVector::zeros(map.clone(), k);
        a.apply(&x_true, &mut b).unwrap();
        let mut p = LinearProblem::new(a, BlockVector::zeros(map, k), b);
        p.set_problem().unwrap();
        (p, x_true)
    }

    #[test]
    fn converges_with_padded_group() {
        let (mut p, x_true) = problem(40, 3);
        let mut solver = BlockGmresSolver::new(1e-10, 500, 10).with_block_size(2);
        let stats = solver.solve(&mut p).unwrap();
        assert_eq!(stats.status, SolveStatus::Converged);
        assert!(stats.residuals.iter().all(|&r| r <= 1e-9));
        let mut err = p.lhs().clone();
        err.axpy(-C_ONE, &x_true).unwrap();
        assert!(err.column_norms().iter().all(|&e| e < 1e-7));
    }

    #[test]
    fn unset_problem_is_rejected() {
        let map = Arc::new(RowMap::serial(4));
        let a: Arc<dyn Operator> = Arc::new(tridiagonal(4));
        let mut p = LinearProblem::new(a, BlockVector::zeros(map.clone(), 1), BlockVector::zeros(map, 1));
        let mut solver = BlockGmresSolver::new(1e-8, 10, 5);
        assert!(matches!(solver.solve(&mut p), Err(KError::ProblemNotSet)));
    }

    #[test]
    fn zero_rhs_converges_immediately() {
        let map = Arc::new(RowMap::serial(5));
        let a: Arc<dyn Operator> = Arc::new(tridiagonal(5));
        let mut p = LinearProblem::new(a, BlockVector::zeros(map.clone(), 2), BlockVector::zeros(map, 2));
        p.set_problem().unwrap();
        let stats = BlockGmresSolver::new(1e-8, 10, 5).with_block_size(2).solve(&mut p).unwrap();
        assert!(stats.converged());
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn block_size_larger_than_problem_is_clamped() {
        let (mut p, _) = problem(6, 2);
        let stats = BlockGmresSolver::new(1e-10, 50, 10).with_block_size(10).solve(&mut p).unwrap();
        assert!(stats.converged());
    }
}
