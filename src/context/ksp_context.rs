//! Factory for block Krylov solves.
//!
//! `KspContext` holds everything needed to go from options to a solved system: where the
//! matrix comes from (generated from a spectrum or read from a Matrix Market file), how many
//! right-hand sides to build, which preconditioners to attach and the block GMRES parameters.
//!
//! # Usage
//!
//! 1. Construct a `KspContext` from parsed [`KspOptions`] or with [`KspContext::new`] and
//!    the `with_*` builders.
//! 2. Call `build_matrix`, then `build_problem` to get a [`LinearProblem`] whose right-hand
//!    sides are `B = A X*` for a seeded random `X*`, with `X = 0` as the initial guess.
//! 3. Call `solve_context` to run the configured solver.
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems. SIAM.

use crate::config::options::KspOptions;
use crate::context::pc_context::{Side, PC};
use crate::core::block::BlockVector;
use crate::core::traits::Operator;
use crate::error::KError;
use crate::generator::{GeneratorParams, SpectrumMatrixGenerator};
use crate::matrix::CsrMatrix;
use crate::parallel::{all_gather_c64, Comm};
use crate::preconditioner::Preconditioner;
use crate::problem::LinearProblem;
use crate::solver::{BlockGmresParams, BlockGmresSolver, LinearSolver};
use crate::utils::convergence::SolveStats;
use crate::utils::matrix_market::load_matrix_market;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the system matrix comes from.
#[derive(Debug, Clone)]
pub enum MatrixSource {
    /// Generated from a prescribed spectrum.
    Generated(GeneratorParams),
    /// Read from a Matrix Market coordinate file.
    MatrixMarket(PathBuf),
}

/// Context and configuration for a block Krylov solve.
#[derive(Debug, Clone)]
pub struct KspContext {
    pub source: MatrixSource,
    /// Number of right-hand sides.
    pub num_rhs: usize,
    /// Seed of the reference solution `X*`.
    pub seed: u64,
    /// Preconditioners, attached in order; at most one per side.
    pub pcs: Vec<PC>,
    pub gmres: BlockGmresParams,
}

/// A built problem together with the solution its right-hand sides were made from.
pub struct BuiltProblem {
    pub problem: LinearProblem,
    pub exact: BlockVector,
}

impl KspContext {
    pub fn new(source: MatrixSource, gmres: BlockGmresParams) -> Self {
        Self { source, num_rhs: 1, seed: gmres.seed, pcs: Vec::new(), gmres }
    }

    pub fn from_options(opts: &KspOptions) -> Self {
        let source = if opts.use_generator() {
            MatrixSource::Generated(opts.generator_params())
        } else {
            MatrixSource::MatrixMarket(opts.filename.clone())
        };
        let mut ctx = Self::new(source, opts.gmres_params()).with_num_rhs(opts.num_rhs).with_seed(opts.seed);
        if opts.use_precond() {
            ctx = ctx.with_pc(PC::Jacobi);
        }
        if opts.use_lsp() {
            ctx = ctx.with_pc(PC::LsPolynomial(opts.lsp_params()));
        }
        ctx
    }

    pub fn with_num_rhs(mut self, num_rhs: usize) -> Self {
        self.num_rhs = num_rhs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_pc(mut self, pc: PC) -> Self {
        self.pcs.push(pc);
        self
    }

    /// Generate or load the matrix, distributing its rows over `comm`.
    pub fn build_matrix(&self, comm: Arc<dyn Comm>) -> Result<CsrMatrix, KError> {
        match &self.source {
            MatrixSource::Generated(params) => {
                let generator = SpectrumMatrixGenerator::new(params)?;
                let map = Arc::new(crate::parallel::RowMap::uniform(generator.size(), comm));
                generator.build(map)
            }
            MatrixSource::MatrixMarket(path) => load_matrix_market(path, comm),
        }
    }

    /// Build `B = A X*` for a seeded random `X*`, start from `X = 0`, attach the
    /// preconditioners and compute the initial residual.
    ///
    /// A polynomial preconditioner that cannot be constructed is dropped with a warning and
    /// the solve proceeds without it; any other construction error is returned.
    pub fn build_problem(&self, a: Arc<CsrMatrix>) -> Result<BuiltProblem, KError> {
        if self.num_rhs == 0 {
            return Err(KError::DimensionError("at least one right-hand side is required".into()));
        }
        let map = Arc::clone(a.map());
        let op: Arc<dyn Operator> = a;
        let mut exact = BlockVector::zeros(Arc::clone(&map), self.num_rhs);
        exact.randomize(self.seed);
        let mut b = BlockVector::zeros(Arc::clone(&map), self.num_rhs);
        op.apply(&exact, &mut b)?;
        let x = BlockVector::zeros(Arc::clone(&map), self.num_rhs);

        let mut problem = LinearProblem::new(Arc::clone(&op), x, b).with_label("c64");
        // left preconditioners first, so a right one is fitted to the operator the solver sees
        let mut pcs: Vec<&PC> = self.pcs.iter().collect();
        pcs.sort_by_key(|pc| pc.side() == Side::Right);
        let mut seen_op: Arc<dyn Operator> = Arc::clone(&op);
        for pc in pcs {
            let side = pc.side();
            let target = match side {
                Side::Left => Arc::clone(&op),
                Side::Right => Arc::clone(&seen_op),
            };
            let built = match pc.build(target, Arc::clone(&map)) {
                Ok(built) => built,
                Err(KError::PreconditionerConstruction(msg)) => {
                    log::warn!("{} preconditioner unavailable ({msg}); solving without it", pc.name());
                    continue;
                }
                Err(e) => return Err(e),
            };
            match side {
                Side::Left if problem.has_left_prec() => {
                    return Err(KError::Unsupported("only one left preconditioner can be attached"));
                }
                Side::Right if problem.has_right_prec() => {
                    return Err(KError::Unsupported("only one right preconditioner can be attached"));
                }
                Side::Left => {
                    let shared: Arc<dyn Preconditioner> = Arc::from(built);
                    problem.set_left_prec(Box::new(Shared(Arc::clone(&shared))));
                    seen_op = Arc::new(LeftPreconditioned { a: Arc::clone(&op), left: shared });
                }
                Side::Right => problem.set_right_prec(built),
            }
        }
        problem.set_problem()?;
        Ok(BuiltProblem { problem, exact })
    }

    pub fn build_solver(&self) -> BlockGmresSolver {
        BlockGmresSolver::from_params(&self.gmres)
    }

    /// Solve the problem with the configured solver.
    pub fn solve_context(&self, problem: &mut LinearProblem) -> Result<SolveStats, KError> {
        let mut solver = self.build_solver();
        LinearSolver::solve(&mut solver, problem)
    }
}

/// `M_l A`, the operator a left-preconditioned solve iterates with.
struct LeftPreconditioned {
    a: Arc<dyn Operator>,
    left: Arc<dyn Preconditioner>,
}

impl Operator for LeftPreconditioned {
    fn nrows(&self) -> usize {
        self.a.nrows()
    }
    fn ncols(&self) -> usize {
        self.a.ncols()
    }
    fn apply(&self, x: &BlockVector, y: &mut BlockVector) -> Result<(), KError> {
        let mut ax = BlockVector::zeros(Arc::clone(y.map()), x.ncols());
        self.a.apply(x, &mut ax)?;
        self.left.apply(&ax, y)
    }
}

/// A preconditioner shared between the problem and [`LeftPreconditioned`].
struct Shared(Arc<dyn Preconditioner>);

impl Preconditioner for Shared {
    fn apply(&self, r: &BlockVector, z: &mut BlockVector) -> Result<(), KError> {
        self.0.apply(r, z)
    }
}

/// Write the solve outcome and the solution block as text.
///
/// The first line is `status iterations restarts`, followed by one final relative residual
/// per column and then one line per global row holding `re im` pairs for every column.
/// Every process takes part in gathering the solution; only rank 0 writes.
pub fn dump_data(path: impl AsRef<Path>, stats: &SolveStats, x: &BlockVector) -> Result<(), KError> {
    let comm = x.map().comm();
    let columns: Vec<Vec<_>> = (0..x.ncols()).map(|j| all_gather_c64(comm, x.col(j))).collect();
    if comm.rank() != 0 {
        return Ok(());
    }
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "{:?} {} {}", stats.status, stats.iterations, stats.restarts)?;
    for r in &stats.residuals {
        writeln!(out, "{r:.16e}")?;
    }
    for i in 0..x.global_rows() {
        let row: Vec<String> = columns.iter().map(|c| format!("{:.16e} {:.16e}", c[i].re, c[i].im)).collect();
        writeln!(out, "{}", row.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use crate::preconditioner::LsPolyParams;

    fn generated(n: usize) -> KspContext {
        let params = GeneratorParams { size: n, ..Default::default() };
        let gmres = BlockGmresParams { block_size: 2, num_blocks: 20, tol: 1e-8, ..Default::default() };
        KspContext::new(MatrixSource::Generated(params), gmres).with_num_rhs(2)
    }

    #[test]
    fn right_hand_sides_come_from_the_reference_solution() {
        let ctx = generated(20);
        let a = Arc::new(ctx.build_matrix(Arc::new(SerialComm)).unwrap());
        let built = ctx.build_problem(Arc::clone(&a)).unwrap();
        let r = built.problem.compute_residual(&built.exact).unwrap();
        assert!(r.column_norms().iter().all(|&v| v < 1e-12));
        assert!(built.problem.lhs().column_norms().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn solves_with_both_preconditioners() {
        let ctx = generated(30)
            .with_pc(PC::Jacobi)
            .with_pc(PC::LsPolynomial(LsPolyParams::default().with_degree(4)));
        let a = Arc::new(ctx.build_matrix(Arc::new(SerialComm)).unwrap());
        let mut built = ctx.build_problem(a).unwrap();
        assert!(built.problem.has_left_prec() && built.problem.has_right_prec());
        let stats = ctx.solve_context(&mut built.problem).unwrap();
        assert!(stats.converged(), "{stats:?}");
    }

    #[test]
    fn two_left_preconditioners_are_rejected() {
        let ctx = generated(10).with_pc(PC::Jacobi).with_pc(PC::Jacobi);
        let a = Arc::new(ctx.build_matrix(Arc::new(SerialComm)).unwrap());
        assert!(matches!(ctx.build_problem(a), Err(KError::Unsupported(_))));
    }

    #[test]
    fn missing_matrix_file_is_an_io_error() {
        let ctx = KspContext::new(MatrixSource::MatrixMarket("no/such/file.mtx".into()), Default::default());
        assert!(matches!(ctx.build_matrix(Arc::new(SerialComm)), Err(KError::Io(_))));
    }

    #[test]
    fn dump_writes_residuals_and_rows() {
        let ctx = generated(8);
        let a = Arc::new(ctx.build_matrix(Arc::new(SerialComm)).unwrap());
        let mut built = ctx.build_problem(a).unwrap();
        let stats = ctx.solve_context(&mut built.problem).unwrap();
        let path = std::env::temp_dir().join(format!("kryst_bgmres_dump_{}.dat", std::process::id()));
        dump_data(&path, &stats, built.problem.lhs()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + 2 + 8);
        assert!(lines[0].starts_with("Converged"));
        assert_eq!(lines[3].split_whitespace().count(), 4);
    }
}
