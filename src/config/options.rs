//! Command-line options for the block GMRES driver.
//!
//! Every option is spelled `--ksp-…` and accepts both `--ksp-tol 1e-5` and `--ksp-tol=1e-5`.
//! Boolean switches come in pairs (`--ksp-verbose` / `--ksp-quiet`, …); the last one given
//! wins. [`KspOptions`] converts into the typed parameter structs of the solver, the
//! generator and the polynomial preconditioner.

use crate::generator::GeneratorParams;
use crate::preconditioner::LsPolyParams;
use crate::solver::BlockGmresParams;
use crate::utils::verbosity::MsgType;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "block_gmres",
    about = "Block GMRES with least-squares polynomial preconditioning on generated or Matrix Market matrices."
)]
pub struct KspOptions {
    /// Print messages and results (default on the root process).
    #[clap(long = "ksp-verbose", overrides_with = "quiet")]
    verbose: bool,
    #[clap(long = "ksp-quiet", overrides_with = "verbose")]
    quiet: bool,

    /// Run debugging checks.
    #[clap(long = "ksp-debug", overrides_with = "nodebug")]
    debug: bool,
    #[clap(long = "ksp-nodebug", overrides_with = "debug")]
    nodebug: bool,

    /// Print residuals every this many iterations (-1: never).
    #[clap(long = "ksp-frequency", default_value_t = -1, allow_negative_numbers = true)]
    pub frequency: i64,

    /// Relative residual tolerance used by the solver.
    #[clap(long = "ksp-tol", default_value_t = 1e-5)]
    pub tol: f64,

    /// Number of right-hand sides to be solved for.
    #[clap(long = "ksp-num-rhs", default_value_t = 2)]
    pub num_rhs: usize,

    /// Block size to be used by the solver.
    #[clap(long = "ksp-block-size", default_value_t = 100)]
    pub block_size: usize,

    /// Use a diagonal preconditioner.
    #[clap(long = "ksp-use-precond", overrides_with = "no_precond")]
    use_precond: bool,
    #[clap(long = "ksp-no-precond", overrides_with = "use_precond")]
    no_precond: bool,

    /// Number of blocks in the Krylov basis.
    #[clap(long = "ksp-num-blocks", default_value_t = 50)]
    pub num_blocks: usize,

    /// Require increased accuracy from higher precision scalar types.
    #[clap(long = "ksp-reduce-tol", overrides_with = "fixed_tol")]
    reduce_tol: bool,
    #[clap(long = "ksp-fixed-tol", overrides_with = "reduce_tol")]
    fixed_tol: bool,

    /// Filename for the Matrix Market test matrix.
    #[clap(long = "ksp-filename", default_value = "utm300_cp.mtx")]
    pub filename: PathBuf,

    /// Print the full matrix after building it.
    #[clap(long = "ksp-print-matrix", overrides_with = "no_print_matrix")]
    print_matrix: bool,
    #[clap(long = "ksp-no-print-matrix", overrides_with = "print_matrix")]
    no_print_matrix: bool,

    /// All processes print, not only the root.
    #[clap(long = "ksp-all-print", overrides_with = "root_print")]
    all_print: bool,
    #[clap(long = "ksp-root-print", overrides_with = "all_print")]
    root_print: bool,

    /// Dump residuals and the solution to data.dat.
    #[clap(long = "ksp-dump-data", overrides_with = "no_dump_data")]
    dump_data: bool,
    #[clap(long = "ksp-no-dump-data", overrides_with = "dump_data")]
    no_dump_data: bool,

    /// Generate the test matrix from a prescribed spectrum instead of reading a file.
    #[clap(long = "ksp-usesmg2s", overrides_with = "no_usesmg2s")]
    usesmg2s: bool,
    #[clap(long = "ksp-no-usesmg2s", overrides_with = "usesmg2s")]
    no_usesmg2s: bool,

    /// Dimension of the generated matrix.
    #[clap(long = "ksp-smg2s-size", default_value_t = 10)]
    pub smg2s_size: usize,

    /// Length of the runs of ones in the nilpotent matrix.
    #[clap(long = "ksp-smg2s-continous", default_value_t = 4)]
    pub smg2s_continous: usize,

    /// Lower bandwidth of the initial matrix.
    #[clap(long = "ksp-smg2s-lbandwidth", default_value_t = 4)]
    pub smg2s_lbandwidth: usize,

    /// Spectrum file, one eigenvalue per line as `re` or `re im`.
    #[clap(long = "ksp-smg2s-spectra-file")]
    pub smg2s_spectra_file: Option<PathBuf>,

    /// Least-squares polynomial degree for preconditioning.
    #[clap(long = "ksp-lsp-degree", default_value_t = 10)]
    pub lsp_degree: usize,

    /// Apply the polynomial preconditioner every this many iterations.
    #[clap(long = "ksp-lsp-latency", default_value_t = 1)]
    pub lsp_latency: usize,

    /// Use least-squares polynomial preconditioning.
    #[clap(long = "ksp-use-lsp", overrides_with = "no_use_lsp")]
    use_lsp: bool,
    #[clap(long = "ksp-no-use-lsp", overrides_with = "use_lsp")]
    no_use_lsp: bool,

    /// Block iteration budget.
    #[clap(long = "ksp-max-iters", default_value_t = 5000)]
    pub max_iters: usize,

    /// Restart budget.
    #[clap(long = "ksp-max-restarts", default_value_t = 1000)]
    pub max_restarts: usize,

    /// Seed of the reference solution, the generator and the solver's random directions.
    #[clap(long = "ksp-seed", default_value_t = 0)]
    pub seed: u64,
}

impl KspOptions {
    /// Debug output implies verbose output.
    pub fn verbose(&self) -> bool {
        !self.quiet || self.debug
    }
    pub fn debug(&self) -> bool {
        self.debug
    }
    pub fn use_precond(&self) -> bool {
        self.use_precond
    }
    pub fn reduce_tol(&self) -> bool {
        self.reduce_tol
    }
    pub fn print_matrix(&self) -> bool {
        self.print_matrix
    }
    pub fn all_print(&self) -> bool {
        self.all_print
    }
    pub fn dump_data(&self) -> bool {
        self.dump_data
    }
    pub fn use_generator(&self) -> bool {
        self.usesmg2s
    }
    pub fn use_lsp(&self) -> bool {
        !self.no_use_lsp
    }

    pub fn verbosity(&self) -> MsgType {
        MsgType::from_switches(self.verbose(), self.debug())
    }

    /// Log level for a process; non-root processes stay silent unless `all_print`.
    pub fn log_level(&self, rank: usize) -> log::LevelFilter {
        if rank != 0 && !self.all_print() {
            log::LevelFilter::Off
        } else if self.debug() {
            log::LevelFilter::Debug
        } else if self.verbose() {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        }
    }

    pub fn gmres_params(&self) -> BlockGmresParams {
        BlockGmresParams {
            block_size: self.block_size,
            num_blocks: self.num_blocks,
            tol: self.tol,
            max_iters: self.max_iters,
            max_restarts: self.max_restarts,
            output_frequency: if self.verbose() { self.frequency } else { -1 },
            latency: self.lsp_latency,
            verbosity: self.verbosity(),
            seed: self.seed,
        }
    }

    pub fn generator_params(&self) -> GeneratorParams {
        GeneratorParams {
            size: self.smg2s_size,
            continuity: self.smg2s_continous,
            lower_bandwidth: self.smg2s_lbandwidth,
            spectra_file: self.smg2s_spectra_file.clone(),
            seed: self.seed,
            permute: None,
        }
    }

    pub fn lsp_params(&self) -> LsPolyParams {
        LsPolyParams::default().with_degree(self.lsp_degree).with_seed(self.seed.wrapping_add(0x5eed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> KspOptions {
        KspOptions::try_parse_from(std::iter::once("block_gmres").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_follow_the_driver() {
        let o = parse(&[]);
        assert!(o.verbose() && o.use_lsp() && !o.use_generator() && !o.debug());
        assert_eq!((o.num_rhs, o.block_size, o.num_blocks), (2, 100, 50));
        assert_eq!((o.smg2s_size, o.smg2s_continous, o.smg2s_lbandwidth), (10, 4, 4));
        assert_eq!((o.lsp_degree, o.lsp_latency, o.frequency), (10, 1, -1));
        assert_eq!((o.max_iters, o.max_restarts), (5000, 1000));
        assert_eq!(o.tol, 1e-5);
        assert_eq!(o.filename, PathBuf::from("utm300_cp.mtx"));
    }

    #[test]
    fn paired_switches_take_the_last_one() {
        let o = parse(&["--ksp-quiet", "--ksp-no-use-lsp", "--ksp-tol=1e-8", "--ksp-frequency", "-1"]);
        assert!(!o.verbose() && !o.use_lsp());
        assert_eq!(o.tol, 1e-8);
        let o = parse(&["--ksp-quiet", "--ksp-verbose", "--ksp-no-usesmg2s", "--ksp-usesmg2s"]);
        assert!(o.verbose() && o.use_generator());
    }

    #[test]
    fn debug_turns_verbose_back_on() {
        let o = parse(&["--ksp-quiet", "--ksp-debug", "--ksp-frequency", "5"]);
        assert!(o.verbose());
        assert!(o.verbosity().contains(MsgType::ITERATION_DETAILS));
        assert_eq!(o.gmres_params().output_frequency, 5);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(KspOptions::try_parse_from(["block_gmres", "--ksp-tol", "abc"]).is_err());
        assert!(KspOptions::try_parse_from(["block_gmres", "--ksp-block-size=-2"]).is_err());
    }

    #[test]
    fn non_root_is_silent_unless_all_print() {
        let o = parse(&[]);
        assert_eq!(o.log_level(1), log::LevelFilter::Off);
        assert_eq!(parse(&["--ksp-all-print"]).log_level(1), log::LevelFilter::Info);
    }
}
