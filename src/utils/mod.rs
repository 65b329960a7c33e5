//! Utilities: convergence bookkeeping, verbosity classes and Matrix Market input.

pub mod convergence;
pub mod matrix_market;
pub mod verbosity;

pub use convergence::{Convergence, SolveStats, SolveStatus};
pub use verbosity::MsgType;
