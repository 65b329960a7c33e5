//! kryst-bgmres: restarted block GMRES over faer
//!
//! This crate solves `A X = B` for several right-hand sides with a restarted block GMRES,
//! optionally preconditioned by Jacobi scaling on the left and a least-squares polynomial
//! on the right, and generates non-Hermitian sparse test matrices with a prescribed spectrum.
//! Rows are distributed over processes through the [`parallel::Comm`] abstraction.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod generator;
pub mod matrix;
pub mod preconditioner;
pub mod problem;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use crate::core::*;
pub use error::*;
pub use generator::{GeneratorParams, SpectrumMatrixGenerator};
pub use matrix::*;
pub use preconditioner::*;
pub use problem::LinearProblem;
pub use solver::*;
pub use utils::*;
