//! Context module: factories that turn options into a ready-to-solve problem.
//!
//! Contexts encapsulate matrix construction, preconditioner selection and solver parameters.
//!
//! Modules:
//! - [`ksp_context`]: the `KspContext` factory for block Krylov solves.
//! - [`pc_context`]: the `PC` preconditioner selector.
//!
//! # Example
//! ```rust,ignore
//! use kryst_bgmres::context::KspContext;
//! let ctx = KspContext::from_options(&opts);
//! let a = Arc::new(ctx.build_matrix(comm)?);
//! let mut built = ctx.build_problem(a)?;
//! let stats = ctx.solve_context(&mut built.problem)?;
//! ```

pub mod ksp_context;
pub use ksp_context::{dump_data, BuiltProblem, KspContext, MatrixSource};
pub mod pc_context;
pub use pc_context::{Side, PC};
