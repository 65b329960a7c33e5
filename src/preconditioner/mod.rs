//! Preconditioners for the block solver.
//!
//! This module defines the Preconditioner trait and its two implementations: Jacobi diagonal
//! scaling and the least-squares polynomial preconditioner.

use crate::core::block::BlockVector;
use crate::core::traits::Operator;
use crate::error::KError;

/// A preconditioner M ≈ A⁻¹ acting on whole blocks.
pub trait Preconditioner {
    /// Apply M to r, writing z = M r
    fn apply(&self, r: &BlockVector, z: &mut BlockVector) -> Result<(), KError>;
    /// Optionally: setup/factorize from A
    fn setup(&mut self, _a: &dyn Operator) -> Result<(), KError> { Ok(()) }
}

// Submodules for various preconditioners
pub mod jacobi;
pub mod lsp;

// Re-exports for convenience
pub use jacobi::Jacobi;
pub use lsp::{LsPolyParams, LsPolynomial};

