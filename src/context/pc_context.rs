//! Preconditioner context and configuration for the block solver.
//!
//! This module defines the `PC` enum, which names the supported preconditioners and the side
//! of the problem each one is attached to. Jacobi diagonal scaling is a fixed left
//! preconditioner; the least-squares polynomial is a right preconditioner that the solver
//! may apply only every `latency` iterations, which is why it must stay on the right
//! (flexible) side.
//!
//! # Example
//!
//! ```rust,ignore
//! use kryst_bgmres::context::pc_context::PC;
//! let pc = PC::LsPolynomial(LsPolyParams::default().with_degree(10));
//! let side = pc.side();
//! ```

use crate::core::traits::Operator;
use crate::error::KError;
use crate::parallel::RowMap;
use crate::preconditioner::{Jacobi, LsPolyParams, LsPolynomial, Preconditioner};
use std::sync::Arc;

/// Unified preconditioner enum for all supported types.
#[derive(Debug, Clone)]
pub enum PC {
    /// Jacobi (diagonal scaling) preconditioner.
    Jacobi,
    /// Least-squares polynomial preconditioner.
    ///
    /// - `params`: polynomial degree, probe length and probe seed.
    LsPolynomial(LsPolyParams),
}

/// Which side of `A X = B` a preconditioner acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl PC {
    pub fn side(&self) -> Side {
        match self {
            PC::Jacobi => Side::Left,
            PC::LsPolynomial(_) => Side::Right,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PC::Jacobi => "Jacobi",
            PC::LsPolynomial(_) => "least-squares polynomial",
        }
    }

    /// Construct and set up the preconditioner for `op`, whose rows are distributed by `map`.
    pub fn build(&self, op: Arc<dyn Operator>, map: Arc<RowMap>) -> Result<Box<dyn Preconditioner>, KError> {
        match self {
            PC::Jacobi => {
                let mut pc = Jacobi::new();
                pc.setup(op.as_ref())?;
                Ok(Box::new(pc))
            }
            PC::LsPolynomial(params) => Ok(Box::new(LsPolynomial::build(op, map, params)?)),
        }
    }
}
