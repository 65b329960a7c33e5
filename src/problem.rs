//! Linear problem `A X = B` with several right-hand sides.
//!
//! The problem owns the unknown block `X` (updated in place by the solver), the right-hand
//! side block `B` and optional left and right preconditioners. `set_problem` validates the
//! shapes once and caches the initial residual `R0 = B − A X`.

use crate::core::block::BlockVector;
use crate::core::traits::Operator;
use crate::core::C_ONE;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use std::sync::Arc;

pub struct LinearProblem {
    a: Arc<dyn Operator>,
    x: BlockVector,
    b: BlockVector,
    left: Option<Box<dyn Preconditioner>>,
    right: Option<Box<dyn Preconditioner>>,
    r0: Option<BlockVector>,
    label: String,
}

impl LinearProblem {
    pub fn new(a: Arc<dyn Operator>, x: BlockVector, b: BlockVector) -> Self {
        Self { a, x, b, left: None, right: None, r0: None, label: String::from("block GMRES") }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Fixed preconditioner applied on the left: the solver works on `M A X = M B`.
    pub fn set_left_prec(&mut self, pc: Box<dyn Preconditioner>) {
        self.left = Some(pc);
    }

    /// Preconditioner applied on the right, `A M Y = B` with `X = M Y`.
    pub fn set_right_prec(&mut self, pc: Box<dyn Preconditioner>) {
        self.right = Some(pc);
    }

    pub fn has_left_prec(&self) -> bool {
        self.left.is_some()
    }

    pub fn has_right_prec(&self) -> bool {
        self.right.is_some()
    }

    /// Validate shapes and cache `R0 = B − A X`.
    pub fn set_problem(&mut self) -> Result<(), KError> {
        let n = self.a.nrows();
        if n == 0 {
            return Err(KError::DimensionError("operator has no rows".into()));
        }
        if self.a.ncols() != n {
            return Err(KError::ShapeMismatch(format!("operator is {}x{}, not square", n, self.a.ncols())));
        }
        if self.x.global_rows() != n || self.b.global_rows() != n {
            return Err(KError::ShapeMismatch(format!(
                "operator has {n} rows, X has {} and B has {}",
                self.x.global_rows(),
                self.b.global_rows()
            )));
        }
        if self.x.ncols() != self.b.ncols() || self.b.ncols() == 0 {
            return Err(KError::ShapeMismatch(format!(
                "X has {} columns and B has {}",
                self.x.ncols(),
                self.b.ncols()
            )));
        }
        self.x.check_same_shape(&self.b)?;
        let r0 = self.compute_residual(&self.x)?;
        self.r0 = Some(r0);
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.r0.is_some()
    }

    /// Cached `R0`; fails until `set_problem` has succeeded.
    pub fn initial_residual(&self) -> Result<&BlockVector, KError> {
        self.r0.as_ref().ok_or(KError::ProblemNotSet)
    }

    /// `B − A X` for any block `X` shaped like the unknowns.
    pub fn compute_residual(&self, x: &BlockVector) -> Result<BlockVector, KError> {
        let mut r = BlockVector::zeros(Arc::clone(self.b.map()), x.ncols());
        self.a.apply(x, &mut r)?;
        r.scale(-C_ONE);
        r.axpy(C_ONE, &self.b)?;
        Ok(r)
    }

    pub fn apply_operator(&self, v: &BlockVector, out: &mut BlockVector) -> Result<(), KError> {
        self.a.apply(v, out)
    }

    /// `out = M_left · v`, or a copy of `v` without a left preconditioner.
    pub fn apply_left_prec(&self, v: &BlockVector, out: &mut BlockVector) -> Result<(), KError> {
        match &self.left {
            Some(pc) => pc.apply(v, out),
            None => copy_into(v, out),
        }
    }

    /// `out = M_right · v`, or a copy of `v` without a right preconditioner.
    pub fn apply_right_prec(&self, v: &BlockVector, out: &mut BlockVector) -> Result<(), KError> {
        match &self.right {
            Some(pc) => pc.apply(v, out),
            None => copy_into(v, out),
        }
    }

    /// `out = M_left · A · v`.
    pub fn apply_preconditioned_operator(&self, v: &BlockVector, out: &mut BlockVector) -> Result<(), KError> {
        match &self.left {
            Some(pc) => {
                let mut tmp = BlockVector::zeros(Arc::clone(out.map()), v.ncols());
                self.a.apply(v, &mut tmp)?;
                pc.apply(&tmp, out)
            }
            None => self.a.apply(v, out),
        }
    }

    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.a
    }

    pub fn lhs(&self) -> &BlockVector {
        &self.x
    }

    pub fn lhs_mut(&mut self) -> &mut BlockVector {
        &mut self.x
    }

    pub fn rhs(&self) -> &BlockVector {
        &self.b
    }

    pub fn num_rhs(&self) -> usize {
        self.b.ncols()
    }
}

fn copy_into(v: &BlockVector, out: &mut BlockVector) -> Result<(), KError> {
    v.check_same_shape(out)?;
    out.as_mut_slice().copy_from_slice(v.as_slice());
    Ok(())
}
