// Jacobi preconditioner implementation

use crate::core::block::BlockVector;
use crate::core::traits::Operator;
use crate::core::C_ONE;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use faer::c64;
use num_traits::Zero;

/// Jacobi preconditioner: M⁻¹ = D⁻¹
pub struct Jacobi {
    pub(crate) inv_diag: Vec<c64>,
}

impl Jacobi {
    /// new with empty state; user must call `setup`.
    pub fn new() -> Self {
        Self { inv_diag: Vec::new() }
    }
}

impl Default for Jacobi {
    fn default() -> Self {
        Self::new()
    }
}

impl Preconditioner for Jacobi {
    fn setup(&mut self, a: &dyn Operator) -> Result<(), KError> {
        let diag = a
            .diagonal()
            .ok_or(KError::Unsupported("Jacobi needs an operator that exposes its diagonal"))?;
        // zero pivots leave the row unscaled
        self.inv_diag = diag
            .into_iter()
            .map(|d| if d.is_zero() { C_ONE } else { C_ONE / d })
            .collect();
        Ok(())
    }

    fn apply(&self, x: &BlockVector, y: &mut BlockVector) -> Result<(), KError> {
        if self.inv_diag.len() != x.local_rows() {
            return Err(KError::ShapeMismatch(format!(
                "Jacobi set up for {} local rows, block has {}",
                self.inv_diag.len(),
                x.local_rows()
            )));
        }
        x.check_same_shape(y)?;
        for j in 0..x.ncols() {
            let (src, dst) = (x.col(j), y.col_mut(j));
            for i in 0..src.len() {
                dst[i] = self.inv_diag[i] * src[i];
            }
        }
        Ok(())
    }
}
