//! Core linear-algebra traits for kryst-bgmres.

use crate::core::block::BlockVector;
use crate::error::KError;
use faer::c64;

/// Block operator application: Y ← A X.
///
/// Implementations own whatever communication they need; on return every process holds its
/// rows of `A X`.
pub trait Operator {
    /// Global number of rows.
    fn nrows(&self) -> usize;
    /// Global number of columns.
    fn ncols(&self) -> usize;
    /// Compute Y = A · X for every column of the block.
    fn apply(&self, x: &BlockVector, y: &mut BlockVector) -> Result<(), KError>;
    /// Diagonal entries of the locally owned rows, when cheaply available.
    fn diagonal(&self) -> Option<Vec<c64>> {
        None
    }
}
