//! Matrix module: the distributed sparse operator and small dense kernels.

pub mod dense;
pub mod sparse;
pub use sparse::CsrMatrix;
