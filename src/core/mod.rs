//! Core abstractions: the operator trait, the distributed block of column vectors, and the
//! local kernels and wrappers they are built from.

pub mod block;
pub mod traits;
pub mod wrappers;

pub use block::BlockVector;
pub use traits::Operator;

use faer::c64;

pub const C_ZERO: c64 = c64::new(0.0, 0.0);
pub const C_ONE: c64 = c64::new(1.0, 0.0);
