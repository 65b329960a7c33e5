//! Runtime configuration: command-line options for the driver.

pub mod options;
pub use options::KspOptions;
