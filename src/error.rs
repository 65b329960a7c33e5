use thiserror::Error;

// Unified error type for kryst-bgmres

#[derive(Error, Debug)]
pub enum KError {
    #[error("dimension error: {0}")]
    DimensionError(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("preconditioner construction failed: {0}")]
    PreconditionerConstruction(String),
    #[error("orthogonalization breakdown at iteration {iteration}, block column {column}")]
    OrthogonalizationBreakdown { iteration: usize, column: usize },
    #[error("linear problem is not set; call set_problem() first")]
    ProblemNotSet,
    #[error("solve error: {0}")]
    SolveError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl KError {
    /// Setup errors abort a solve; everything else is recovered as an unconverged result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KError::DimensionError(_) | KError::ShapeMismatch(_) | KError::ProblemNotSet
        )
    }
}
