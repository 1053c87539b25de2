use thiserror::Error;

/// Failure conditions a caller may want to branch on.
///
/// Everything else is reported as a plain `anyhow` message. These variants travel
/// through `anyhow::Error` as well and can be recovered with
/// `err.downcast_ref::<IdentError>()`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IdentError {
    #[error("FNSI requires a single realization, signal has {realizations}.")]
    MultipleRealizations { realizations: usize },

    #[error("Unsupported discretization method \"{name}\".")]
    UnsupportedMethod { name: String },

    #[error("Ill-conditioned frequency at line {line} ({frequency} Hz).")]
    IllConditionedFrequency { line: usize, frequency: f64 },

    #[error("Nonlinear term {term} has zero variance and cannot be scaled.")]
    DegenerateNonlinearity { term: usize },

    #[error("Matrix has no principal logarithm (eigenvalue on the closed negative real axis).")]
    NoPrincipalLogarithm,
}
