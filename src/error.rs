use thiserror::Error;

pub type Result<T> = std::result::Result<T, IcaError>;

/// An error raised while cleaning process data, fitting the solver or
/// deriving monitoring statistics
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IcaError {
    /// Fewer than two usable variables survived cleaning
    #[error("at least 2 usable process variables required, {0} left after cleaning")]
    InsufficientVariables(usize),
    /// Not enough rows to whiten and fit meaningfully
    #[error("at least {expected} samples required, got {actual}")]
    InsufficientSamples { expected: usize, actual: usize },
    /// A non-finite value was produced while whitening the centered data
    #[error("whitening failed: {0}")]
    Whitening(String),
    /// A non-finite value was produced during fitting, reconstruction or
    /// statistics computation
    #[error("non-finite value encountered during {0}")]
    NumericalInstability(String),
    /// `transform`/`inverse_transform` called before a successful `fit`
    #[error("the solver has not been fitted yet")]
    NotFitted,
    /// Shape of the input does not match the fitted model
    #[error("dimension mismatch: expected {expected} columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Post-fit validation of the mixing matrix failed
    #[error("invalid mixing matrix: {0}")]
    InvalidMixingMatrix(String),
    /// A hyperparameter was set to an unusable value
    #[error("invalid value encountered: {0}")]
    InvalidValue(String),
    #[error("tolerance should be positive but is {0}")]
    InvalidTolerance(f32),
    /// The run was cancelled through its `CancelToken`
    #[error("analysis cancelled")]
    Cancelled,
    /// The background analysis thread died without producing a result
    #[error("background analysis thread panicked")]
    TaskPanicked,
    /// Errors encountered during linear algebra operations
    #[error(transparent)]
    Linalg(#[from] linfa_linalg::LinalgError),
}
