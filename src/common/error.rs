//! Error types for the trajectory tracker

use thiserror::Error;

/// Main error type for the control pipeline
///
/// Every variant except `Config` describes a single failed control cycle and
/// is recovered by the control loop; none of them should end a session.
#[derive(Debug, Error)]
pub enum MpcError {
    /// Malformed or insufficient telemetry
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Singular or ill-conditioned least-squares system
    #[error("Polynomial fit failed: {0}")]
    FitFailure(String),

    /// The optimizer did not converge within its budget
    #[error("Solver diverged after {iterations} iterations: {reason}")]
    SolverDivergence { iterations: usize, reason: String },

    /// Invalid parameter file or parameter value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A global logger was already installed
    #[error("Logger initialisation failed: {0}")]
    Logger(#[from] log::SetLoggerError),
}

impl MpcError {
    /// Shorthand for building an `InvalidInput` error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        MpcError::InvalidInput(msg.into())
    }

    /// True for errors that only invalidate the current control cycle
    pub fn is_per_cycle(&self) -> bool {
        matches!(
            self,
            MpcError::InvalidInput(_)
                | MpcError::FitFailure(_)
                | MpcError::SolverDivergence { .. }
                | MpcError::Decode(_)
        )
    }
}

impl From<toml::de::Error> for MpcError {
    fn from(e: toml::de::Error) -> Self {
        MpcError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for MpcError {
    fn from(e: serde_json::Error) -> Self {
        MpcError::Decode(e.to_string())
    }
}

/// Result type alias for control pipeline operations
pub type MpcResult<T> = Result<T, MpcError>;
