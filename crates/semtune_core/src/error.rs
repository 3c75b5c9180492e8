//! Error taxonomy shared by the analyzer, score function and optimizers.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NoiseError>;

/// Errors reported to the caller. None of them are retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NoiseError {
    /// Degenerate image geometry or samples (fewer than two pixels,
    /// non-finite values, mismatched reference shape).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed configuration: zero total score weight, inverted parameter
    /// bounds, non-positive step, missing parameters.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A parameter value outside its declared bounds or off its grid reached a
    /// filter. The optimizers snap every candidate first, so this indicates an
    /// internal inconsistency.
    #[error("parameter '{filter}.{name}' = {value} is outside [{min}, {max}] or off its grid")]
    ParameterOutOfRange {
        /// Filter the parameter belongs to.
        filter: String,
        /// Parameter name.
        name: String,
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// Grid search coarse phase needs more evaluations than the budget allows.
    #[error("coarse grid needs {required} evaluations but the budget is {budget}")]
    SearchSpaceTooLarge {
        /// Size of the Phase-1 Cartesian product.
        required: usize,
        /// `max_evaluations` supplied by the caller.
        budget: usize,
    },
}

impl NoiseError {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        NoiseError::InvalidInput(msg.into())
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        NoiseError::InvalidConfig(msg.into())
    }
}
