//! Error types for linear algebra primitives.

use om_core::OmError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Singular matrix (determinant = {det:e})")]
    Singular { det: f64 },

    #[error("Matrix not positive definite: pivot {pivot} = {value:e}")]
    NotPositiveDefinite { pivot: usize, value: f64 },

    #[error("Matrix not symmetric at ({row}, {col}): difference {diff:e}")]
    NotSymmetric { row: usize, col: usize, diff: f64 },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Decomposition did not converge: {what}")]
    NoConvergence { what: &'static str },
}

pub type LinalgResult<T> = Result<T, LinalgError>;

impl From<LinalgError> for OmError {
    fn from(e: LinalgError) -> Self {
        match e {
            LinalgError::Singular { .. } => OmError::InvalidArg {
                what: "singular matrix",
            },
            LinalgError::NotPositiveDefinite { .. } => OmError::InvalidArg {
                what: "matrix not positive definite",
            },
            LinalgError::NotSymmetric { .. } => OmError::Invariant {
                what: "matrix symmetry",
            },
            LinalgError::DimensionMismatch { .. } => OmError::InvalidArg {
                what: "dimension mismatch",
            },
            LinalgError::NoConvergence { what } => OmError::Invariant { what },
        }
    }
}
