//! Errors shared by the optics crates.

use thiserror::Error;

pub type OmResult<T> = Result<T, OmError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OmError {
    #[error("{what} is not finite: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("{what} must be positive, got {value}")]
    NotPositive { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Invariant violated: {what}")]
    Invariant { what: &'static str },
}
