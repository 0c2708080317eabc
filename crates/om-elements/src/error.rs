//! Error types for element map computations.

use om_core::OmError;
use om_linalg::LinalgError;
use thiserror::Error;

/// Errors that can occur while building element maps.
#[derive(Error, Debug, Clone)]
pub enum ElementError {
    #[error("Invalid parameter in element '{element}': {what}")]
    InvalidParameter { element: String, what: &'static str },

    #[error("Non-physical value: {what}")]
    NonPhysical { what: &'static str },

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),
}

pub type ElementResult<T> = Result<T, ElementError>;

impl From<OmError> for ElementError {
    fn from(e: OmError) -> Self {
        match e {
            OmError::NonFinite { what, .. }
            | OmError::NotPositive { what, .. }
            | OmError::InvalidArg { what }
            | OmError::Invariant { what } => ElementError::NonPhysical { what },
        }
    }
}

impl From<ElementError> for OmError {
    fn from(e: ElementError) -> Self {
        match e {
            ElementError::InvalidParameter { what, .. } => OmError::InvalidArg { what },
            ElementError::NonPhysical { what } => OmError::InvalidArg { what },
            ElementError::Linalg(inner) => inner.into(),
        }
    }
}
