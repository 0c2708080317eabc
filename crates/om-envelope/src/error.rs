//! Error types for beam moment propagation.

use om_beamline::BeamlineError;
use om_elements::ElementError;
use om_linalg::LinalgError;
use thiserror::Error;

/// Errors that can occur while propagating beam second moments.
#[derive(Error, Debug, Clone)]
pub enum EnvelopeError {
    #[error("Invalid configuration: {what}")]
    InvalidConfiguration { what: String },

    #[error("Beam covariance is not positive definite (pivot {pivot}, value {value:e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },

    #[error("Beam moments became non-finite after element {index}")]
    NonFinite { index: usize },

    #[error(
        "Space-charge envelope did not converge after {iterations} iterations (change = {residual:e})"
    )]
    ConvergenceFailure { iterations: usize, residual: f64 },

    #[error("Envelope solve cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    #[error("Beamline error: {0}")]
    Beamline(#[from] BeamlineError),

    #[error("Element error: {0}")]
    Element(#[from] ElementError),

    #[error("Linear algebra error: {0}")]
    Linalg(LinalgError),
}

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

impl EnvelopeError {
    pub fn invalid(what: impl Into<String>) -> Self {
        EnvelopeError::InvalidConfiguration { what: what.into() }
    }
}

impl From<LinalgError> for EnvelopeError {
    fn from(e: LinalgError) -> Self {
        match e {
            LinalgError::NotPositiveDefinite { pivot, value } => {
                EnvelopeError::NotPositiveDefinite { pivot, value }
            }
            other => EnvelopeError::Linalg(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cholesky_failure_maps_to_not_positive_definite() {
        let err: EnvelopeError = LinalgError::NotPositiveDefinite {
            pivot: 2,
            value: -1.0,
        }
        .into();
        assert!(matches!(
            err,
            EnvelopeError::NotPositiveDefinite { pivot: 2, .. }
        ));
    }

    #[test]
    fn singular_stays_linalg() {
        let err: EnvelopeError = LinalgError::Singular { det: 0.0 }.into();
        assert!(matches!(err, EnvelopeError::Linalg(_)));
    }
}
