//! Error types for optics solving.

use om_beamline::BeamlineError;
use om_elements::ElementError;
use om_linalg::{LinalgError, Plane};
use thiserror::Error;

/// Errors that can occur while solving for closed orbit and Twiss functions.
#[derive(Error, Debug, Clone)]
pub enum OpticsError {
    #[error("Invalid configuration: {what}")]
    InvalidConfiguration { what: String },

    #[error("Unstable lattice in plane {plane}: |trace|/2 = {half_trace}")]
    UnstableLattice { plane: Plane, half_trace: f64 },

    #[error(
        "Closed orbit did not converge after {iterations} iterations (residual = {residual:e})"
    )]
    ConvergenceFailure {
        iterations: usize,
        residual: f64,
        last_orbit: [f64; 6],
    },

    #[error("Solve cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    #[error("Beamline error: {0}")]
    Beamline(#[from] BeamlineError),

    #[error("Element error: {0}")]
    Element(#[from] ElementError),

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),
}

pub type OpticsResult<T> = Result<T, OpticsError>;

impl OpticsError {
    pub fn invalid(what: impl Into<String>) -> Self {
        OpticsError::InvalidConfiguration { what: what.into() }
    }

    /// Singular matrices surface through the linear algebra layer.
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            OpticsError::Linalg(LinalgError::Singular { .. })
                | OpticsError::Beamline(BeamlineError::Linalg(LinalgError::Singular { .. }))
        )
    }
}
