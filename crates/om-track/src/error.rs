//! Error types for particle tracking.

use om_beamline::BeamlineError;
use thiserror::Error;

/// Errors that abort a tracking run.
///
/// Particle losses are not errors; they are recorded on each particle.
#[derive(Error, Debug, Clone)]
pub enum TrackError {
    #[error("Invalid configuration: {what}")]
    InvalidConfiguration { what: String },

    #[error("Tracking cancelled at turn {turn}")]
    Cancelled { turn: usize },

    #[error("Beamline error: {0}")]
    Beamline(#[from] BeamlineError),
}

impl TrackError {
    pub fn invalid(what: impl Into<String>) -> Self {
        TrackError::InvalidConfiguration { what: what.into() }
    }
}
