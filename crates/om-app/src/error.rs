//! Error types for the om-app service layer.

use std::path::PathBuf;

/// Application error shared by the CLI and any other front end.
///
/// Solver failures keep their typed source so callers can tell an unstable
/// lattice from a convergence problem.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Project error: {0}")]
    Project(#[from] om_project::ProjectError),

    #[error("Failed to write project file: {path}")]
    ProjectFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Beamline not found: {0}")]
    BeamlineNotFound(String),

    #[error("Lattice compilation failed: {0}")]
    Compile(String),

    #[error("Beamline error: {0}")]
    Beamline(#[from] om_beamline::BeamlineError),

    #[error("Optics solve failed: {0}")]
    Optics(#[from] om_optics::OpticsError),

    #[error("Envelope propagation failed: {0}")]
    Envelope(#[from] om_envelope::EnvelopeError),

    #[error("Tracking failed: {0}")]
    Track(#[from] om_track::TrackError),

    #[error("Results error: {0}")]
    Results(#[from] om_results::ResultsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for om-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<om_elements::ElementError> for AppError {
    fn from(err: om_elements::ElementError) -> Self {
        AppError::Compile(err.to_string())
    }
}

impl AppError {
    /// The lattice itself has no periodic solution.
    pub fn is_unstable_lattice(&self) -> bool {
        matches!(
            self,
            AppError::Optics(om_optics::OpticsError::UnstableLattice { .. })
        )
    }
}
