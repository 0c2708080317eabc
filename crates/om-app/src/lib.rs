//! Shared application service layer for OptiM.
//!
//! Front ends go through this crate to load projects, compile beamline
//! documents into solver inputs, execute or reuse cached runs and query
//! their reports.

pub mod error;
pub mod lattice_compile;
pub mod progress;
pub mod project_service;
pub mod query;
pub mod run_service;

// Re-export key types for convenience
pub use error::{AppError, AppResult};
pub use lattice_compile::compile_beamline;
pub use progress::{IterationProgress, RunProgressEvent, RunStage};
pub use project_service::{
    BeamlineSummary, get_beamline, list_beamlines, load_project, save_project, validate_project,
};
pub use query::{
    RunSummary, extract_envelope_series, extract_twiss_series, get_run_summary, particle_series,
};
pub use run_service::{
    RunMode, RunOptions, RunRequest, RunResponse, RunTimingSummary, ensure_run,
    ensure_run_with_progress, list_runs, load_run,
};
