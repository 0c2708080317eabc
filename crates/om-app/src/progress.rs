use crate::run_service::RunMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStage {
    LoadingProject,
    CheckingCache,
    LoadingCachedResult,
    CompilingLattice,
    SolvingOptics,
    PropagatingEnvelope,
    Tracking,
    SavingResults,
    Completed,
}

impl RunStage {
    pub fn label(&self) -> &'static str {
        match self {
            RunStage::LoadingProject => "Loading project",
            RunStage::CheckingCache => "Checking cache",
            RunStage::LoadingCachedResult => "Loading cached result",
            RunStage::CompilingLattice => "Compiling lattice",
            RunStage::SolvingOptics => "Solving optics",
            RunStage::PropagatingEnvelope => "Propagating envelope",
            RunStage::Tracking => "Tracking",
            RunStage::SavingResults => "Saving results",
            RunStage::Completed => "Completed",
        }
    }
}

/// Iteration detail from the closed-orbit or space-charge loop.
#[derive(Debug, Clone, Default)]
pub struct IterationProgress {
    pub iteration: Option<usize>,
    pub residual: Option<f64>,
    /// Solver stage name, e.g. "extract_periodic_twiss"
    pub stage: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub mode: RunMode,
    pub stage: RunStage,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
    pub iteration: Option<IterationProgress>,
}

impl RunProgressEvent {
    pub fn stage(
        mode: RunMode,
        stage: RunStage,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            mode,
            stage,
            elapsed_wall_s,
            message,
            iteration: None,
        }
    }
}
