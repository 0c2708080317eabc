//! Solver configuration.

use om_core::CancelToken;

use crate::twiss::InitialTwiss;

/// Dimensionality of the closed-orbit search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SolveMode {
    /// Transverse orbit at a fixed momentum offset.
    #[default]
    FourD,
    /// Full 6D orbit including synchrotron motion (needs RF).
    SixD,
}

impl SolveMode {
    pub fn dimension(self) -> usize {
        match self {
            SolveMode::FourD => 4,
            SolveMode::SixD => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolveMode::FourD => "4d",
            SolveMode::SixD => "6d",
        }
    }
}

/// Periodic optics solver configuration.
#[derive(Clone, Debug)]
pub struct OpticsConfig {
    /// Closed-orbit convergence threshold on max |T(X) - X|
    pub tolerance: f64,
    /// Maximum Newton iterations
    pub max_iterations: usize,
    /// Newton step relaxation, in (0, 1]
    pub relaxation: f64,
    pub mode: SolveMode,
    /// Momentum offset δ the 4D orbit is solved at
    pub momentum_offset: f64,
    /// Relative finite-difference step for Jacobians
    pub fd_step: f64,
    /// Off-diagonal x–y block size above which the one-turn map is
    /// treated as coupled
    pub coupling_tolerance: f64,
    /// Required for line topology
    pub initial_twiss: Option<InitialTwiss>,
    pub cancel: Option<CancelToken>,
}

impl Default for OpticsConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 50,
            relaxation: 1.0,
            mode: SolveMode::FourD,
            momentum_offset: 0.0,
            fd_step: 1e-8,
            coupling_tolerance: 1e-9,
            initial_twiss: None,
            cancel: None,
        }
    }
}

impl OpticsConfig {
    pub fn with_initial_twiss(mut self, twiss: InitialTwiss) -> Self {
        self.initial_twiss = Some(twiss);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
