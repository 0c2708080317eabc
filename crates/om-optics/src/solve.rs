//! High-level periodic optics interface.

use om_beamline::{Beamline, Topology};
use om_core::ElementId;
use om_elements::{ElementKind, ReferenceParticle};
use om_linalg::{Matrix4, PhaseVector, Plane, RMatrix, coupling_norm, plane_block};
use std::f64::consts::TAU;
use tracing::{debug, info, warn};

use crate::config::{OpticsConfig, SolveMode};
use crate::error::{OpticsError, OpticsResult};
use crate::modes::{NormalModes, phase_step};
use crate::orbit::{find_closed_orbit, relinearize, trajectory};
use crate::twiss::{InitialTwiss, TwissParameters, Tunes, periodic_dispersion, plane_twiss};

/// Stages of one optics solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStage {
    Init,
    ComputeOneTurnMatrix,
    ExtractPeriodicTwiss,
    PropagateInitialTwiss,
    NonlinearClosedOrbitIteration,
    Converged,
    Failed,
}

impl SolveStage {
    pub fn as_str(self) -> &'static str {
        match self {
            SolveStage::Init => "init",
            SolveStage::ComputeOneTurnMatrix => "compute_one_turn_matrix",
            SolveStage::ExtractPeriodicTwiss => "extract_periodic_twiss",
            SolveStage::PropagateInitialTwiss => "propagate_initial_twiss",
            SolveStage::NonlinearClosedOrbitIteration => "closed_orbit_iteration",
            SolveStage::Converged => "converged",
            SolveStage::Failed => "failed",
        }
    }
}

/// Progress notifications emitted during a solve.
#[derive(Clone, Debug, PartialEq)]
pub enum OpticsProgressEvent {
    StageEntered { stage: SolveStage },
    OrbitIteration { iteration: usize, residual: f64 },
    Converged { iterations: usize, residual: f64 },
}

/// Result of a periodic (ring) or propagated (line) optics solve.
#[derive(Clone, Debug)]
pub struct OpticsSolution {
    /// Optics at every element boundary (N + 1 entries)
    pub twiss: Vec<TwissParameters>,
    /// Ring tunes (integer part included)
    pub tunes: Option<Tunes>,
    /// Closed orbit (ring) or reference trajectory (line) at every boundary
    pub orbit: Vec<PhaseVector>,
    /// Linear map of the full beamline about the orbit
    pub one_turn: RMatrix,
    pub coupled: bool,
    pub mode: SolveMode,
    pub momentum_offset: f64,
    /// Closed-orbit Newton iterations (0 when no iteration was needed)
    pub iterations: usize,
    pub residual: f64,
}

impl OpticsSolution {
    /// Optics at the entrance of an element.
    pub fn at(&self, id: ElementId) -> Option<&TwissParameters> {
        self.twiss.get(id.index())
    }

    pub fn max_beta(&self) -> (f64, f64) {
        self.twiss.iter().fold((0.0_f64, 0.0_f64), |(bx, by), t| {
            (bx.max(t.beta_x), by.max(t.beta_y))
        })
    }
}

/// Solve closed orbit and optics of a beamline.
pub fn solve_periodic_optics(
    beamline: &Beamline,
    config: &OpticsConfig,
) -> OpticsResult<OpticsSolution> {
    solve_with_progress(beamline, config, &mut |_| {})
}

/// Working data carried between stages.
struct SolveState {
    refs: Vec<ReferenceParticle>,
    positions: Vec<f64>,
    matrices: Vec<RMatrix>,
    one_turn: RMatrix,
    orbit: Vec<PhaseVector>,
    needs_orbit: bool,
    orbit_done: bool,
    iterations: usize,
    residual: f64,
    result: Option<(Vec<TwissParameters>, Option<Tunes>, bool)>,
}

/// Solve with progress notifications.
pub fn solve_with_progress(
    beamline: &Beamline,
    config: &OpticsConfig,
    progress: &mut dyn FnMut(OpticsProgressEvent),
) -> OpticsResult<OpticsSolution> {
    let mut state = SolveState {
        refs: Vec::new(),
        positions: beamline.positions(),
        matrices: Vec::new(),
        one_turn: RMatrix::identity(),
        orbit: Vec::new(),
        needs_orbit: false,
        orbit_done: false,
        iterations: 0,
        residual: 0.0,
        result: None,
    };

    let mut stage = SolveStage::Init;
    loop {
        progress(OpticsProgressEvent::StageEntered { stage });
        debug!(stage = stage.as_str(), "optics stage");

        let next = match stage {
            SolveStage::Init => init(beamline, config, &mut state),
            SolveStage::ComputeOneTurnMatrix => compute_one_turn(beamline, config, &mut state),
            SolveStage::ExtractPeriodicTwiss => extract_periodic(beamline, config, &mut state),
            SolveStage::PropagateInitialTwiss => propagate_line(beamline, config, &mut state),
            SolveStage::NonlinearClosedOrbitIteration => {
                closed_orbit_stage(beamline, config, &mut state, progress)
            }
            SolveStage::Converged | SolveStage::Failed => break,
        };

        match next {
            Ok(s) => stage = s,
            Err(e) => {
                progress(OpticsProgressEvent::StageEntered {
                    stage: SolveStage::Failed,
                });
                warn!(stage = stage.as_str(), error = %e, "optics solve failed");
                return Err(e);
            }
        }
    }

    let (twiss, tunes, coupled) = state
        .result
        .ok_or_else(|| OpticsError::invalid("solve finished without optics"))?;

    progress(OpticsProgressEvent::Converged {
        iterations: state.iterations,
        residual: state.residual,
    });
    if let Some(t) = &tunes {
        info!(qx = t.qx, qy = t.qy, coupled, "optics converged");
    } else {
        info!(coupled, "line optics propagated");
    }

    Ok(OpticsSolution {
        twiss,
        tunes,
        orbit: state.orbit,
        one_turn: state.one_turn,
        coupled,
        mode: config.mode,
        momentum_offset: config.momentum_offset,
        iterations: state.iterations,
        residual: state.residual,
    })
}

fn init(beamline: &Beamline, config: &OpticsConfig, state: &mut SolveState) -> OpticsResult<SolveStage> {
    if !(config.tolerance.is_finite() && config.tolerance > 0.0) {
        return Err(OpticsError::invalid("tolerance must be positive"));
    }
    if config.max_iterations == 0 {
        return Err(OpticsError::invalid("max_iterations must be at least 1"));
    }
    if !(config.relaxation > 0.0 && config.relaxation <= 1.0) {
        return Err(OpticsError::invalid("relaxation must be in (0, 1]"));
    }
    if !(config.fd_step.is_finite() && config.fd_step > 0.0) {
        return Err(OpticsError::invalid("finite difference step must be positive"));
    }
    if !(config.momentum_offset.is_finite() && config.momentum_offset > -1.0) {
        return Err(OpticsError::invalid("momentum offset must be finite and above -1"));
    }

    match beamline.topology() {
        Topology::Line => {
            let initial = config.initial_twiss.as_ref().ok_or_else(|| {
                OpticsError::invalid("line topology requires initial Twiss parameters")
            })?;
            initial.validate()?;
        }
        Topology::Ring => {
            if config.mode == SolveMode::SixD {
                let has_rf = beamline.elements().iter().any(|e| {
                    matches!(e.kind, ElementKind::Cavity { voltage_mv, .. } if voltage_mv != 0.0)
                });
                if !has_rf {
                    return Err(OpticsError::invalid("6D mode requires an RF cavity"));
                }
            }
        }
    }

    state.refs = beamline.references()?;
    state.needs_orbit = beamline.needs_orbit_iteration()
        || config.momentum_offset != 0.0
        || config.mode == SolveMode::SixD;
    Ok(SolveStage::ComputeOneTurnMatrix)
}

fn compute_one_turn(
    beamline: &Beamline,
    config: &OpticsConfig,
    state: &mut SolveState,
) -> OpticsResult<SolveStage> {
    state.matrices = beamline.element_matrices()?;
    state.one_turn = product(&state.matrices);

    let mut zero = PhaseVector::zeros();
    if config.mode == SolveMode::FourD {
        zero[5] = config.momentum_offset;
    }
    state.orbit = vec![zero; beamline.len() + 1];

    Ok(match beamline.topology() {
        Topology::Ring => SolveStage::ExtractPeriodicTwiss,
        Topology::Line => SolveStage::PropagateInitialTwiss,
    })
}

fn product(matrices: &[RMatrix]) -> RMatrix {
    matrices
        .iter()
        .fold(RMatrix::identity(), |acc, m| m * acc)
}

fn extract_periodic(
    beamline: &Beamline,
    config: &OpticsConfig,
    state: &mut SolveState,
) -> OpticsResult<SolveStage> {
    let m = state.one_turn;
    let m4: Matrix4 = m.fixed_view::<4, 4>(0, 0).into_owned();
    let coupled = coupling_norm(&m) > config.coupling_tolerance;

    let modes = if coupled {
        NormalModes::from_coupled(&m4)?.0
    } else {
        let x = plane_twiss(&plane_block(&m, Plane::X), Plane::X)?;
        let y = plane_twiss(&plane_block(&m, Plane::Y), Plane::Y)?;
        NormalModes::from_planes(&x, &y)
    };
    let dispersion = periodic_dispersion(&m)?;

    let qs = if config.mode == SolveMode::SixD {
        Some(plane_twiss(&plane_block(&m, Plane::Z), Plane::Z)?.mu / TAU)
    } else {
        None
    };

    if state.needs_orbit && !state.orbit_done {
        return Ok(SolveStage::NonlinearClosedOrbitIteration);
    }

    let twiss = propagate(&modes, dispersion, state, coupled);
    let last = twiss.last().map(|t| (t.mu_x, t.mu_y)).unwrap_or((0.0, 0.0));
    let tunes = Tunes {
        qx: last.0 / TAU,
        qy: last.1 / TAU,
        qs,
    };
    debug!(elements = beamline.len(), coupled, "periodic optics extracted");
    state.result = Some((twiss, Some(tunes), coupled));
    Ok(SolveStage::Converged)
}

fn closed_orbit_stage(
    beamline: &Beamline,
    config: &OpticsConfig,
    state: &mut SolveState,
    progress: &mut dyn FnMut(OpticsProgressEvent),
) -> OpticsResult<SolveStage> {
    let closed = find_closed_orbit(beamline, &state.refs, &state.one_turn, config, |iteration, residual| {
        if config.is_cancelled() {
            return Err(OpticsError::Cancelled { iterations: iteration });
        }
        progress(OpticsProgressEvent::OrbitIteration { iteration, residual });
        debug!(iteration, residual, "closed orbit iteration");
        Ok(())
    })?;

    state.matrices = relinearize(beamline, &state.refs, &closed.orbit)?;
    state.one_turn = product(&state.matrices);
    state.orbit = closed.orbit;
    state.iterations = closed.iterations;
    state.residual = closed.residual;
    state.orbit_done = true;
    Ok(SolveStage::ExtractPeriodicTwiss)
}

fn propagate_line(
    beamline: &Beamline,
    config: &OpticsConfig,
    state: &mut SolveState,
) -> OpticsResult<SolveStage> {
    let initial: InitialTwiss = config
        .initial_twiss
        .ok_or_else(|| OpticsError::invalid("line topology requires initial Twiss parameters"))?;

    if state.needs_orbit {
        if config.is_cancelled() {
            return Err(OpticsError::Cancelled { iterations: 0 });
        }
        let start = state.orbit.first().copied().unwrap_or_else(PhaseVector::zeros);
        state.orbit = trajectory(beamline, &state.refs, start)?;
        state.matrices = relinearize(beamline, &state.refs, &state.orbit)?;
        state.one_turn = product(&state.matrices);
        state.orbit_done = true;
    }

    let modes = NormalModes::uncoupled(
        initial.beta_x,
        initial.alpha_x,
        initial.beta_y,
        initial.alpha_y,
    );
    let dispersion = [
        initial.disp_x,
        initial.disp_px,
        initial.disp_y,
        initial.disp_py,
    ];
    let coupled = state
        .matrices
        .iter()
        .any(|m| coupling_norm(m) > config.coupling_tolerance);
    let twiss = propagate(&modes, dispersion, state, coupled);
    state.result = Some((twiss, None, coupled));
    Ok(SolveStage::Converged)
}

/// Transport modes and dispersion through every element.
fn propagate(
    initial: &NormalModes,
    dispersion: [f64; 4],
    state: &SolveState,
    coupled: bool,
) -> Vec<TwissParameters> {
    let p0 = state.refs[0].momentum_mev();
    let mut modes = initial.clone();
    let mut d = PhaseVector::from_column_slice(&[
        dispersion[0],
        dispersion[1],
        dispersion[2],
        dispersion[3],
        0.0,
        1.0,
    ]);
    let mut mu = [0.0_f64; 2];
    let mut phases = modes.phases();

    let mut out = Vec::with_capacity(state.matrices.len() + 1);
    out.push(twiss_at(state.positions[0], &modes, 1.0, &d, mu, coupled));

    for (i, m) in state.matrices.iter().enumerate() {
        let m4: Matrix4 = m.fixed_view::<4, 4>(0, 0).into_owned();
        modes = modes.propagate(&m4);
        d = m * d;
        // Only the δ-driven part is dispersion; drop z.
        d[4] = 0.0;

        let next = modes.phases();
        mu[0] += phase_step(phases[0], next[0]);
        mu[1] += phase_step(phases[1], next[1]);
        phases = next;

        let scale = state.refs[i + 1].momentum_mev() / p0;
        out.push(twiss_at(state.positions[i + 1], &modes, scale, &d, mu, coupled));
    }
    out
}

fn twiss_at(
    s: f64,
    modes: &NormalModes,
    scale: f64,
    d: &PhaseVector,
    mu: [f64; 2],
    coupled: bool,
) -> TwissParameters {
    let b = modes.betas(scale);
    let norm = if d[5] != 0.0 { d[5] } else { 1.0 };
    TwissParameters {
        s,
        beta_x: b.beta_1x,
        alpha_x: b.alpha_1x,
        beta_y: b.beta_2y,
        alpha_y: b.alpha_2y,
        disp_x: d[0] / norm,
        disp_px: d[1] / norm,
        disp_y: d[2] / norm,
        disp_py: d[3] / norm,
        mu_x: mu[0],
        mu_y: mu[1],
        modes: coupled.then_some(b),
    }
}
