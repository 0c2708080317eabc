//! Run execution and caching service.

use std::path::Path;

use om_beamline::{Beamline, Topology};
use om_core::timing::Timer;
use om_envelope::MomentsProgressEvent;
use om_optics::{OpticsProgressEvent, chromaticity};
use om_project::schema::BeamlineDef;
use om_results::{
    EnvelopeRecord, EnvelopeReport, HistoryPoint, ParticleRecord, RunManifest, RunReport,
    RunStore, RunType, TrackReport, TwissRecord, TwissReport,
};
use om_track::{ParticleState, TrackParam};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::lattice_compile;
use crate::progress::{IterationProgress, RunProgressEvent, RunStage};
use crate::project_service;

/// What to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Twiss,
    Envelope,
    /// `turns` overrides the beamline's tracking settings
    Track { turns: Option<usize> },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub use_cache: bool,
    pub solver_version: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            solver_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Request to execute a run.
pub struct RunRequest<'a> {
    pub project_path: &'a Path,
    pub beamline_id: &'a str,
    pub mode: RunMode,
    pub options: RunOptions,
}

#[derive(Debug, Clone, Default)]
pub struct RunTimingSummary {
    pub compile_time_s: f64,
    pub solve_time_s: f64,
    pub save_time_s: f64,
    pub load_cache_time_s: f64,
    pub total_time_s: f64,
    /// Closed-orbit or space-charge iterations
    pub iterations: usize,
    pub residual: f64,
}

/// Response from a run execution.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub run_id: String,
    pub manifest: RunManifest,
    pub report: RunReport,
    pub loaded_from_cache: bool,
    pub timing: RunTimingSummary,
}

type ProgressCallback<'a> = Option<&'a mut dyn FnMut(RunProgressEvent)>;

fn emit_progress(
    progress_cb: &mut ProgressCallback<'_>,
    mode: &RunMode,
    stage: RunStage,
    started: &Timer,
    message: Option<String>,
    iteration: Option<IterationProgress>,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        let mut event =
            RunProgressEvent::stage(mode.clone(), stage, started.elapsed_s(), message);
        event.iteration = iteration;
        cb(event);
    }
}

/// Execute or load a run based on request.
pub fn ensure_run(request: &RunRequest) -> AppResult<RunResponse> {
    ensure_run_with_progress(request, None)
}

/// Execute or load a run and stream progress events.
pub fn ensure_run_with_progress(
    request: &RunRequest,
    mut progress_cb: ProgressCallback<'_>,
) -> AppResult<RunResponse> {
    let started = Timer::start("run");
    let mode = &request.mode;
    let mut timing = RunTimingSummary::default();

    emit_progress(
        &mut progress_cb,
        mode,
        RunStage::LoadingProject,
        &started,
        Some("Loading project".to_string()),
        None,
    );
    let project = project_service::load_project(request.project_path)?;
    let def = project_service::get_beamline(&project, request.beamline_id)?;

    emit_progress(
        &mut progress_cb,
        mode,
        RunStage::CheckingCache,
        &started,
        Some("Checking run cache".to_string()),
        None,
    );
    let run_type = match mode {
        RunMode::Twiss => RunType::Twiss,
        RunMode::Envelope => RunType::Envelope,
        RunMode::Track { turns } => RunType::Track {
            turns: turns.unwrap_or(def.settings.tracking.turns),
        },
    };
    let run_id = om_results::compute_run_id(def, &run_type, &request.options.solver_version)?;
    let store = RunStore::for_project(request.project_path)?;

    if request.options.use_cache && store.has_run(&run_id) {
        emit_progress(
            &mut progress_cb,
            mode,
            RunStage::LoadingCachedResult,
            &started,
            Some("Loading cached run".to_string()),
            None,
        );
        let load = Timer::start("load_cache");
        let manifest = store.load_manifest(&run_id)?;
        let report = store.load_report(&run_id)?;
        timing.load_cache_time_s = load.stop();
        timing.total_time_s = started.elapsed_s();
        emit_progress(
            &mut progress_cb,
            mode,
            RunStage::Completed,
            &started,
            None,
            None,
        );
        return Ok(RunResponse {
            run_id,
            manifest,
            report,
            loaded_from_cache: true,
            timing,
        });
    }

    emit_progress(
        &mut progress_cb,
        mode,
        RunStage::CompilingLattice,
        &started,
        Some(format!("Compiling beamline '{}'", def.id)),
        None,
    );
    let compile = Timer::start("compile");
    let beamline = lattice_compile::compile_beamline(def)?;
    timing.compile_time_s = compile.stop();

    let solve = Timer::start("solve");
    let report = match &run_type {
        RunType::Twiss => {
            emit_progress(
                &mut progress_cb,
                mode,
                RunStage::SolvingOptics,
                &started,
                None,
                None,
            );
            let report = run_twiss(def, &beamline, &mut |event| {
                let iteration = match event {
                    OpticsProgressEvent::StageEntered { stage } => IterationProgress {
                        stage: Some(stage.as_str().to_string()),
                        ..IterationProgress::default()
                    },
                    OpticsProgressEvent::OrbitIteration {
                        iteration,
                        residual,
                    }
                    | OpticsProgressEvent::Converged {
                        iterations: iteration,
                        residual,
                    } => IterationProgress {
                        iteration: Some(iteration),
                        residual: Some(residual),
                        stage: None,
                    },
                };
                emit_progress(
                    &mut progress_cb,
                    mode,
                    RunStage::SolvingOptics,
                    &started,
                    None,
                    Some(iteration),
                );
            })?;
            timing.iterations = report.iterations;
            timing.residual = report.residual;
            RunReport::Twiss(report)
        }
        RunType::Envelope => {
            emit_progress(
                &mut progress_cb,
                mode,
                RunStage::PropagatingEnvelope,
                &started,
                None,
                None,
            );
            let report = run_envelope(def, &beamline, &mut |event| {
                let iteration = match event {
                    MomentsProgressEvent::Baseline => IterationProgress {
                        stage: Some("baseline".to_string()),
                        ..IterationProgress::default()
                    },
                    MomentsProgressEvent::Iteration {
                        iteration,
                        residual,
                    }
                    | MomentsProgressEvent::Converged {
                        iterations: iteration,
                        residual,
                    } => IterationProgress {
                        iteration: Some(iteration),
                        residual: Some(residual),
                        stage: None,
                    },
                };
                emit_progress(
                    &mut progress_cb,
                    mode,
                    RunStage::PropagatingEnvelope,
                    &started,
                    None,
                    Some(iteration),
                );
            })?;
            timing.iterations = report.iterations;
            timing.residual = report.residual;
            RunReport::Envelope(report)
        }
        RunType::Track { turns } => {
            emit_progress(
                &mut progress_cb,
                mode,
                RunStage::Tracking,
                &started,
                Some(format!("Tracking {turns} turns")),
                None,
            );
            RunReport::Track(run_track(def, &beamline, *turns)?)
        }
    };
    timing.solve_time_s = solve.stop();

    emit_progress(
        &mut progress_cb,
        mode,
        RunStage::SavingResults,
        &started,
        None,
        None,
    );
    let save = Timer::start("save");
    let manifest = RunManifest::new(
        run_id.clone(),
        def.id.clone(),
        run_type,
        request.options.solver_version.clone(),
    );
    store.save_run(&manifest, &report)?;
    timing.save_time_s = save.stop();
    timing.total_time_s = started.elapsed_s();

    info!(
        run_id = %run_id,
        beamline = %def.id,
        kind = manifest.run_type.label(),
        total_s = timing.total_time_s,
        "run completed"
    );
    emit_progress(
        &mut progress_cb,
        mode,
        RunStage::Completed,
        &started,
        None,
        None,
    );

    Ok(RunResponse {
        run_id,
        manifest,
        report,
        loaded_from_cache: false,
        timing,
    })
}

/// Name of the element ending at boundary `index` ("START" for 0).
fn boundary_name(beamline: &Beamline, index: usize) -> String {
    index
        .checked_sub(1)
        .and_then(|i| beamline.elements().get(i))
        .map_or_else(|| "START".to_string(), |e| e.name.clone())
}

fn run_twiss(
    def: &BeamlineDef,
    beamline: &Beamline,
    progress: &mut dyn FnMut(OpticsProgressEvent),
) -> AppResult<TwissReport> {
    let settings = &def.settings.optics;
    let config = lattice_compile::optics_config(settings);
    let solution = om_optics::solve_with_progress(beamline, &config, progress)?;

    let chroma = match settings.chromaticity_step {
        Some(step) if beamline.topology() == Topology::Ring => {
            Some(chromaticity(beamline, &config, step)?)
        }
        _ => None,
    };

    let records = solution
        .twiss
        .iter()
        .zip(&solution.orbit)
        .enumerate()
        .map(|(i, (t, orbit))| TwissRecord {
            element: boundary_name(beamline, i),
            s_m: t.s,
            beta_x_m: t.beta_x,
            alpha_x: t.alpha_x,
            beta_y_m: t.beta_y,
            alpha_y: t.alpha_y,
            disp_x_m: t.disp_x,
            disp_px: t.disp_px,
            disp_y_m: t.disp_y,
            disp_py: t.disp_py,
            mu_x: t.mu_x,
            mu_y: t.mu_y,
            orbit: [orbit[0], orbit[1], orbit[2], orbit[3], orbit[4], orbit[5]],
        })
        .collect();

    Ok(TwissReport {
        qx: solution.tunes.map(|t| t.qx),
        qy: solution.tunes.map(|t| t.qy),
        qs: solution.tunes.and_then(|t| t.qs),
        xi_x: chroma.map(|c| c.xi_x),
        xi_y: chroma.map(|c| c.xi_y),
        coupled: solution.coupled,
        iterations: solution.iterations,
        residual: solution.residual,
        records,
    })
}

fn run_envelope(
    def: &BeamlineDef,
    beamline: &Beamline,
    progress: &mut dyn FnMut(MomentsProgressEvent),
) -> AppResult<EnvelopeReport> {
    let env = def.settings.envelope.as_ref().ok_or_else(|| {
        AppError::InvalidInput(format!(
            "beamline '{}' has no envelope settings",
            def.id
        ))
    })?;
    let sigma0 = lattice_compile::initial_sigma(env);
    let config = lattice_compile::moments_config(env);
    let solution = om_envelope::propagate_with_progress(beamline, &sigma0, &config, progress)?;

    let records = solution
        .envelope
        .iter()
        .enumerate()
        .map(|(i, p)| EnvelopeRecord {
            element: boundary_name(beamline, i),
            s_m: p.s,
            sigma_x_m: p.sigma_x,
            sigma_y_m: p.sigma_y,
            sigma_z_m: p.sigma_z,
            emittance_x_m: p.emittance_x,
            emittance_y_m: p.emittance_y,
            emittance_z_m: p.emittance_z,
        })
        .collect();

    Ok(EnvelopeReport {
        space_charge: solution.space_charge,
        iterations: solution.iterations,
        residual: solution.residual,
        records,
    })
}

fn coords(p: &TrackParam) -> [f64; 6] {
    let c = &p.coords;
    [c[0], c[1], c[2], c[3], c[4], c[5]]
}

fn run_track(def: &BeamlineDef, beamline: &Beamline, turns: usize) -> AppResult<TrackReport> {
    let tracking = &def.settings.tracking;
    let particles = lattice_compile::initial_particles(tracking);
    if particles.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "beamline '{}' has no particles to track",
            def.id
        )));
    }
    let config = lattice_compile::track_config(tracking);
    let result = om_track::track(beamline, &particles, turns, &config)?;

    let records = result
        .particles
        .iter()
        .zip(&result.history)
        .enumerate()
        .map(|(index, (p, history))| {
            let (lost_element_index, lost_turn, loss_reason) = match p.state {
                ParticleState::Alive => (None, None, None),
                ParticleState::Lost {
                    element_index,
                    turn,
                    reason,
                } => (
                    Some(element_index),
                    Some(turn),
                    Some(reason.as_str().to_string()),
                ),
            };
            ParticleRecord {
                index,
                coords: coords(p),
                turn: p.turn,
                alive: p.is_alive(),
                lost_element: lost_element_index
                    .and_then(|i| beamline.elements().get(i))
                    .map(|e| e.name.clone()),
                lost_element_index,
                lost_turn,
                loss_reason,
                history: history
                    .iter()
                    .map(|h| HistoryPoint {
                        turn: h.turn,
                        coords: coords(h),
                    })
                    .collect(),
            }
        })
        .collect();

    Ok(TrackReport {
        turns,
        fast: config.fast,
        particles: records,
    })
}

/// List stored runs of a project, optionally for one beamline.
pub fn list_runs(project_path: &Path, beamline_id: Option<&str>) -> AppResult<Vec<RunManifest>> {
    let store = RunStore::for_project(project_path)?;
    Ok(match beamline_id {
        Some(id) => store.list_runs(id)?,
        None => store.list_all_runs()?,
    })
}

/// Load a stored run.
pub fn load_run(project_path: &Path, run_id: &str) -> AppResult<(RunManifest, RunReport)> {
    let store = RunStore::for_project(project_path)?;
    let manifest = store.load_manifest(run_id)?;
    let report = store.load_report(run_id)?;
    Ok((manifest, report))
}
