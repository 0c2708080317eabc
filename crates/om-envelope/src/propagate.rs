//! Stepwise second-moment propagation with an optional space-charge fixed point.

use om_beamline::Beamline;
use om_elements::{Element, ReferenceParticle, space_charge_kick_matrix};
use om_linalg::{Plane, RMatrix, SymMatrix};
use tracing::{debug, info, warn};

use crate::config::{MomentsConfig, SpaceChargeConfig};
use crate::error::{EnvelopeError, EnvelopeResult};

/// Beam sizes and emittances at one element boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopePoint {
    pub s: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub sigma_z: f64,
    pub emittance_x: f64,
    pub emittance_y: f64,
    pub emittance_z: f64,
}

impl EnvelopePoint {
    fn from_sigma(s: f64, sigma: &SymMatrix) -> Self {
        Self {
            s,
            sigma_x: sigma.rms_size(Plane::X),
            sigma_y: sigma.rms_size(Plane::Y),
            sigma_z: sigma.rms_size(Plane::Z),
            emittance_x: sigma.plane_emittance(Plane::X),
            emittance_y: sigma.plane_emittance(Plane::Y),
            emittance_z: sigma.plane_emittance(Plane::Z),
        }
    }
}

/// Result of a moments propagation.
#[derive(Clone, Debug)]
pub struct MomentsSolution {
    /// Σ at every element boundary (N + 1 values, first is the input)
    pub sigmas: Vec<SymMatrix>,
    pub envelope: Vec<EnvelopePoint>,
    pub space_charge: bool,
    /// Fixed-point iterations after the space-charge-free seed
    pub iterations: usize,
    /// Max relative rms-size change of the last iteration
    pub residual: f64,
}

impl MomentsSolution {
    pub fn final_sigma(&self) -> Option<&SymMatrix> {
        self.sigmas.last()
    }

    pub fn max_size(&self, plane: Plane) -> f64 {
        self.sigmas
            .iter()
            .map(|s| s.rms_size(plane))
            .fold(0.0, f64::max)
    }
}

/// Progress notifications from the space-charge loop.
#[derive(Clone, Debug)]
pub enum MomentsProgressEvent {
    /// The space-charge-free envelope is available.
    Baseline,
    Iteration { iteration: usize, residual: f64 },
    Converged { iterations: usize, residual: f64 },
}

/// Propagate `initial` through the beamline.
///
/// Without space charge this is a single pass of Σ' = M Σ Mᵀ per element.
pub fn propagate_moments(
    beamline: &Beamline,
    initial: &SymMatrix,
    config: &MomentsConfig,
) -> EnvelopeResult<MomentsSolution> {
    propagate_with_progress(beamline, initial, config, &mut |_| {})
}

pub fn propagate_with_progress(
    beamline: &Beamline,
    initial: &SymMatrix,
    config: &MomentsConfig,
    progress: &mut dyn FnMut(MomentsProgressEvent),
) -> EnvelopeResult<MomentsSolution> {
    if !initial.is_finite() {
        return Err(EnvelopeError::invalid("initial sigma matrix is not finite"));
    }
    initial.validate_covariance()?;

    let positions = beamline.positions();
    let Some(sc) = config.space_charge.as_ref() else {
        let sigmas = linear_pass(beamline, initial)?;
        progress(MomentsProgressEvent::Baseline);
        return Ok(solution(&positions, sigmas, false, 0, 0.0));
    };
    sc.validate()?;

    let plan = SlicePlan::build(beamline, sc)?;
    let mut sizes = Vec::with_capacity(plan.kick_count());
    plan.sweep(initial, None, &mut sizes)?;
    progress(MomentsProgressEvent::Baseline);
    debug!(kicks = sizes.len(), "space-charge seed envelope");

    let mut residual = f64::INFINITY;
    for iteration in 1..=sc.max_iterations {
        if config.is_cancelled() {
            return Err(EnvelopeError::Cancelled {
                iterations: iteration - 1,
            });
        }
        let mut next = Vec::with_capacity(sizes.len());
        let sigmas = plan.sweep(initial, Some(&sizes), &mut next)?;
        residual = max_relative_change(&sizes, &next);
        debug!(iteration, residual, "space-charge iteration");
        progress(MomentsProgressEvent::Iteration {
            iteration,
            residual,
        });
        sizes = next;
        if residual < sc.tolerance {
            info!(iterations = iteration, residual, "space-charge envelope converged");
            progress(MomentsProgressEvent::Converged {
                iterations: iteration,
                residual,
            });
            return Ok(solution(&positions, sigmas, true, iteration, residual));
        }
    }

    warn!(
        iterations = sc.max_iterations,
        residual, "space-charge envelope did not converge"
    );
    Err(EnvelopeError::ConvergenceFailure {
        iterations: sc.max_iterations,
        residual,
    })
}

fn solution(
    positions: &[f64],
    sigmas: Vec<SymMatrix>,
    space_charge: bool,
    iterations: usize,
    residual: f64,
) -> MomentsSolution {
    let envelope = positions
        .iter()
        .zip(&sigmas)
        .map(|(s, sigma)| EnvelopePoint::from_sigma(*s, sigma))
        .collect();
    MomentsSolution {
        sigmas,
        envelope,
        space_charge,
        iterations,
        residual,
    }
}

/// Angular variance added by a scatterer.
fn scattering(element: &Element, reference: &ReferenceParticle) -> Option<SymMatrix> {
    let theta = element.scattering_angle(reference);
    if theta == 0.0 {
        return None;
    }
    let theta2 = theta * theta;
    let mut diffusion = SymMatrix::zeros();
    diffusion.set(1, 1, theta2);
    diffusion.set(3, 3, theta2);
    Some(diffusion)
}

fn check_finite(sigma: &SymMatrix, index: usize) -> EnvelopeResult<()> {
    if sigma.is_finite() {
        Ok(())
    } else {
        Err(EnvelopeError::NonFinite { index })
    }
}

fn linear_pass(beamline: &Beamline, initial: &SymMatrix) -> EnvelopeResult<Vec<SymMatrix>> {
    let refs = beamline.references()?;
    let matrices = beamline.element_matrices()?;
    let mut out = Vec::with_capacity(matrices.len() + 1);
    let mut sigma = *initial;
    out.push(sigma);
    for (index, (element, m)) in beamline.elements().iter().zip(&matrices).enumerate() {
        sigma = sigma.transform(m);
        if let Some(diffusion) = scattering(element, &refs[index]) {
            sigma = sigma.add(&diffusion);
        }
        check_finite(&sigma, index)?;
        out.push(sigma);
    }
    Ok(out)
}

/// Half-slice, space-charge kick at the slice centre, half-slice.
struct KickSlice {
    first: RMatrix,
    second: RMatrix,
    ds: f64,
    perveance: f64,
}

enum Step {
    /// Element transported without kicks (thin or zero-length).
    Whole(RMatrix),
    Sliced(Vec<KickSlice>),
}

struct SlicePlan {
    steps: Vec<(Step, Option<SymMatrix>)>,
}

impl SlicePlan {
    /// Slice maps only depend on the lattice, so they are built once.
    fn build(beamline: &Beamline, sc: &SpaceChargeConfig) -> EnvelopeResult<Self> {
        let refs = beamline.references()?;
        let mut steps = Vec::with_capacity(beamline.len());
        for (index, element) in beamline.elements().iter().enumerate() {
            let reference = refs[index];
            let diffusion = scattering(element, &reference);
            let len = element.length_m();
            if len == 0.0 {
                let m = element
                    .transfer_matrix(&reference)
                    .map_err(|e| element_error(beamline, index, e))?;
                steps.push((Step::Whole(m), diffusion));
                continue;
            }
            let n = (len / sc.max_slice_length).ceil().max(1.0) as usize;
            let halves = element.split(2 * n);
            let mut slices = Vec::with_capacity(n);
            let mut r = reference;
            for pair in halves.chunks(2) {
                let [a, b] = pair else {
                    return Err(EnvelopeError::invalid("element split into an odd count"));
                };
                let first = a
                    .transfer_matrix(&r)
                    .map_err(|e| element_error(beamline, index, e))?;
                r = a
                    .reference_after(&r)
                    .map_err(|e| element_error(beamline, index, e))?;
                let perveance = r.perveance(sc.peak_current_a);
                let second = b
                    .transfer_matrix(&r)
                    .map_err(|e| element_error(beamline, index, e))?;
                r = b
                    .reference_after(&r)
                    .map_err(|e| element_error(beamline, index, e))?;
                slices.push(KickSlice {
                    first,
                    second,
                    ds: a.length_m() + b.length_m(),
                    perveance,
                });
            }
            steps.push((Step::Sliced(slices), diffusion));
        }
        Ok(Self { steps })
    }

    fn kick_count(&self) -> usize {
        self.steps
            .iter()
            .map(|(step, _)| match step {
                Step::Whole(_) => 0,
                Step::Sliced(slices) => slices.len(),
            })
            .sum()
    }

    /// One pass through the lattice.
    ///
    /// Kick strengths come from `previous` (sizes of the last iterate, one
    /// pair per kick); `None` transports without self-fields. The sizes seen
    /// at each kick location are appended to `sizes`.
    fn sweep(
        &self,
        initial: &SymMatrix,
        previous: Option<&[(f64, f64)]>,
        sizes: &mut Vec<(f64, f64)>,
    ) -> EnvelopeResult<Vec<SymMatrix>> {
        let mut out = Vec::with_capacity(self.steps.len() + 1);
        let mut sigma = *initial;
        out.push(sigma);
        let mut kick = 0;
        for (index, (step, diffusion)) in self.steps.iter().enumerate() {
            match step {
                Step::Whole(m) => sigma = sigma.transform(m),
                Step::Sliced(slices) => {
                    for slice in slices {
                        sigma = sigma.transform(&slice.first);
                        sizes.push((sigma.rms_size(Plane::X), sigma.rms_size(Plane::Y)));
                        if let Some(&(sx, sy)) = previous.and_then(|p| p.get(kick)) {
                            let k = space_charge_kick_matrix(sx, sy, slice.perveance, slice.ds);
                            sigma = sigma.transform(&k);
                        }
                        sigma = sigma.transform(&slice.second);
                        kick += 1;
                    }
                }
            }
            if let Some(d) = diffusion {
                sigma = sigma.add(d);
            }
            check_finite(&sigma, index)?;
            out.push(sigma);
        }
        Ok(out)
    }
}

fn element_error(
    beamline: &Beamline,
    index: usize,
    source: om_elements::ElementError,
) -> EnvelopeError {
    EnvelopeError::Beamline(om_beamline::BeamlineError::Element {
        index,
        name: beamline.elements()[index].name.clone(),
        source,
    })
}

/// Largest relative rms-size change over all kick locations.
fn max_relative_change(old: &[(f64, f64)], new: &[(f64, f64)]) -> f64 {
    let rel = |a: f64, b: f64| {
        if a > 0.0 {
            (b - a).abs() / a
        } else {
            (b - a).abs()
        }
    };
    old.iter()
        .zip(new)
        .map(|(&(ox, oy), &(nx, ny))| rel(ox, nx).max(rel(oy, ny)))
        .fold(0.0, f64::max)
}
