//! Nonlinear one-turn map, closed orbit search and relinearization.

use nalgebra::{DMatrix, DVector};
use om_beamline::Beamline;
use om_elements::{Element, ReferenceParticle};
use om_linalg::{PhaseVector, RMatrix};
use tracing::debug;

use crate::config::{OpticsConfig, SolveMode};
use crate::error::{OpticsError, OpticsResult};
use crate::jacobian::{central_difference_jacobian, finite_difference_jacobian};
use crate::newton::{NewtonConfig, newton_solve};

/// Absolute step for relinearizing element maps about the orbit.
const LINEARIZE_STEP: f64 = 1e-7;

/// Coordinate scale for forward-difference steps in the Newton Jacobian.
const ORBIT_SCALE: f64 = 1e-3;

/// Track one particle through the whole beamline, returning the
/// coordinates at every element boundary.
pub fn trajectory(
    beamline: &Beamline,
    refs: &[ReferenceParticle],
    start: PhaseVector,
) -> OpticsResult<Vec<PhaseVector>> {
    let mut out = Vec::with_capacity(beamline.len() + 1);
    let mut v = start;
    out.push(v);
    for (element, reference) in beamline.elements().iter().zip(refs) {
        element.track(&mut v, reference)?;
        if v.iter().any(|c| !c.is_finite()) {
            return Err(OpticsError::invalid(format!(
                "orbit diverged in element '{}'",
                element.name
            )));
        }
        out.push(v);
    }
    Ok(out)
}

fn one_turn(beamline: &Beamline, refs: &[ReferenceParticle], start: PhaseVector) -> OpticsResult<PhaseVector> {
    let mut v = start;
    for (element, reference) in beamline.elements().iter().zip(refs) {
        element.track(&mut v, reference)?;
    }
    Ok(v)
}

/// Converged closed orbit.
#[derive(Clone, Debug)]
pub struct ClosedOrbit {
    /// Coordinates at every element boundary (N + 1).
    pub orbit: Vec<PhaseVector>,
    pub iterations: usize,
    pub residual: f64,
}

/// Solve T(X) = X for the ring.
///
/// In 4D mode the unknowns are (x, x', y, y') at fixed δ = momentum offset
/// and z is left free. In 6D mode all six coordinates are unknown.
pub fn find_closed_orbit<C>(
    beamline: &Beamline,
    refs: &[ReferenceParticle],
    linear_one_turn: &RMatrix,
    config: &OpticsConfig,
    mut on_iteration: C,
) -> OpticsResult<ClosedOrbit>
where
    C: FnMut(usize, f64) -> OpticsResult<()>,
{
    let dim = config.mode.dimension();
    let delta = config.momentum_offset;

    let embed = |x: &DVector<f64>| -> PhaseVector {
        let mut v = PhaseVector::zeros();
        for k in 0..dim {
            v[k] = x[k];
        }
        if config.mode == SolveMode::FourD {
            v[5] = delta;
        }
        v
    };

    let residual = |x: &DVector<f64>| -> OpticsResult<DVector<f64>> {
        let out = one_turn(beamline, refs, embed(x))?;
        Ok(DVector::from_fn(dim, |k, _| out[k] - x[k]))
    };

    let jacobian = |iter: usize, x: &DVector<f64>| -> OpticsResult<DMatrix<f64>> {
        if iter == 0 {
            Ok(DMatrix::from_fn(dim, dim, |i, j| {
                linear_one_turn[(i, j)] - if i == j { 1.0 } else { 0.0 }
            }))
        } else {
            finite_difference_jacobian(x, &residual, config.fd_step, ORBIT_SCALE)
        }
    };

    let newton_config = NewtonConfig {
        max_iterations: config.max_iterations,
        tolerance: config.tolerance,
        relaxation: config.relaxation,
        ..NewtonConfig::default()
    };

    let x0 = DVector::zeros(dim);
    let result = newton_solve(x0, &residual, jacobian, &newton_config, &mut on_iteration).map_err(
        |e| match e {
            OpticsError::ConvergenceFailure {
                iterations,
                residual,
                mut last_orbit,
            } => {
                if config.mode == SolveMode::FourD {
                    last_orbit[5] = delta;
                }
                OpticsError::ConvergenceFailure {
                    iterations,
                    residual,
                    last_orbit,
                }
            }
            other => other,
        },
    )?;

    debug!(
        iterations = result.iterations,
        residual = result.residual_norm,
        "closed orbit converged"
    );

    let orbit = trajectory(beamline, refs, embed(&result.x))?;
    Ok(ClosedOrbit {
        orbit,
        iterations: result.iterations,
        residual: result.residual_norm,
    })
}

/// Jacobian of one element's tracking map at `at`.
pub fn linearize_element(
    element: &Element,
    reference: &ReferenceParticle,
    at: &PhaseVector,
) -> OpticsResult<RMatrix> {
    let x = DVector::from_column_slice(at.as_slice());
    let map = |v: &DVector<f64>| -> OpticsResult<DVector<f64>> {
        let mut p = PhaseVector::from_column_slice(v.as_slice());
        element.track(&mut p, reference)?;
        Ok(DVector::from_column_slice(p.as_slice()))
    };
    let jac = central_difference_jacobian(&x, map, LINEARIZE_STEP)?;
    Ok(RMatrix::from_fn(|i, j| jac[(i, j)]))
}

/// Element matrices linearized about `orbit` (one per element).
pub fn relinearize(
    beamline: &Beamline,
    refs: &[ReferenceParticle],
    orbit: &[PhaseVector],
) -> OpticsResult<Vec<RMatrix>> {
    beamline
        .elements()
        .iter()
        .zip(refs.iter().zip(orbit))
        .map(|(element, (reference, at))| linearize_element(element, reference, at))
        .collect()
}
