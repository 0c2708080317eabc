//! Chromaticity from off-momentum closed-orbit solves.

use om_beamline::{Beamline, Topology};
use tracing::debug;

use crate::config::OpticsConfig;
use crate::error::{OpticsError, OpticsResult};
use crate::solve::solve_periodic_optics;

/// dQ/dδ per plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chromaticity {
    pub xi_x: f64,
    pub xi_y: f64,
}

/// ξ = (Q(δ₀ + step) − Q(δ₀ − step)) / (2 step) around the configured offset δ₀.
pub fn chromaticity(
    beamline: &Beamline,
    config: &OpticsConfig,
    step: f64,
) -> OpticsResult<Chromaticity> {
    if beamline.topology() != Topology::Ring {
        return Err(OpticsError::invalid("chromaticity requires a ring"));
    }
    if !(step.is_finite() && step > 0.0) {
        return Err(OpticsError::invalid("chromaticity step must be positive"));
    }

    let tunes_at = |delta: f64| -> OpticsResult<(f64, f64)> {
        let cfg = OpticsConfig {
            momentum_offset: delta,
            ..config.clone()
        };
        let solution = solve_periodic_optics(beamline, &cfg)?;
        let tunes = solution
            .tunes
            .ok_or_else(|| OpticsError::invalid("ring solve returned no tunes"))?;
        Ok((tunes.qx, tunes.qy))
    };

    let (qx_plus, qy_plus) = tunes_at(config.momentum_offset + step)?;
    let (qx_minus, qy_minus) = tunes_at(config.momentum_offset - step)?;
    let result = Chromaticity {
        xi_x: (qx_plus - qx_minus) / (2.0 * step),
        xi_y: (qy_plus - qy_minus) / (2.0 * step),
    };
    debug!(xi_x = result.xi_x, xi_y = result.xi_y, "chromaticity");
    Ok(result)
}
