//! Linear (first-order) transfer matrices.
//!
//! All functions here work in the element frame; tilts are applied by
//! [`crate::Element::transfer_matrix`].

use crate::common::{
    EPSILON_STRENGTH, compaction_integral, dispersion_integral, principal_trajectories,
};
use crate::error::ElementResult;
use crate::kind::ElementKind;
use crate::reference::ReferenceParticle;
use om_core::units::constants::C_MPS;
use om_linalg::RMatrix;
use std::f64::consts::PI;

/// Parameters of a sector (bend/quadrupole/drift) body.
#[derive(Clone, Copy, Debug)]
pub struct SectorParams {
    pub length: f64,
    /// Geometric curvature of the reference orbit, enters path length terms.
    pub h: f64,
    /// Curvature multiplying δ in the dispersion terms.
    pub drive: f64,
    pub kx: f64,
    pub ky: f64,
    pub gamma: f64,
}

/// Combined function sector map over (x, x', y, y', z, δ).
pub fn sector_matrix(p: &SectorParams) -> RMatrix {
    let l = p.length;
    let (cx, sx) = principal_trajectories(p.kx, l);
    let (cy, sy) = principal_trajectories(p.ky, l);
    let dx = dispersion_integral(p.kx, l);

    let mut r = RMatrix::identity();
    r[(0, 0)] = cx;
    r[(0, 1)] = sx;
    r[(1, 0)] = -p.kx * sx;
    r[(1, 1)] = cx;
    r[(2, 2)] = cy;
    r[(2, 3)] = sy;
    r[(3, 2)] = -p.ky * sy;
    r[(3, 3)] = cy;

    r[(0, 5)] = p.drive * dx;
    r[(1, 5)] = p.drive * sx;
    r[(4, 0)] = -p.h * sx;
    r[(4, 1)] = -p.h * dx;
    r[(4, 5)] = l / (p.gamma * p.gamma) - p.h * p.h * compaction_integral(p.kx, l);
    r
}

pub fn drift_matrix(length: f64, gamma: f64) -> RMatrix {
    sector_matrix(&SectorParams {
        length,
        h: 0.0,
        drive: 0.0,
        kx: 0.0,
        ky: 0.0,
        gamma,
    })
}

/// Thin edge focusing of a sector bend with pole face rotation `edge`.
pub fn edge_matrix(h: f64, edge: f64) -> RMatrix {
    let mut r = RMatrix::identity();
    if h != 0.0 && edge != 0.0 {
        let t = h * edge.tan();
        r[(1, 0)] = t;
        r[(3, 2)] = -t;
    }
    r
}

/// Solenoid body with K = B_s / (2 Bρ).
pub fn solenoid_matrix(length: f64, k: f64, gamma: f64) -> RMatrix {
    if k.abs() < EPSILON_STRENGTH {
        return drift_matrix(length, gamma);
    }
    let (s, c) = (k * length).sin_cos();
    let sc = s * c;
    let mut r = RMatrix::identity();

    r[(0, 0)] = c * c;
    r[(0, 1)] = sc / k;
    r[(0, 2)] = sc;
    r[(0, 3)] = s * s / k;

    r[(1, 0)] = -k * sc;
    r[(1, 1)] = c * c;
    r[(1, 2)] = -k * s * s;
    r[(1, 3)] = sc;

    r[(2, 0)] = -sc;
    r[(2, 1)] = -s * s / k;
    r[(2, 2)] = c * c;
    r[(2, 3)] = sc / k;

    r[(3, 0)] = k * s * s;
    r[(3, 1)] = -sc;
    r[(3, 2)] = -k * sc;
    r[(3, 3)] = c * c;

    r[(4, 5)] = length / (gamma * gamma);
    r
}

/// Thin multipole: only the quadrupole term is linear.
pub fn thin_quadrupole_matrix(k1l: f64) -> RMatrix {
    let mut r = RMatrix::identity();
    r[(1, 0)] = -k1l;
    r[(3, 2)] = k1l;
    r
}

/// Energy change of the reference particle across an element, in MeV.
pub fn reference_energy_gain_mev(kind: &ElementKind, reference: &ReferenceParticle) -> f64 {
    match *kind {
        ElementKind::Cavity {
            voltage_mv,
            phase_rad,
            ..
        } => reference.charge().abs() * voltage_mv * phase_rad.cos(),
        ElementKind::Wakefield {
            loss_factor_v_per_pc,
            bunch_charge_pc,
            ..
        } => -reference.charge().abs() * loss_factor_v_per_pc * bunch_charge_pc * 1e-6,
        _ => 0.0,
    }
}

/// Energy slope dE/dz (MeV/m) seen by particles displaced by z.
pub fn energy_slope_mev_per_m(kind: &ElementKind, reference: &ReferenceParticle) -> f64 {
    match *kind {
        ElementKind::Cavity {
            voltage_mv,
            phase_rad,
            frequency_hz,
        } => {
            let k = rf_wavenumber(frequency_hz, reference);
            reference.charge().abs() * voltage_mv * k * phase_rad.sin()
        }
        ElementKind::Wakefield {
            slope_v_per_pc_m,
            bunch_charge_pc,
            ..
        } => -reference.charge().abs() * slope_v_per_pc_m * bunch_charge_pc * 1e-6,
        _ => 0.0,
    }
}

/// RF wavenumber 2πf/(βc) in 1/m.
pub fn rf_wavenumber(frequency_hz: f64, reference: &ReferenceParticle) -> f64 {
    2.0 * PI * frequency_hz / (reference.beta() * C_MPS)
}

/// Accelerating structure of length `length` between references `r0` and `r1`.
pub fn accelerating_matrix(
    length: f64,
    r0: &ReferenceParticle,
    r1: &ReferenceParticle,
    slope_mev_per_m: f64,
) -> RMatrix {
    let p0 = r0.momentum_mev();
    let p1 = r1.momentum_mev();
    let ratio = p0 / p1;

    let effective_length = if (p1 - p0).abs() <= 1e-12 * p0 {
        length
    } else {
        length * p0 / (p1 - p0) * (p1 / p0).ln()
    };

    let mut r = RMatrix::identity();
    r[(0, 1)] = effective_length;
    r[(1, 1)] = ratio;
    r[(2, 3)] = effective_length;
    r[(3, 3)] = ratio;
    r[(4, 5)] = length / (r0.gamma() * r1.gamma());
    r[(5, 4)] = slope_mev_per_m / (r1.beta() * p1);
    r[(5, 5)] = r0.beta() * p0 / (r1.beta() * p1);
    r
}

/// Linear body map of `kind` over `length` in the element frame.
///
/// `entry_edge`/`exit_edge` select whether the bend pole face rotations at
/// the ends are part of this piece.
pub fn body_matrix(
    kind: &ElementKind,
    length: f64,
    reference: &ReferenceParticle,
    entry_edge: bool,
    exit_edge: bool,
) -> ElementResult<RMatrix> {
    let gamma = reference.gamma();
    let m = match *kind {
        ElementKind::Drift
        | ElementKind::Sextupole { .. }
        | ElementKind::Corrector { .. }
        | ElementKind::Aperture { .. }
        | ElementKind::Scatterer { .. }
        | ElementKind::Instrument => drift_matrix(length, gamma),
        ElementKind::Bend {
            field_t,
            gradient_t_per_m,
            edge_in_rad,
            edge_out_rad,
        } => {
            let h = reference.normalize(field_t);
            let k1 = reference.normalize(gradient_t_per_m);
            let body = sector_matrix(&SectorParams {
                length,
                h,
                drive: h,
                kx: h * h + k1,
                ky: -k1,
                gamma,
            });
            let entry = if entry_edge {
                edge_matrix(h, edge_in_rad)
            } else {
                RMatrix::identity()
            };
            let exit = if exit_edge {
                edge_matrix(h, edge_out_rad)
            } else {
                RMatrix::identity()
            };
            exit * body * entry
        }
        ElementKind::Quadrupole { gradient_t_per_m } => {
            let k1 = reference.normalize(gradient_t_per_m);
            sector_matrix(&SectorParams {
                length,
                h: 0.0,
                drive: 0.0,
                kx: k1,
                ky: -k1,
                gamma,
            })
        }
        ElementKind::Multipole {
            ref field_integrals,
        } => {
            let k1l = field_integrals
                .get(1)
                .map(|b1| reference.normalize(*b1))
                .unwrap_or(0.0);
            thin_quadrupole_matrix(k1l)
        }
        ElementKind::Solenoid { field_t } => {
            let k = reference.normalize(field_t) / 2.0;
            solenoid_matrix(length, k, gamma)
        }
        ElementKind::Cavity { .. } | ElementKind::Wakefield { .. } => {
            let gain = reference_energy_gain_mev(kind, reference);
            let after = reference.with_kinetic(reference.kinetic_mev() + gain)?;
            let slope = energy_slope_mev_per_m(kind, reference);
            accelerating_matrix(length, reference, &after, slope)
        }
    };
    Ok(m)
}
