//! Nonlinear tracking maps in the element frame.

use crate::common::EPSILON_STRENGTH;
use crate::error::{ElementError, ElementResult};
use crate::kind::ElementKind;
use crate::linear::{
    SectorParams, drift_matrix, edge_matrix, energy_slope_mev_per_m, reference_energy_gain_mev,
    sector_matrix, solenoid_matrix,
};
use crate::reference::ReferenceParticle;
use om_linalg::{Complex, PhaseVector};

/// Slices used for thick sextupole integration.
pub const SEXTUPOLE_SLICES: usize = 4;

/// Track a single particle through the body of `kind` (element frame).
pub fn track_body(
    kind: &ElementKind,
    length: f64,
    reference: &ReferenceParticle,
    coords: &mut PhaseVector,
) -> ElementResult<()> {
    let gamma = reference.gamma();
    let one_plus_delta = 1.0 + coords[5];
    if !(one_plus_delta.is_finite() && one_plus_delta > 0.0) {
        return Err(ElementError::NonPhysical {
            what: "momentum deviation below -1",
        });
    }

    match *kind {
        ElementKind::Drift
        | ElementKind::Aperture { .. }
        | ElementKind::Scatterer { .. }
        | ElementKind::Instrument => {
            *coords = drift_matrix(length, gamma) * *coords;
        }
        ElementKind::Bend {
            field_t,
            gradient_t_per_m,
            edge_in_rad,
            edge_out_rad,
        } => {
            let h = reference.normalize(field_t);
            let hp = h / one_plus_delta;
            let k1p = reference.normalize(gradient_t_per_m) / one_plus_delta;
            let body = sector_matrix(&SectorParams {
                length,
                h,
                drive: hp,
                kx: h * hp + k1p,
                ky: -k1p,
                gamma,
            });
            let m = edge_matrix(hp, edge_out_rad) * body * edge_matrix(hp, edge_in_rad);
            *coords = m * *coords;
        }
        ElementKind::Quadrupole { gradient_t_per_m } => {
            let k1p = reference.normalize(gradient_t_per_m) / one_plus_delta;
            let m = sector_matrix(&SectorParams {
                length,
                h: 0.0,
                drive: 0.0,
                kx: k1p,
                ky: -k1p,
                gamma,
            });
            *coords = m * *coords;
        }
        ElementKind::Solenoid { field_t } => {
            let k = reference.normalize(field_t) / (2.0 * one_plus_delta);
            *coords = solenoid_matrix(length, k, gamma) * *coords;
        }
        ElementKind::Sextupole { b2_t_per_m2 } => {
            let k2 = reference.normalize(b2_t_per_m2);
            if length == 0.0 || k2.abs() < EPSILON_STRENGTH {
                *coords = drift_matrix(length, gamma) * *coords;
            } else {
                let ds = length / SEXTUPOLE_SLICES as f64;
                let half = drift_matrix(ds / 2.0, gamma);
                for _ in 0..SEXTUPOLE_SLICES {
                    *coords = half * *coords;
                    sextupole_kick(coords, k2 * ds);
                    *coords = half * *coords;
                }
            }
        }
        ElementKind::Multipole {
            ref field_integrals,
        } => {
            let knl: Vec<f64> = field_integrals
                .iter()
                .map(|b| reference.normalize(*b))
                .collect();
            multipole_kick(coords, &knl);
        }
        ElementKind::Corrector { hkick_tm, vkick_tm } => {
            let half = drift_matrix(length / 2.0, gamma);
            *coords = half * *coords;
            coords[1] -= reference.normalize(hkick_tm) / one_plus_delta;
            coords[3] += reference.normalize(vkick_tm) / one_plus_delta;
            *coords = half * *coords;
        }
        ElementKind::Cavity { .. } | ElementKind::Wakefield { .. } => {
            let gain = reference_energy_gain_mev(kind, reference);
            let after = reference.with_kinetic(reference.kinetic_mev() + gain)?;
            let slope = energy_slope_mev_per_m(kind, reference);
            *coords = drift_matrix(length / 2.0, gamma) * *coords;
            let de = match *kind {
                ElementKind::Cavity {
                    voltage_mv,
                    phase_rad,
                    frequency_hz,
                } => {
                    let k = crate::linear::rf_wavenumber(frequency_hz, reference);
                    reference.charge().abs() * voltage_mv * (phase_rad - k * coords[4]).cos()
                }
                _ => gain + slope * coords[4],
            };
            energy_kick(coords, reference, &after, de)?;
            *coords = drift_matrix(length / 2.0, after.gamma()) * *coords;
        }
    }
    Ok(())
}

/// Thin sextupole kick with integrated strength `k2l` (1/m²).
pub fn sextupole_kick(coords: &mut PhaseVector, k2l: f64) {
    let (x, y) = (coords[0], coords[2]);
    let scale = 1.0 / (1.0 + coords[5]);
    coords[1] -= 0.5 * k2l * (x * x - y * y) * scale;
    coords[3] += k2l * x * y * scale;
}

/// Thin multipole kick, Δx' − iΔy' = −Σ knl (x + iy)ⁿ / n! / (1 + δ).
pub fn multipole_kick(coords: &mut PhaseVector, knl: &[f64]) {
    if knl.is_empty() {
        return;
    }
    let z = Complex::new(coords[0], coords[2]);
    let mut power = Complex::new(1.0, 0.0);
    let mut factorial = 1.0;
    let mut sum = Complex::new(0.0, 0.0);
    for (n, &k) in knl.iter().enumerate() {
        if n > 0 {
            power *= z;
            factorial *= n as f64;
        }
        sum += power * (k / factorial);
    }
    let scale = 1.0 / (1.0 + coords[5]);
    coords[1] -= sum.re * scale;
    coords[3] += sum.im * scale;
}

/// Apply an energy change `de_mev` to one particle and re-express its
/// coordinates relative to the downstream reference `after`.
pub fn energy_kick(
    coords: &mut PhaseVector,
    before: &ReferenceParticle,
    after: &ReferenceParticle,
    de_mev: f64,
) -> ElementResult<()> {
    let m = before.mass_mev();
    let p = before.momentum_mev() * (1.0 + coords[5]);
    let e = (p * p + m * m).sqrt() + de_mev;
    if !(e.is_finite() && e > m) {
        return Err(ElementError::NonPhysical {
            what: "particle stopped by energy change",
        });
    }
    let p_new = (e * e - m * m).sqrt();
    let ratio = p / p_new;
    coords[1] *= ratio;
    coords[3] *= ratio;
    coords[5] = p_new / after.momentum_mev() - 1.0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use om_core::units::mev;

    fn proton() -> ReferenceParticle {
        ReferenceParticle::proton(mev(200.0)).unwrap()
    }

    #[test]
    fn thin_quadrupole_term_matches_linear_kick() {
        let mut v = PhaseVector::zeros();
        v[0] = 0.002;
        v[2] = -0.001;
        multipole_kick(&mut v, &[0.0, 0.5]);
        assert!((v[1] + 0.5 * 0.002).abs() < 1e-15);
        assert!((v[3] - 0.5 * -0.001).abs() < 1e-15);
    }

    #[test]
    fn sextupole_multipole_term_matches_sextupole_kick() {
        let mut a = PhaseVector::zeros();
        a[0] = 0.003;
        a[2] = 0.002;
        let mut b = a;
        multipole_kick(&mut a, &[0.0, 0.0, 4.0]);
        sextupole_kick(&mut b, 4.0);
        assert!((a - b).norm() < 1e-15);
    }

    #[test]
    fn sextupole_on_axis_is_drift() {
        let p = proton();
        let kind = ElementKind::Sextupole { b2_t_per_m2: 50.0 };
        // transverse coordinates stay zero, so no slice sees a kick
        let mut v = PhaseVector::zeros();
        v[4] = 2e-3;
        v[5] = 1e-3;
        let w = drift_matrix(0.2, p.gamma()) * v;
        track_body(&kind, 0.2, &p, &mut v).unwrap();
        assert_eq!(v[0], 0.0);
        assert_eq!(v[2], 0.0);
        assert!((v - w).norm() < 1e-15);
    }

    #[test]
    fn sextupole_kicks_particle_leaving_axis() {
        let p = proton();
        let kind = ElementKind::Sextupole { b2_t_per_m2: 50.0 };
        let mut v = PhaseVector::zeros();
        v[1] = 1e-3;
        let w = drift_matrix(0.2, p.gamma()) * v;
        track_body(&kind, 0.2, &p, &mut v).unwrap();
        // positive k2 defocuses x > 0 towards smaller x'
        assert!(v[1] < w[1]);
        assert!((v - w).norm() < 1e-6);
    }

    #[test]
    fn on_momentum_quadrupole_matches_linear_map() {
        let p = proton();
        let kind = ElementKind::Quadrupole {
            gradient_t_per_m: 8.0,
        };
        let m = crate::linear::body_matrix(&kind, 0.3, &p, true, true).unwrap();
        let mut v = PhaseVector::from_column_slice(&[1e-3, 2e-4, -5e-4, 1e-4, 0.0, 0.0]);
        let expected = m * v;
        track_body(&kind, 0.3, &p, &mut v).unwrap();
        assert!((v - expected).norm() < 1e-15);
    }

    #[test]
    fn corrector_kick_is_opposite_field_sign() {
        let p = proton();
        let kind = ElementKind::Corrector {
            hkick_tm: 0.001,
            vkick_tm: 0.001,
        };
        let mut v = PhaseVector::zeros();
        track_body(&kind, 0.0, &p, &mut v).unwrap();
        let theta = 0.001 / p.rigidity_tm();
        assert!((v[1] + theta).abs() < 1e-15);
        assert!((v[3] - theta).abs() < 1e-15);
    }

    #[test]
    fn on_crest_energy_gain_keeps_reference_on_momentum() {
        let p = proton();
        let kind = ElementKind::Cavity {
            voltage_mv: 3.0,
            phase_rad: 0.0,
            frequency_hz: 805e6,
        };
        let mut v = PhaseVector::zeros();
        track_body(&kind, 0.0, &p, &mut v).unwrap();
        assert!(v.norm() < 1e-12);
    }

    #[test]
    fn stopping_particle_is_reported() {
        let p = ReferenceParticle::proton(mev(1.0)).unwrap();
        let kind = ElementKind::Cavity {
            voltage_mv: 0.5,
            phase_rad: 0.0,
            frequency_hz: 805e6,
        };
        let mut v = PhaseVector::zeros();
        v[5] = -0.9;
        let before = p;
        let after = p.with_kinetic(1.5).unwrap();
        assert!(energy_kick(&mut v, &before, &after, -2.0).is_err());
        assert!(track_body(&kind, 0.0, &p, &mut v).is_ok());
    }
}
