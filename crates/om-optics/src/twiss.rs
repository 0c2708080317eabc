//! Twiss parameter types and per-plane periodic extraction.

use nalgebra::Matrix4;
use om_linalg::{Matrix2, Plane, RMatrix};
use std::f64::consts::TAU;

use crate::error::{OpticsError, OpticsResult};

/// Optical functions at one location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TwissParameters {
    pub s: f64,
    pub beta_x: f64,
    pub alpha_x: f64,
    pub beta_y: f64,
    pub alpha_y: f64,
    pub disp_x: f64,
    pub disp_px: f64,
    pub disp_y: f64,
    pub disp_py: f64,
    /// Accumulated phase advance (rad)
    pub mu_x: f64,
    pub mu_y: f64,
    /// Mode functions, present for coupled optics
    pub modes: Option<CoupledBetas>,
}

/// Lebedev–Bogacz mode beta and alpha functions.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CoupledBetas {
    pub beta_1x: f64,
    pub alpha_1x: f64,
    pub beta_1y: f64,
    pub alpha_1y: f64,
    pub beta_2x: f64,
    pub alpha_2x: f64,
    pub beta_2y: f64,
    pub alpha_2y: f64,
}

/// Betatron (and synchrotron) tunes of a ring.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tunes {
    pub qx: f64,
    pub qy: f64,
    pub qs: Option<f64>,
}

/// Optics at the entrance of a line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InitialTwiss {
    pub beta_x: f64,
    pub alpha_x: f64,
    pub beta_y: f64,
    pub alpha_y: f64,
    pub disp_x: f64,
    pub disp_px: f64,
    pub disp_y: f64,
    pub disp_py: f64,
}

impl InitialTwiss {
    /// Matched-looking start without dispersion.
    pub fn new(beta_x: f64, alpha_x: f64, beta_y: f64, alpha_y: f64) -> Self {
        Self {
            beta_x,
            alpha_x,
            beta_y,
            alpha_y,
            disp_x: 0.0,
            disp_px: 0.0,
            disp_y: 0.0,
            disp_py: 0.0,
        }
    }

    pub(crate) fn validate(&self) -> OpticsResult<()> {
        let values = [
            self.beta_x,
            self.alpha_x,
            self.beta_y,
            self.alpha_y,
            self.disp_x,
            self.disp_px,
            self.disp_y,
            self.disp_py,
        ];
        if values.iter().any(|v| !v.is_finite()) || self.beta_x <= 0.0 || self.beta_y <= 0.0 {
            return Err(OpticsError::invalid(
                "initial Twiss needs finite values and positive betas",
            ));
        }
        Ok(())
    }
}

/// Periodic solution of a 2×2 one-turn block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneTwiss {
    pub beta: f64,
    pub alpha: f64,
    /// Phase advance per turn in [0, 2π)
    pub mu: f64,
}

/// Periodic beta, alpha and phase advance of one plane.
///
/// Blocks with a non-unit determinant (acceleration) are normalized first.
pub fn plane_twiss(block: &Matrix2, plane: Plane) -> OpticsResult<PlaneTwiss> {
    let det = block.determinant();
    if !(det.is_finite() && det > 0.0) {
        return Err(OpticsError::UnstableLattice {
            plane,
            half_trace: f64::NAN,
        });
    }
    let m = block / det.sqrt();
    let half_trace = 0.5 * (m[(0, 0)] + m[(1, 1)]);
    if !half_trace.is_finite() || half_trace.abs() >= 1.0 {
        return Err(OpticsError::UnstableLattice { plane, half_trace });
    }
    let sin_mu = m[(0, 1)].signum() * (1.0 - half_trace * half_trace).sqrt();
    let beta = m[(0, 1)] / sin_mu;
    let alpha = (m[(0, 0)] - m[(1, 1)]) / (2.0 * sin_mu);
    let mu = sin_mu.atan2(half_trace).rem_euclid(TAU);
    Ok(PlaneTwiss { beta, alpha, mu })
}

/// Periodic dispersion (D_x, D'_x, D_y, D'_y) solving (I − M₄) D = M₄,δ.
pub fn periodic_dispersion(one_turn: &RMatrix) -> OpticsResult<[f64; 4]> {
    let m4: Matrix4<f64> = one_turn.fixed_view::<4, 4>(0, 0).into_owned();
    let rhs = one_turn.fixed_view::<4, 1>(0, 5).into_owned();
    let a = Matrix4::identity() - m4;
    let det = a.determinant();
    if !det.is_finite() || det.abs() < 1e-14 {
        return Err(om_linalg::LinalgError::Singular { det }.into());
    }
    let d = a
        .lu()
        .solve(&rhs)
        .ok_or(om_linalg::LinalgError::Singular { det })?;
    Ok([d[0], d[1], d[2], d[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twiss_block(beta: f64, alpha: f64, mu: f64) -> Matrix2 {
        let (s, c) = mu.sin_cos();
        let gamma = (1.0 + alpha * alpha) / beta;
        Matrix2::new(c + alpha * s, beta * s, -gamma * s, c - alpha * s)
    }

    #[test]
    fn recovers_twiss_from_block() {
        let m = twiss_block(12.0, -1.3, 1.1);
        let t = plane_twiss(&m, Plane::X).unwrap();
        assert!((t.beta - 12.0).abs() < 1e-12);
        assert!((t.alpha + 1.3).abs() < 1e-12);
        assert!((t.mu - 1.1).abs() < 1e-12);
    }

    #[test]
    fn phase_above_pi_keeps_positive_beta() {
        let m = twiss_block(5.0, 0.4, 4.0);
        let t = plane_twiss(&m, Plane::Y).unwrap();
        assert!((t.beta - 5.0).abs() < 1e-12);
        assert!((t.mu - 4.0).abs() < 1e-12);
    }

    #[test]
    fn half_trace_above_one_is_unstable() {
        let m = Matrix2::new(2.0, 1.0, 1.0, 1.0);
        match plane_twiss(&m, Plane::X) {
            Err(OpticsError::UnstableLattice { plane, half_trace }) => {
                assert_eq!(plane, Plane::X);
                assert!(half_trace >= 1.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn integer_tune_has_no_dispersion_solution() {
        let r = RMatrix::identity();
        assert!(periodic_dispersion(&r).unwrap_err().is_singular());
    }

    #[test]
    fn initial_twiss_validation() {
        assert!(InitialTwiss::new(10.0, 0.0, 5.0, 0.0).validate().is_ok());
        assert!(InitialTwiss::new(0.0, 0.0, 5.0, 0.0).validate().is_err());
    }
}
