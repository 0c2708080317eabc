//! Normal-mode eigenvectors and their propagation.
//!
//! Each transverse mode k is represented by a complex 4-vector v_k with the
//! normalization Im(v_kᴴ J v_k) = −2, so that for an uncoupled plane
//! v = (√β, −(i + α)/√β) and a one-turn map acts as M v = e^{−iμ} v.

use nalgebra::{DMatrix, Matrix4, Vector4};
use om_linalg::{Complex, Plane, eigen_decompose};
use std::f64::consts::TAU;

use crate::error::{OpticsError, OpticsResult};
use crate::twiss::{CoupledBetas, PlaneTwiss};

pub type ModeVector = Vector4<Complex<f64>>;

/// Eigenvalues farther than this from the unit circle are unstable.
const MODULUS_TOL: f64 = 1e-6;

/// The two transverse modes at one location.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalModes {
    pub v1: ModeVector,
    pub v2: ModeVector,
    /// Component whose phase defines the phase advance of each mode.
    phase_index: [usize; 2],
}

fn plane_vector(beta: f64, alpha: f64) -> (Complex<f64>, Complex<f64>) {
    let sb = beta.sqrt();
    (
        Complex::new(sb, 0.0),
        Complex::new(-alpha / sb, -1.0 / sb),
    )
}

/// Im(vᴴ J v) over the two transverse planes.
fn symplectic_norm(v: &ModeVector) -> f64 {
    2.0 * ((v[0].conj() * v[1]).im + (v[2].conj() * v[3]).im)
}

impl NormalModes {
    pub fn uncoupled(beta_x: f64, alpha_x: f64, beta_y: f64, alpha_y: f64) -> Self {
        let zero = Complex::new(0.0, 0.0);
        let (x, xp) = plane_vector(beta_x, alpha_x);
        let (y, yp) = plane_vector(beta_y, alpha_y);
        Self {
            v1: Vector4::new(x, xp, zero, zero),
            v2: Vector4::new(zero, zero, y, yp),
            phase_index: [0, 2],
        }
    }

    pub fn from_planes(x: &PlaneTwiss, y: &PlaneTwiss) -> Self {
        Self::uncoupled(x.beta, x.alpha, y.beta, y.alpha)
    }

    /// Periodic modes of a coupled 4×4 one-turn map and their phase
    /// advances per turn.
    pub fn from_coupled(m4: &Matrix4<f64>) -> OpticsResult<(Self, [f64; 2])> {
        let dm = DMatrix::from_fn(4, 4, |i, j| m4[(i, j)]);
        let pairs = eigen_decompose(&dm)?;

        let mut selected: Vec<(ModeVector, f64)> = Vec::with_capacity(2);
        for pair in &pairs {
            let dominant = if pair.vector[0].norm() >= pair.vector[2].norm() {
                Plane::X
            } else {
                Plane::Y
            };
            if pair.modulus_defect() > MODULUS_TOL {
                let lambda = pair.value;
                let half_trace = (lambda + lambda.inv()).re / 2.0;
                return Err(OpticsError::UnstableLattice {
                    plane: dominant,
                    half_trace,
                });
            }
            let v = ModeVector::from_iterator(pair.vector.iter().copied());
            let q = symplectic_norm(&v);
            if q < 0.0 {
                selected.push((v * Complex::new((2.0 / q.abs()).sqrt(), 0.0), pair.phase()));
            }
        }

        if selected.len() != 2 {
            // Real eigenvalues on the unit circle: integer or half-integer tune.
            return Err(OpticsError::UnstableLattice {
                plane: Plane::X,
                half_trace: 1.0,
            });
        }

        // Mode 1 is the one living mostly in x.
        let share = |v: &ModeVector| v[0].norm_sqr() / (v[0].norm_sqr() + v[2].norm_sqr());
        if share(&selected[1].0) > share(&selected[0].0) {
            selected.swap(0, 1);
        }
        let (v1, mu1) = selected[0];
        let (v2, mu2) = selected[1];

        let modes = Self {
            v1: real_phase(v1, 0),
            v2: real_phase(v2, 2),
            phase_index: [0, 2],
        };
        Ok((modes, [mu1, mu2]))
    }

    /// Transport both modes through a 4×4 map.
    pub fn propagate(&self, m4: &Matrix4<f64>) -> Self {
        let mc = m4.map(|v| Complex::new(v, 0.0));
        Self {
            v1: mc * self.v1,
            v2: mc * self.v2,
            phase_index: self.phase_index,
        }
    }

    /// Phases of the reference components of both modes.
    pub fn phases(&self) -> [f64; 2] {
        [
            self.v1[self.phase_index[0]].arg(),
            self.v2[self.phase_index[1]].arg(),
        ]
    }

    /// Mode functions; `scale` = p(s)/p₀ restores the normalization under
    /// acceleration.
    pub fn betas(&self, scale: f64) -> CoupledBetas {
        let f = |a: Complex<f64>, b: Complex<f64>| (a.norm_sqr() * scale, -(a.conj() * b).re * scale);
        let (beta_1x, alpha_1x) = f(self.v1[0], self.v1[1]);
        let (beta_1y, alpha_1y) = f(self.v1[2], self.v1[3]);
        let (beta_2x, alpha_2x) = f(self.v2[0], self.v2[1]);
        let (beta_2y, alpha_2y) = f(self.v2[2], self.v2[3]);
        CoupledBetas {
            beta_1x,
            alpha_1x,
            beta_1y,
            alpha_1y,
            beta_2x,
            alpha_2x,
            beta_2y,
            alpha_2y,
        }
    }
}

/// Rotate `v` so that component `k` is real and non-negative.
fn real_phase(v: ModeVector, k: usize) -> ModeVector {
    let phase = v[k].arg();
    v * Complex::from_polar(1.0, -phase)
}

/// Phase advance between two reference phases, in [0, 2π).
///
/// M v = e^{−iμ} v, so the advance is the decrease of the argument.
pub fn phase_step(before: f64, after: f64) -> f64 {
    let step = (before - after).rem_euclid(TAU);
    // Round-off on a zero advance must not turn into a full turn.
    if step > TAU - 1e-10 { 0.0 } else { step }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation_block(beta: f64, alpha: f64, mu: f64) -> [[f64; 2]; 2] {
        let (s, c) = mu.sin_cos();
        let gamma = (1.0 + alpha * alpha) / beta;
        [[c + alpha * s, beta * s], [-gamma * s, c - alpha * s]]
    }

    fn uncoupled_turn(mx: f64, my: f64) -> Matrix4<f64> {
        let x = rotation_block(8.0, 0.5, mx);
        let y = rotation_block(3.0, -0.2, my);
        let mut m = Matrix4::zeros();
        for i in 0..2 {
            for j in 0..2 {
                m[(i, j)] = x[i][j];
                m[(i + 2, j + 2)] = y[i][j];
            }
        }
        m
    }

    #[test]
    fn uncoupled_vectors_are_normalized() {
        let modes = NormalModes::uncoupled(8.0, 0.5, 3.0, -0.2);
        assert!((symplectic_norm(&modes.v1) + 2.0).abs() < 1e-12);
        assert!((symplectic_norm(&modes.v2) + 2.0).abs() < 1e-12);
        let b = modes.betas(1.0);
        assert!((b.beta_1x - 8.0).abs() < 1e-12);
        assert!((b.alpha_1x - 0.5).abs() < 1e-12);
        assert!((b.beta_2y - 3.0).abs() < 1e-12);
        assert!((b.alpha_2y + 0.2).abs() < 1e-12);
        assert_eq!(b.beta_1y, 0.0);
    }

    #[test]
    fn eigen_modes_recover_uncoupled_twiss() {
        let m = uncoupled_turn(1.3, 2.2);
        let (modes, mu) = NormalModes::from_coupled(&m).unwrap();
        let b = modes.betas(1.0);
        assert!((b.beta_1x - 8.0).abs() < 1e-9);
        assert!((b.alpha_1x - 0.5).abs() < 1e-9);
        assert!((b.beta_2y - 3.0).abs() < 1e-9);
        assert!((mu[0] - 1.3).abs() < 1e-9);
        assert!((mu[1] - 2.2).abs() < 1e-9);
    }

    #[test]
    fn one_turn_propagation_is_periodic() {
        let m = uncoupled_turn(0.7, 4.1);
        let modes = NormalModes::uncoupled(8.0, 0.5, 3.0, -0.2);
        let after = modes.propagate(&m);
        let before_b = modes.betas(1.0);
        let after_b = after.betas(1.0);
        assert!((before_b.beta_1x - after_b.beta_1x).abs() < 1e-12);
        assert!((before_b.beta_2y - after_b.beta_2y).abs() < 1e-12);
        let [a0, b0] = modes.phases();
        let [a1, b1] = after.phases();
        assert!((phase_step(a0, a1) - 0.7).abs() < 1e-12);
        assert!((phase_step(b0, b1) - 4.1).abs() < 1e-12);
    }

    #[test]
    fn zero_step_stays_zero() {
        assert_eq!(phase_step(0.3, 0.3), 0.0);
        assert_eq!(phase_step(0.3, 0.3 + 1e-14), 0.0);
    }

    #[test]
    fn hyperbolic_turn_is_unstable() {
        let mut m = Matrix4::identity();
        m[(0, 0)] = 2.0;
        m[(1, 1)] = 0.5;
        m[(2, 2)] = 0.9;
        m[(2, 3)] = 0.1;
        m[(3, 2)] = -1.0;
        m[(3, 3)] = 1.0;
        assert!(matches!(
            NormalModes::from_coupled(&m),
            Err(OpticsError::UnstableLattice { .. })
        ));
    }
}
