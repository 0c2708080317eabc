//! Transfer matrix types and helpers.

use crate::error::{LinalgError, LinalgResult};
use nalgebra::{DMatrix, DVector, SMatrix, SVector};

/// Phase-space dimension.
pub const DIM: usize = 6;

/// Linear transfer map over (x, x', y, y', z, δ).
pub type RMatrix = SMatrix<f64, DIM, DIM>;
/// Single-particle phase-space coordinates.
pub type PhaseVector = SVector<f64, DIM>;
pub type Matrix2 = nalgebra::Matrix2<f64>;
pub type Matrix4 = nalgebra::Matrix4<f64>;

/// Degree of freedom in the 6D phase space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    X,
    Y,
    Z,
}

impl Plane {
    /// Row/column of the position coordinate of this plane.
    pub fn offset(self) -> usize {
        match self {
            Plane::X => 0,
            Plane::Y => 2,
            Plane::Z => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plane::X => "x",
            Plane::Y => "y",
            Plane::Z => "z",
        }
    }
}

impl std::fmt::Display for Plane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block-diagonal symplectic form J with [[0, 1], [-1, 0]] blocks.
pub fn symplectic_form() -> RMatrix {
    let mut j = RMatrix::zeros();
    for k in 0..3 {
        j[(2 * k, 2 * k + 1)] = 1.0;
        j[(2 * k + 1, 2 * k)] = -1.0;
    }
    j
}

/// Inverse with a determinant check.
///
/// Fails with `Singular` when |det| is below `tol` scaled by the matrix
/// magnitude. Never substitutes a fallback.
pub fn inverse(m: &RMatrix, tol: f64) -> LinalgResult<RMatrix> {
    let det = m.determinant();
    let scale = m.amax().max(1.0).powi(DIM as i32);
    if !det.is_finite() || det.abs() < tol * scale {
        return Err(LinalgError::Singular { det });
    }
    m.try_inverse().ok_or(LinalgError::Singular { det })
}

/// Inverse of a symplectic matrix, M⁻¹ = -J Mᵀ J.
///
/// Exact only when `m` is symplectic; check with [`symplectic_defect`].
pub fn symplectic_inverse(m: &RMatrix) -> RMatrix {
    let j = symplectic_form();
    -(j * m.transpose() * j)
}

/// Largest absolute entry of MᵀJM − J. Zero for an ideal Hamiltonian map.
pub fn symplectic_defect(m: &RMatrix) -> f64 {
    let j = symplectic_form();
    (m.transpose() * j * m - j).amax()
}

/// 2×2 diagonal block of one plane.
pub fn plane_block(m: &RMatrix, plane: Plane) -> Matrix2 {
    let o = plane.offset();
    m.fixed_view::<2, 2>(o, o).into_owned()
}

/// Largest absolute x–y cross term of a transfer matrix.
pub fn coupling_norm(m: &RMatrix) -> f64 {
    let xy = m.fixed_view::<2, 2>(0, 2).amax();
    let yx = m.fixed_view::<2, 2>(2, 0).amax();
    xy.max(yx)
}

/// Coordinate rotation about the beam axis by `angle` (rad).
///
/// A tilted element maps as `rotation(-tilt) * M * rotation(tilt)`.
pub fn rotation(angle: f64) -> RMatrix {
    let (s, c) = angle.sin_cos();
    let mut r = RMatrix::identity();
    for k in 0..2 {
        r[(k, k)] = c;
        r[(k, k + 2)] = s;
        r[(k + 2, k)] = -s;
        r[(k + 2, k + 2)] = c;
    }
    r
}

/// Solve a dense square system `a * x = b` by LU, rejecting singular `a`.
pub fn solve_dense(a: &DMatrix<f64>, b: &DVector<f64>, tol: f64) -> LinalgResult<DVector<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            actual: a.ncols(),
        });
    }
    if b.len() != n {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }

    let lu = a.clone().lu();
    let det = lu.determinant();
    let scale = a.amax().max(1.0).powi(n as i32);
    if !det.is_finite() || det.abs() < tol * scale {
        return Err(LinalgError::Singular { det });
    }
    lu.solve(b).ok_or(LinalgError::Singular { det })
}
