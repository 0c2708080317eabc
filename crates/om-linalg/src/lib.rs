//! Fixed-size linear algebra for 6D beam optics.
//!
//! Coordinates are ordered (x, x', y, y', z, δ). Transfer maps are 6×6
//! `RMatrix` values, beam second moments are packed `SymMatrix` values, and
//! `eigen_decompose` extracts normal modes of general (non-symmetric) real
//! matrices such as one-turn maps.

pub mod eigen;
pub mod error;
pub mod matrix;
pub mod sym;

pub use eigen::{EigenPair, eigen_decompose};
pub use error::{LinalgError, LinalgResult};
pub use matrix::{
    DIM, Matrix2, Matrix4, PhaseVector, Plane, RMatrix, coupling_norm, inverse, plane_block,
    rotation, solve_dense, symplectic_defect, symplectic_form, symplectic_inverse,
};
pub use nalgebra::Complex;
pub use sym::SymMatrix;

/// Default relative tolerance for singularity and symplecticity checks.
pub const DEFAULT_TOL: f64 = 1e-9;
