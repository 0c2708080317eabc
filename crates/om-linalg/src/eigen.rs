//! Eigen-decomposition of general real matrices (one-turn maps).
//!
//! Eigenvalues come from the real Schur form. Each eigenvector is the right
//! singular vector of (M − λI) with the smallest singular value, which stays
//! well defined for the non-symmetric, near-unimodular matrices met in
//! periodic optics.

use crate::error::{LinalgError, LinalgResult};
use nalgebra::{Complex, DMatrix, DVector};

/// Eigenvalue with its unit-norm right eigenvector.
#[derive(Debug, Clone)]
pub struct EigenPair {
    pub value: Complex<f64>,
    pub vector: DVector<Complex<f64>>,
}

impl EigenPair {
    /// Phase advance μ = -arg(λ), mapped to [0, 2π).
    pub fn phase(&self) -> f64 {
        let mu = -self.value.arg();
        if mu < 0.0 {
            mu + std::f64::consts::TAU
        } else {
            mu
        }
    }

    /// |λ| − 1; zero for a stable symplectic mode.
    pub fn modulus_defect(&self) -> f64 {
        self.value.norm() - 1.0
    }
}

/// Eigenvalues and right eigenvectors of a square real matrix.
pub fn eigen_decompose(m: &DMatrix<f64>) -> LinalgResult<Vec<EigenPair>> {
    let n = m.nrows();
    if m.ncols() != n {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            actual: m.ncols(),
        });
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NoConvergence {
            what: "non-finite matrix entry",
        });
    }

    let values = m.complex_eigenvalues();
    let mc: DMatrix<Complex<f64>> = m.map(|v| Complex::new(v, 0.0));

    let mut pairs = Vec::with_capacity(n);
    for value in values.iter().copied() {
        let shifted = &mc - DMatrix::<Complex<f64>>::identity(n, n) * value;
        let svd = shifted
            .try_svd(false, true, f64::EPSILON, 10_000)
            .ok_or(LinalgError::NoConvergence {
                what: "eigenvector SVD",
            })?;
        let v_t = svd.v_t.ok_or(LinalgError::NoConvergence {
            what: "eigenvector SVD (no V)",
        })?;

        let (k, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, s)| {
                if *s < best.1 { (i, *s) } else { best }
            });

        // row k of Vᴴ is the conjugate of the k-th right singular vector
        let mut vector: DVector<Complex<f64>> = v_t.row(k).adjoint();
        let norm = vector.norm();
        if norm > 0.0 {
            vector /= Complex::new(norm, 0.0);
        }
        pairs.push(EigenPair { value, vector });
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation_block(mu: f64, beta: f64) -> DMatrix<f64> {
        // Twiss form with alpha = 0
        let (s, c) = mu.sin_cos();
        DMatrix::from_row_slice(2, 2, &[c, beta * s, -s / beta, c])
    }

    #[test]
    fn unimodular_eigenvalues_for_stable_block() {
        let m = rotation_block(0.9, 3.0);
        let pairs = eigen_decompose(&m).unwrap();
        assert_eq!(pairs.len(), 2);
        for p in &pairs {
            assert!(p.modulus_defect().abs() < 1e-12);
            let mu = p.phase();
            assert!((mu - 0.9).abs() < 1e-10 || (mu - (std::f64::consts::TAU - 0.9)).abs() < 1e-10);
        }
    }

    #[test]
    fn eigenvectors_satisfy_definition() {
        let mut m = DMatrix::<f64>::zeros(4, 4);
        m.view_mut((0, 0), (2, 2)).copy_from(&rotation_block(0.4, 2.0));
        m.view_mut((2, 2), (2, 2)).copy_from(&rotation_block(1.3, 0.5));
        m[(0, 2)] = 0.05;
        let mc = m.map(|v| Complex::new(v, 0.0));
        for p in eigen_decompose(&m).unwrap() {
            let residual = &mc * &p.vector - &p.vector * p.value;
            assert!(residual.norm() < 1e-8, "residual {}", residual.norm());
        }
    }

    #[test]
    fn non_square_is_rejected() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(
            eigen_decompose(&m),
            Err(LinalgError::DimensionMismatch { .. })
        ));
    }
}
