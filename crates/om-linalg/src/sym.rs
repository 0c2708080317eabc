//! Packed symmetric 6×6 storage for beam second moments.

use crate::error::{LinalgError, LinalgResult};
use crate::matrix::{DIM, Plane, RMatrix};
use nalgebra::{Cholesky, DMatrix};

const PACKED_LEN: usize = DIM * (DIM + 1) / 2;

/// Offset of (i, j), i <= j, in row-major upper-triangle storage.
#[inline]
fn packed_index(i: usize, j: usize) -> usize {
    let (r, c) = if i <= j { (i, j) } else { (j, i) };
    r * (2 * DIM - r + 1) / 2 + (c - r)
}

/// Symmetric matrix of beam second moments ⟨uᵢuⱼ⟩.
///
/// Only the upper triangle is stored, so the value is symmetric by
/// construction. Positive semi-definiteness is checked on demand with
/// [`SymMatrix::validate_covariance`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymMatrix {
    packed: [f64; PACKED_LEN],
}

impl Default for SymMatrix {
    fn default() -> Self {
        Self::zeros()
    }
}

impl SymMatrix {
    pub fn zeros() -> Self {
        Self {
            packed: [0.0; PACKED_LEN],
        }
    }

    /// Uncorrelated beam with the given variances on the diagonal.
    pub fn from_variances(variances: [f64; DIM]) -> Self {
        let mut s = Self::zeros();
        for (k, v) in variances.into_iter().enumerate() {
            s.set(k, k, v);
        }
        s
    }

    /// Import a dense matrix, rejecting asymmetry above `tol` (relative to
    /// the largest entry).
    pub fn from_matrix(m: &RMatrix, tol: f64) -> LinalgResult<Self> {
        let scale = m.amax().max(f64::MIN_POSITIVE);
        let mut s = Self::zeros();
        for i in 0..DIM {
            for j in i..DIM {
                let diff = (m[(i, j)] - m[(j, i)]).abs();
                if diff > tol * scale {
                    return Err(LinalgError::NotSymmetric {
                        row: i,
                        col: j,
                        diff,
                    });
                }
                s.set(i, j, 0.5 * (m[(i, j)] + m[(j, i)]));
            }
        }
        Ok(s)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.packed[packed_index(i, j)]
    }

    /// Set both (i, j) and (j, i).
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.packed[packed_index(i, j)] = value;
    }

    pub fn to_matrix(&self) -> RMatrix {
        RMatrix::from_fn(|i, j| self.get(i, j))
    }

    /// Σ' = M Σ Mᵀ.
    pub fn transform(&self, m: &RMatrix) -> Self {
        let dense = m * self.to_matrix() * m.transpose();
        let mut out = Self::zeros();
        for i in 0..DIM {
            for j in i..DIM {
                // average the two rounded halves so the result stays exactly symmetric
                out.set(i, j, 0.5 * (dense[(i, j)] + dense[(j, i)]));
            }
        }
        out
    }

    /// Element-wise sum, e.g. adding a diffusion term.
    pub fn add(&self, other: &SymMatrix) -> Self {
        let mut out = *self;
        for (a, b) in out.packed.iter_mut().zip(other.packed.iter()) {
            *a += b;
        }
        out
    }

    pub fn variance(&self, k: usize) -> f64 {
        self.get(k, k)
    }

    /// RMS size of the position coordinate of `plane`.
    pub fn rms_size(&self, plane: Plane) -> f64 {
        self.variance(plane.offset()).max(0.0).sqrt()
    }

    /// RMS emittance sqrt(det Σ₂ₓ₂) of one plane.
    pub fn plane_emittance(&self, plane: Plane) -> f64 {
        let o = plane.offset();
        let det = self.get(o, o) * self.get(o + 1, o + 1) - self.get(o, o + 1).powi(2);
        det.max(0.0).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.packed.iter().all(|v| v.is_finite())
    }

    /// Lower Cholesky factor L with Σ = L Lᵀ.
    ///
    /// Fails with `NotPositiveDefinite` at the first non-positive pivot.
    pub fn cholesky(&self) -> LinalgResult<RMatrix> {
        let dense = DMatrix::from_fn(DIM, DIM, |i, j| self.get(i, j));
        let l = cholesky_with_pivot(dense)?;
        Ok(RMatrix::from_fn(|i, j| l[(i, j)]))
    }

    /// Check that Σ is a physically valid covariance.
    ///
    /// Variances must be >= 0. Coordinates with zero variance (e.g. a 4D
    /// beam without longitudinal spread) are excluded and the remaining
    /// sub-matrix must be positive definite.
    pub fn validate_covariance(&self) -> LinalgResult<()> {
        let mut active = Vec::with_capacity(DIM);
        for k in 0..DIM {
            let v = self.variance(k);
            if !v.is_finite() || v < 0.0 {
                return Err(LinalgError::NotPositiveDefinite { pivot: k, value: v });
            }
            if v > 0.0 {
                active.push(k);
            }
        }
        if active.is_empty() {
            return Ok(());
        }
        let n = active.len();
        let sub = DMatrix::from_fn(n, n, |i, j| self.get(active[i], active[j]));
        cholesky_with_pivot(sub)
            .map(|_| ())
            .map_err(|e| match e {
                LinalgError::NotPositiveDefinite { pivot, value } => {
                    LinalgError::NotPositiveDefinite {
                        pivot: active[pivot],
                        value,
                    }
                }
                other => other,
            })
    }
}

/// Cholesky that reports the failing pivot.
///
/// On failure the leading principal minors are factored in turn; the first
/// one that fails identifies the pivot.
fn cholesky_with_pivot(m: DMatrix<f64>) -> LinalgResult<DMatrix<f64>> {
    let n = m.nrows();
    if let Some(chol) = Cholesky::new(m.clone()) {
        return Ok(chol.l());
    }
    for k in 1..=n {
        let minor = m.view((0, 0), (k, k)).into_owned();
        if Cholesky::new(minor.clone()).is_none() {
            let value = if k == 1 {
                minor[(0, 0)]
            } else {
                // Schur complement of the last diagonal entry
                let head = minor.view((0, 0), (k - 1, k - 1)).into_owned();
                let col = minor.view((0, k - 1), (k - 1, 1)).into_owned();
                match head.cholesky() {
                    Some(c) => minor[(k - 1, k - 1)] - (col.transpose() * c.solve(&col))[(0, 0)],
                    None => minor[(k - 1, k - 1)],
                }
            };
            return Err(LinalgError::NotPositiveDefinite {
                pivot: k - 1,
                value,
            });
        }
    }
    Err(LinalgError::NotPositiveDefinite {
        pivot: n.saturating_sub(1),
        value: f64::NAN,
    })
}
