//! Linear space-charge lens for a uniformly filled (KV) elliptical beam.

use om_linalg::RMatrix;

/// Thin defocusing lens of a KV beam over a slice of length `ds`.
///
/// `sigma_x` and `sigma_y` are rms sizes (m); the KV semi-axes are
/// a = 2σx and b = 2σy. `perveance` is the generalized perveance K.
/// Degenerate sizes produce the identity.
pub fn space_charge_kick_matrix(sigma_x: f64, sigma_y: f64, perveance: f64, ds: f64) -> RMatrix {
    let mut r = RMatrix::identity();
    let a = 2.0 * sigma_x;
    let b = 2.0 * sigma_y;
    if !(a > 0.0 && b > 0.0 && perveance.is_finite()) {
        return r;
    }
    let sum = a + b;
    r[(1, 0)] = 2.0 * perveance * ds / (a * sum);
    r[(3, 2)] = 2.0 * perveance * ds / (b * sum);
    r
}
