//! Shared focusing functions for thick elements.

/// Below this |k|·L² the series forms are used instead of closed forms.
const SERIES_THRESHOLD: f64 = 1e-4;

/// Below this |k| an element is treated as field free.
pub const EPSILON_STRENGTH: f64 = 1e-14;

/// Principal trajectories for x'' + k x = 0 over length `l`.
///
/// Returns (C, S) with C(0) = 1, C'(0) = 0, S(0) = 0, S'(0) = 1.
pub fn principal_trajectories(k: f64, l: f64) -> (f64, f64) {
    if k.abs() < EPSILON_STRENGTH {
        (1.0, l)
    } else if k > 0.0 {
        let sk = k.sqrt();
        let phi = sk * l;
        (phi.cos(), phi.sin() / sk)
    } else {
        let sk = (-k).sqrt();
        let phi = sk * l;
        (phi.cosh(), phi.sinh() / sk)
    }
}

/// (1 − C) / k, the dispersion generating function.
pub fn dispersion_integral(k: f64, l: f64) -> f64 {
    let phi2 = k * l * l;
    if phi2.abs() < SERIES_THRESHOLD {
        let l2 = l * l;
        l2 / 2.0 - k * l2 * l2 / 24.0 + k * k * l2 * l2 * l2 / 720.0
    } else {
        let (c, _) = principal_trajectories(k, l);
        (1.0 - c) / k
    }
}

/// (L − S) / k, used by the momentum compaction term R56.
pub fn compaction_integral(k: f64, l: f64) -> f64 {
    let phi2 = k * l * l;
    if phi2.abs() < SERIES_THRESHOLD {
        let l3 = l * l * l;
        l3 / 6.0 - k * l3 * l * l / 120.0 + k * k * l3 * l3 * l / 5040.0
    } else {
        let (_, s) = principal_trajectories(k, l);
        (l - s) / k
    }
}
