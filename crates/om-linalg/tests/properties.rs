use om_linalg::{
    DEFAULT_TOL, Plane, RMatrix, SymMatrix, inverse, rotation, symplectic_defect,
    symplectic_inverse,
};
use proptest::prelude::*;

/// Thick-lens-like symplectic map: rotation sandwiched around a drift.
fn drift_rotated(len: f64, angle: f64) -> RMatrix {
    let mut d = RMatrix::identity();
    d[(0, 1)] = len;
    d[(2, 3)] = len;
    rotation(-angle) * d * rotation(angle)
}

proptest! {
    #[test]
    fn rotations_are_symplectic(angle in -3.2f64..3.2) {
        let r = rotation(angle);
        prop_assert!(symplectic_defect(&r) < 1e-12);
        let back = symplectic_inverse(&r);
        prop_assert!((back - rotation(-angle)).amax() < 1e-12);
    }

    #[test]
    fn symplectic_inverse_matches_general_inverse(
        len in 0.0f64..20.0,
        angle in -1.5f64..1.5,
    ) {
        let m = drift_rotated(len, angle);
        let general = inverse(&m, DEFAULT_TOL).unwrap();
        let fast = symplectic_inverse(&m);
        prop_assert!((general - fast).amax() < 1e-9 * (1.0 + len));
        prop_assert!((m * fast - RMatrix::identity()).amax() < 1e-9 * (1.0 + len));
    }

    #[test]
    fn packed_storage_is_symmetric(i in 0usize..6, j in 0usize..6, v in -1e3f64..1e3) {
        let mut s = SymMatrix::zeros();
        s.set(i, j, v);
        prop_assert_eq!(s.get(i, j), v);
        prop_assert_eq!(s.get(j, i), v);
        let dense = s.to_matrix();
        prop_assert_eq!(dense, dense.transpose());
    }

    #[test]
    fn symplectic_transport_keeps_covariance_valid_and_emittance(
        len in 0.0f64..10.0,
        ex in 1e-9f64..1e-4,
        ey in 1e-9f64..1e-4,
        beta in 0.1f64..50.0,
    ) {
        let sigma = SymMatrix::from_variances([ex * beta, ex / beta, ey * beta, ey / beta, 0.0, 0.0]);
        let out = sigma.transform(&drift_rotated(len, 0.0));
        prop_assert!(out.validate_covariance().is_ok());
        prop_assert!((out.plane_emittance(Plane::X) - ex).abs() < 1e-9 * ex);
        prop_assert!((out.plane_emittance(Plane::Y) - ey).abs() < 1e-9 * ey);
    }

    #[test]
    fn negative_variance_is_rejected(k in 0usize..6, v in -1.0f64..-1e-12) {
        let mut variances = [1.0; 6];
        variances[k] = v;
        let result = SymMatrix::from_variances(variances).validate_covariance();
        prop_assert!(result.is_err());
    }
}

#[test]
fn singular_matrix_is_not_inverted() {
    let mut m = RMatrix::identity();
    m[(5, 5)] = 0.0;
    assert!(inverse(&m, DEFAULT_TOL).is_err());
}
