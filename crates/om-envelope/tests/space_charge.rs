use om_beamline::{Beamline, Topology, load_beamline};
use om_core::CancelToken;
use om_core::units::{m, mev};
use om_elements::{Element, ReferenceParticle};
use om_envelope::{
    EnvelopeError, MomentsConfig, MomentsProgressEvent, SpaceChargeConfig, propagate_moments,
    propagate_with_progress,
};
use om_linalg::{Plane, SymMatrix};
use proptest::prelude::*;

fn proton(kinetic: f64) -> ReferenceParticle {
    ReferenceParticle::proton(mev(kinetic)).unwrap()
}

fn drift_line(length: f64) -> Beamline {
    load_beamline(
        vec![
            Element::drift("D1", m(length / 2.0)),
            Element::instrument("MON"),
            Element::drift("D2", m(length / 2.0)),
        ],
        proton(10.0),
        Topology::Line,
    )
    .unwrap()
}

fn round_beam() -> SymMatrix {
    SymMatrix::from_variances([1e-6, 1e-6, 1e-6, 1e-6, 0.0, 0.0])
}

#[test]
fn space_charge_off_is_bit_reproducible() {
    let line = load_beamline(
        vec![
            Element::drift("D1", m(0.5)),
            Element::quadrupole("QF", m(0.2), 8.0),
            Element::drift("D2", m(1.0)),
            Element::quadrupole("QD", m(0.2), -8.0),
            Element::scatterer("FOIL", 1e-5, 0.089),
        ],
        proton(10.0),
        Topology::Line,
    )
    .unwrap();
    let cfg = MomentsConfig::default();
    let a = propagate_moments(&line, &round_beam(), &cfg).unwrap();
    let b = propagate_moments(&line, &round_beam(), &cfg).unwrap();
    assert_eq!(a.sigmas, b.sigmas);
    assert_eq!(a.sigmas.len(), line.len() + 1);
    assert_eq!(a.iterations, 0);
    assert!(!a.space_charge);
}

#[test]
fn drift_matches_closed_form() {
    let line = drift_line(2.0);
    let sol = propagate_moments(&line, &round_beam(), &MomentsConfig::default()).unwrap();
    // ⟨x²⟩ = ⟨x0²⟩ + L² ⟨x0'²⟩ for an uncorrelated beam
    let last = sol.final_sigma().unwrap();
    assert!((last.variance(0) - 5e-6).abs() < 1e-18);
    assert!((last.get(0, 1) - 2e-6).abs() < 1e-18);
    assert!((sol.envelope[3].s - 2.0).abs() < 1e-15);
    assert!((sol.envelope[3].emittance_x - 1e-6).abs() < 1e-15);
}

#[test]
fn invalid_covariance_is_rejected() {
    let line = drift_line(1.0);
    let mut sigma = round_beam();
    // |⟨x x'⟩| > σx σx'
    sigma.set(0, 1, 2e-6);
    let err = propagate_moments(&line, &sigma, &MomentsConfig::default()).unwrap_err();
    assert!(matches!(err, EnvelopeError::NotPositiveDefinite { .. }));

    let negative = SymMatrix::from_variances([-1e-6, 1e-6, 1e-6, 1e-6, 0.0, 0.0]);
    let err = propagate_moments(&line, &negative, &MomentsConfig::default()).unwrap_err();
    assert!(matches!(err, EnvelopeError::NotPositiveDefinite { pivot: 0, .. }));
}

#[test]
fn scatterer_adds_angular_variance() {
    let reference = proton(10.0);
    let foil = Element::scatterer("FOIL", 1e-4, 0.089);
    let theta = foil.scattering_angle(&reference);
    assert!(theta > 0.0);
    let line = load_beamline(vec![foil], reference, Topology::Line).unwrap();
    let sol = propagate_moments(&line, &round_beam(), &MomentsConfig::default()).unwrap();
    let last = sol.final_sigma().unwrap();
    assert!((last.variance(1) - (1e-6 + theta * theta)).abs() < 1e-18);
    assert!((last.variance(3) - (1e-6 + theta * theta)).abs() < 1e-18);
    assert_eq!(last.variance(0), 1e-6);
}

#[test]
fn acceleration_damps_geometric_emittance() {
    let reference = proton(10.0);
    let cavity = Element::cavity("RF", m(0.5), 1.0, 0.0, 100e6);
    let after = cavity.reference_after(&reference).unwrap();
    let line = load_beamline(vec![cavity], reference, Topology::Line).unwrap();
    let sol = propagate_moments(&line, &round_beam(), &MomentsConfig::default()).unwrap();
    let ratio = sol.envelope[1].emittance_x / sol.envelope[0].emittance_x;
    let expected = reference.momentum_mev() / after.momentum_mev();
    assert!((ratio - expected).abs() < 1e-9);
}

#[test]
fn zero_current_matches_space_charge_free_envelope() {
    let line = drift_line(2.0);
    let baseline = propagate_moments(&line, &round_beam(), &MomentsConfig::default()).unwrap();
    let cfg = MomentsConfig::default().with_space_charge(SpaceChargeConfig::with_current(0.0));
    let sol = propagate_moments(&line, &round_beam(), &cfg).unwrap();
    assert_eq!(sol.iterations, 1);
    assert_eq!(sol.residual, 0.0);
    for (a, b) in baseline.sigmas.iter().zip(&sol.sigmas) {
        assert!((a.variance(0) - b.variance(0)).abs() < 1e-15);
    }
}

#[test]
fn space_charge_converges_and_grows_beam() {
    let line = drift_line(1.0);
    let baseline = propagate_moments(&line, &round_beam(), &MomentsConfig::default()).unwrap();
    let cfg = MomentsConfig::default().with_space_charge(SpaceChargeConfig {
        peak_current_a: 0.01,
        max_slice_length: 0.05,
        tolerance: 1e-10,
        max_iterations: 100,
    });
    let mut events = Vec::new();
    let sol = propagate_with_progress(&line, &round_beam(), &cfg, &mut |e| events.push(e)).unwrap();
    assert!(sol.space_charge);
    assert!(sol.iterations >= 2);
    assert!(sol.residual < 1e-10);
    assert!(sol.max_size(Plane::X) > baseline.max_size(Plane::X));
    // round beam stays round
    let last = sol.envelope.last().unwrap();
    assert!((last.sigma_x - last.sigma_y).abs() < 1e-15);
    assert!(matches!(events.first(), Some(MomentsProgressEvent::Baseline)));
    assert!(matches!(
        events.last(),
        Some(MomentsProgressEvent::Converged { .. })
    ));
}

#[test]
fn space_charge_iteration_cap_reports_failure() {
    let line = drift_line(1.0);
    let cfg = MomentsConfig::default().with_space_charge(SpaceChargeConfig {
        peak_current_a: 0.01,
        max_slice_length: 0.05,
        tolerance: 1e-14,
        max_iterations: 1,
    });
    let err = propagate_moments(&line, &round_beam(), &cfg).unwrap_err();
    match err {
        EnvelopeError::ConvergenceFailure {
            iterations,
            residual,
        } => {
            assert_eq!(iterations, 1);
            assert!(residual > 1e-14);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cancellation_stops_before_first_iteration() {
    let line = drift_line(1.0);
    let cancel = CancelToken::new();
    cancel.cancel();
    let cfg = MomentsConfig::default()
        .with_space_charge(SpaceChargeConfig::with_current(0.01))
        .with_cancel(cancel);
    let err = propagate_moments(&line, &round_beam(), &cfg).unwrap_err();
    assert!(matches!(err, EnvelopeError::Cancelled { iterations: 0 }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn linear_transport_conserves_emittance(
        g1 in -20.0f64..20.0,
        g2 in -20.0f64..20.0,
        drift in 0.0f64..3.0,
        ex in 1e-8f64..1e-5,
        ey in 1e-8f64..1e-5,
    ) {
        let line = load_beamline(
            vec![
                Element::quadrupole("Q1", m(0.2), g1),
                Element::drift("D", m(drift)),
                Element::quadrupole("Q2", m(0.2), g2),
            ],
            proton(10.0),
            Topology::Line,
        )
        .unwrap();
        let sigma = SymMatrix::from_variances([ex, ex, ey, ey, 0.0, 0.0]);
        let sol = propagate_moments(&line, &sigma, &MomentsConfig::default()).unwrap();
        // the determinant of a strongly mismatched block loses digits to
        // cancellation, so the bound is looser than machine precision
        for point in &sol.envelope {
            prop_assert!((point.emittance_x - ex).abs() < 1e-6 * ex);
            prop_assert!((point.emittance_y - ey).abs() < 1e-6 * ey);
        }
        prop_assert!(!sol.space_charge);
    }
}
