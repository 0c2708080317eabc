use om_beamline::{Beamline, Topology, load_beamline};
use om_core::CancelToken;
use om_core::units::{m, mev};
use om_elements::{ApertureShape, Element, ReferenceParticle};
use om_linalg::PhaseVector;
use om_track::{LossReason, ParticleState, TrackConfig, TrackError, track};
use proptest::prelude::*;

fn proton() -> ReferenceParticle {
    ReferenceParticle::proton(mev(200.0)).unwrap()
}

fn point(x: f64, xp: f64, y: f64, yp: f64) -> PhaseVector {
    PhaseVector::new(x, xp, y, yp, 0.0, 0.0)
}

/// Drift, thin kicker, collimator: the kick accumulates every turn so the
/// orbit walks outward until the collimator catches it.
fn kicker_ring(kick_rad: f64, half_width: f64) -> Beamline {
    let reference = proton();
    let hkick = -kick_rad * reference.rigidity_tm();
    load_beamline(
        vec![
            Element::drift("D", m(1.0)),
            Element::corrector("K", m(0.0), hkick, 0.0),
            Element::collimator(
                "COL",
                ApertureShape::Elliptic {
                    ax: half_width,
                    ay: half_width,
                },
            ),
        ],
        reference,
        Topology::Ring,
    )
    .unwrap()
}

fn fodo_ring(b2_t_per_m2: f64) -> Beamline {
    let elements = vec![
        Element::quadrupole("QF", m(0.2), 6.0),
        Element::sextupole("SX", m(0.1), b2_t_per_m2),
        Element::drift("D1", m(1.0)),
        Element::quadrupole("QD", m(0.2), -6.0),
        Element::drift("D2", m(1.0)),
    ];
    load_beamline(elements, proton(), Topology::Ring).unwrap()
}

#[test]
fn aperture_loss_records_element_and_turn() {
    let ring = kicker_ring(1e-3, 3.5e-3);
    let result = track(&ring, &[PhaseVector::zeros()], 10, &TrackConfig::default()).unwrap();
    let p = &result.particles[0];
    // x before the collimator: 0, 1, 3, 6 mm on turns 0..=3
    assert_eq!(
        p.state,
        ParticleState::Lost {
            element_index: 2,
            turn: 3,
            reason: LossReason::Aperture
        }
    );
    assert!((p.coords[0].abs() - 6e-3).abs() < 1e-12);
    assert!((p.coords[1].abs() - 4e-3).abs() < 1e-12);
    assert_eq!(p.turn, 3);

    // turns 0..=3 alive, then the loss
    let history = &result.history[0];
    assert_eq!(history.len(), 5);
    assert_eq!(history.last(), Some(p));
    assert_eq!(result.alive_count(), 0);
}

#[test]
fn disabled_aperture_losses_keep_particle() {
    let ring = kicker_ring(1e-3, 3.5e-3);
    let cfg = TrackConfig {
        aperture_losses: false,
        ..TrackConfig::default()
    };
    let result = track(&ring, &[PhaseVector::zeros()], 10, &cfg).unwrap();
    assert!(result.particles[0].is_alive());
    assert_eq!(result.particles[0].turn, 10);
}

#[test]
fn initial_offset_beyond_aperture_is_lost_on_first_turn() {
    let reference = proton();
    let line = load_beamline(
        vec![
            Element::drift("D0", m(0.5)),
            Element::quadrupole("Q", m(0.3), 2.0)
                .with_aperture(ApertureShape::Rectangular { ax: 0.01, ay: 0.01 }),
            Element::drift("D1", m(0.5)),
        ],
        reference,
        Topology::Line,
    )
    .unwrap();
    let start = point(0.02, 0.0, 0.0, 0.0);
    let result = track(&line, &[start], 1, &TrackConfig::default()).unwrap();
    let p = &result.particles[0];
    assert_eq!(
        p.state,
        ParticleState::Lost {
            element_index: 1,
            turn: 0,
            reason: LossReason::Aperture
        }
    );
    // lost at the quadrupole entrance, after the upstream drift
    assert_eq!(p.coords, start);
}

#[test]
fn fast_and_full_agree_on_linear_ring() {
    let ring = fodo_ring(0.0);
    let particles = [point(1e-4, 0.0, -2e-4, 1e-5), point(0.0, 3e-5, 1e-4, 0.0)];
    let full = track(&ring, &particles, 50, &TrackConfig::default()).unwrap();
    let fast = track(&ring, &particles, 50, &TrackConfig::fast()).unwrap();
    for (a, b) in full.particles.iter().zip(&fast.particles) {
        assert!((a.coords - b.coords).amax() < 1e-12);
    }
}

#[test]
fn fast_tracking_ignores_sextupole() {
    let ring = fodo_ring(800.0);
    let start = [point(5e-3, 0.0, 5e-3, 0.0)];
    let full = track(&ring, &start, 20, &TrackConfig::default()).unwrap();
    let fast = track(&ring, &start, 20, &TrackConfig::fast()).unwrap();
    let linear = track(&fodo_ring(0.0), &start, 20, &TrackConfig::fast()).unwrap();
    assert!((full.particles[0].coords - fast.particles[0].coords).amax() > 1e-9);
    assert!((fast.particles[0].coords - linear.particles[0].coords).amax() < 1e-9);
}

#[test]
fn runaway_momentum_is_unbounded_loss() {
    let ring = fodo_ring(0.0);
    let start = PhaseVector::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.5);
    let result = track(&ring, &[start], 3, &TrackConfig::default()).unwrap();
    assert!(matches!(
        result.particles[0].state,
        ParticleState::Lost {
            element_index: 0,
            turn: 0,
            reason: LossReason::Unbounded
        }
    ));
}

fn scattering_ring() -> Beamline {
    load_beamline(
        vec![
            Element::quadrupole("QF", m(0.2), 6.0),
            Element::drift("D1", m(1.0)),
            Element::scatterer("FOIL", 1e-4, 0.089),
            Element::quadrupole("QD", m(0.2), -6.0),
            Element::drift("D2", m(1.0)),
        ],
        proton(),
        Topology::Ring,
    )
    .unwrap()
}

#[test]
fn scattering_is_reproducible_per_particle() {
    let ring = scattering_ring();
    let particles: Vec<PhaseVector> = (0..8).map(|k| point(1e-5 * k as f64, 0.0, 0.0, 0.0)).collect();
    let cfg = TrackConfig::default().with_seed(7);
    let a = track(&ring, &particles, 5, &cfg).unwrap();
    let b = track(&ring, &particles, 5, &cfg).unwrap();
    assert_eq!(a.particles, b.particles);

    // a particle's stream does not depend on how many others are tracked
    let subset = track(&ring, &particles[..3], 5, &cfg).unwrap();
    assert_eq!(&a.particles[..3], &subset.particles[..]);

    let other = track(&ring, &particles, 5, &TrackConfig::default().with_seed(8)).unwrap();
    assert_ne!(a.particles, other.particles);
}

#[test]
fn record_every_decimates_history() {
    let ring = fodo_ring(0.0);
    let cfg = TrackConfig {
        record_every: 4,
        ..TrackConfig::default()
    };
    let result = track(&ring, &[point(1e-4, 0.0, 0.0, 0.0)], 10, &cfg).unwrap();
    let turns: Vec<usize> = result.history[0].iter().map(|p| p.turn).collect();
    assert_eq!(turns, vec![0, 4, 8, 10]);
}

#[test]
fn line_allows_single_pass_only() {
    let line = load_beamline(vec![Element::drift("D", m(1.0))], proton(), Topology::Line).unwrap();
    let err = track(&line, &[PhaseVector::zeros()], 2, &TrackConfig::default()).unwrap_err();
    assert!(matches!(err, TrackError::InvalidConfiguration { .. }));
    let ok = track(&line, &[point(0.0, 1e-3, 0.0, 0.0)], 1, &TrackConfig::default()).unwrap();
    assert!((ok.particles[0].coords[0] - 1e-3).abs() < 1e-15);
}

#[test]
fn accelerating_ring_allows_single_pass_only() {
    let mut elements = vec![Element::cavity("RF", m(0.5), 1.0, 0.0, 200e6)];
    elements.extend([
        Element::quadrupole("QF", m(0.2), 6.0),
        Element::drift("D1", m(1.0)),
        Element::quadrupole("QD", m(0.2), -6.0),
        Element::drift("D2", m(1.0)),
    ]);
    let ring = load_beamline(elements, proton(), Topology::Ring).unwrap();
    let err = track(&ring, &[PhaseVector::zeros()], 2, &TrackConfig::default()).unwrap_err();
    assert!(matches!(err, TrackError::InvalidConfiguration { .. }));
    let one = track(&ring, &[PhaseVector::zeros()], 1, &TrackConfig::default()).unwrap();
    assert_eq!(one.alive_count(), 1);
}

#[test]
fn cancellation_aborts_tracking() {
    let ring = fodo_ring(0.0);
    let cancel = CancelToken::new();
    cancel.cancel();
    let cfg = TrackConfig::default().with_cancel(cancel);
    let err = track(&ring, &[PhaseVector::zeros()], 5, &cfg).unwrap_err();
    assert!(matches!(err, TrackError::Cancelled { turn: 0 }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn linear_ring_fast_and_full_tracking_agree(
        x in -2e-3f64..2e-3,
        xp in -2e-4f64..2e-4,
        y in -2e-3f64..2e-3,
        yp in -2e-4f64..2e-4,
    ) {
        let ring = fodo_ring(0.0);
        let start = [point(x, xp, y, yp)];
        let full = track(&ring, &start, 20, &TrackConfig::default()).unwrap();
        let fast = track(&ring, &start, 20, &TrackConfig::fast()).unwrap();
        let a = full.particles[0].coords;
        let b = fast.particles[0].coords;
        prop_assert!((a - b).amax() < 1e-10);
        prop_assert!(full.particles[0].is_alive());
    }

    #[test]
    fn drift_line_shifts_by_angle(x in -1e-2f64..1e-2, xp in -1e-2f64..1e-2, len in 0.0f64..5.0) {
        let line = load_beamline(vec![Element::drift("D", m(len))], proton(), Topology::Line).unwrap();
        let out = track(&line, &[point(x, xp, 0.0, 0.0)], 1, &TrackConfig::default()).unwrap();
        let c = out.particles[0].coords;
        prop_assert!((c[0] - (x + len * xp)).abs() < 1e-12);
        prop_assert_eq!(c[1], xp);
    }
}
