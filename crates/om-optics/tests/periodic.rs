//! Ring and line optics scenarios.

use om_beamline::{Beamline, BeamlineBuilder, Topology};
use om_core::CancelToken;
use om_core::units::{m, mev};
use om_elements::{Alignment, Element, ReferenceParticle};
use om_optics::{
    InitialTwiss, OpticsConfig, OpticsError, SolveMode, chromaticity, solve_periodic_optics,
};
use proptest::prelude::*;
use std::f64::consts::{PI, TAU};

fn proton() -> ReferenceParticle {
    ReferenceParticle::proton(mev(100.0)).unwrap()
}

fn fodo_cell(gl_f: f64, gl_d: f64, drift: f64) -> Vec<Element> {
    vec![
        Element::thin_quadrupole("QF", gl_f),
        Element::drift("D1", m(drift)),
        Element::thin_quadrupole("QD", gl_d),
        Element::drift("D2", m(drift)),
    ]
}

fn ring(cells: usize, extra: Vec<Element>) -> Beamline {
    let mut builder = BeamlineBuilder::new(proton());
    builder.extend(extra);
    builder.repeat(&fodo_cell(0.5, -0.5, 2.0), cells);
    builder.build(Topology::Ring).unwrap()
}

#[test]
fn thin_fodo_phase_advance_matches_closed_form() {
    let p = proton();
    let gl = 0.5;
    let l = 2.0;
    let f = p.rigidity_tm() / gl;
    let bl = ring(1, Vec::new());
    let sol = solve_periodic_optics(&bl, &OpticsConfig::default()).unwrap();

    let cos_mu = 1.0 - l * l / (2.0 * f * f);
    let mu = sol.twiss.last().unwrap().mu_x;
    assert!((mu.cos() - cos_mu).abs() < 1e-6);
    assert!((sol.twiss.last().unwrap().mu_y.cos() - cos_mu).abs() < 1e-6);

    let tunes = sol.tunes.unwrap();
    assert!((tunes.qx - mu / TAU).abs() < 1e-12);

    // β at the focusing lens: 2L (1 + sin(μ/2)) / sin μ
    let mu_exact = cos_mu.acos();
    let beta_max = 2.0 * l * (1.0 + (mu_exact / 2.0).sin()) / mu_exact.sin();
    assert!((sol.twiss[0].beta_x - beta_max).abs() < 1e-9 * beta_max);

    for t in &sol.twiss {
        assert!(t.beta_x > 0.0 && t.beta_y > 0.0);
        assert!(t.disp_x.abs() < 1e-12);
    }
    assert!(!sol.coupled);
    assert_eq!(sol.iterations, 0);
}

#[test]
fn periodic_functions_close_on_themselves() {
    let bl = ring(6, Vec::new());
    let sol = solve_periodic_optics(&bl, &OpticsConfig::default()).unwrap();
    let first = &sol.twiss[0];
    let last = sol.twiss.last().unwrap();
    assert!((first.beta_x - last.beta_x).abs() < 1e-9);
    assert!((first.alpha_y - last.alpha_y).abs() < 1e-9);
    assert_eq!(sol.twiss.len(), bl.len() + 1);
}

#[test]
fn overfocused_ring_is_unstable() {
    let mut builder = BeamlineBuilder::new(proton());
    builder.repeat(&fodo_cell(5.0, -5.0, 2.0), 2);
    let bl = builder.build(Topology::Ring).unwrap();
    let err = solve_periodic_optics(&bl, &OpticsConfig::default()).unwrap_err();
    match err {
        OpticsError::UnstableLattice { half_trace, .. } => assert!(half_trace.abs() >= 1.0),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn corrector_orbit_matches_perturbation_theory() {
    let p = proton();
    let hkick = 1e-5;
    let extra = vec![
        Element::corrector("HC", m(0.0), hkick, 0.0),
        Element::multipole("SX", vec![0.0, 0.0, 0.5]),
    ];
    let bl = ring(8, extra);
    let sol = solve_periodic_optics(&bl, &OpticsConfig::default()).unwrap();
    assert!(sol.iterations >= 1);
    assert!(sol.residual < 1e-12);

    let theta = -hkick / p.rigidity_tm();
    let beta = sol.twiss[0].beta_x;
    let q = sol.tunes.unwrap().qx;
    let expected = theta * beta / (2.0 * (PI * q).tan());
    let x = sol.orbit[0][0];
    assert!(
        ((x - expected) / expected).abs() < 1e-3,
        "x = {x}, expected = {expected}"
    );
    // the vertical orbit is untouched
    assert!(sol.orbit.iter().all(|v| v[2].abs() < 1e-15));
}

#[test]
fn cancelled_solve_stops() {
    let token = CancelToken::new();
    token.cancel();
    let bl = ring(4, vec![Element::corrector("HC", m(0.0), 1e-5, 0.0)]);
    let config = OpticsConfig::default().with_cancel(token);
    assert!(matches!(
        solve_periodic_optics(&bl, &config),
        Err(OpticsError::Cancelled { iterations: 0 })
    ));
}

#[test]
fn iteration_cap_reports_convergence_failure() {
    let bl = ring(
        4,
        vec![
            Element::corrector("HC", m(0.0), 2e-3, 0.0),
            Element::multipole("SX", vec![0.0, 0.0, 400.0]),
        ],
    );
    let config = OpticsConfig {
        max_iterations: 1,
        tolerance: 1e-15,
        ..OpticsConfig::default()
    };
    match solve_periodic_optics(&bl, &config) {
        Err(OpticsError::ConvergenceFailure {
            iterations,
            residual,
            last_orbit,
        }) => {
            assert_eq!(iterations, 1);
            assert!(residual >= 1e-15);
            assert!(last_orbit[0] != 0.0);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn line_propagates_initial_optics_through_drift() {
    let mut builder = BeamlineBuilder::new(proton());
    builder.push(Element::drift("D", m(3.0)));
    let bl = builder.build(Topology::Line).unwrap();

    let config = OpticsConfig::default().with_initial_twiss(InitialTwiss::new(2.0, 0.0, 4.0, 0.0));
    let sol = solve_periodic_optics(&bl, &config).unwrap();
    let end = &sol.twiss[1];
    assert!((end.beta_x - 6.5).abs() < 1e-12);
    assert!((end.alpha_x + 1.5).abs() < 1e-12);
    assert!((end.beta_y - (4.0 + 9.0 / 4.0)).abs() < 1e-12);
    assert!((end.mu_x - 1.5_f64.atan()).abs() < 1e-12);
    assert!(sol.tunes.is_none());
}

#[test]
fn line_without_initial_optics_is_rejected() {
    let mut builder = BeamlineBuilder::new(proton());
    builder.push(Element::drift("D", m(3.0)));
    let bl = builder.build(Topology::Line).unwrap();
    assert!(matches!(
        solve_periodic_optics(&bl, &OpticsConfig::default()),
        Err(OpticsError::InvalidConfiguration { .. })
    ));
}

#[test]
fn skew_quadrupole_produces_coupled_modes() {
    let skew = Element::quadrupole("SQ", m(0.1), 0.3).with_alignment(Alignment {
        tilt: PI / 4.0,
        ..Alignment::default()
    });
    let mut builder = BeamlineBuilder::new(proton());
    builder.push(skew);
    builder.repeat(&fodo_cell(0.5, -0.6, 2.0), 5);
    let bl = builder.build(Topology::Ring).unwrap();

    let sol = solve_periodic_optics(&bl, &OpticsConfig::default()).unwrap();
    assert!(sol.coupled);
    let first = &sol.twiss[0];
    let last = sol.twiss.last().unwrap();
    let modes = first.modes.unwrap();
    assert!(modes.beta_1x > 0.0 && modes.beta_2y > 0.0);
    assert!(modes.beta_1y > 0.0);
    assert!((first.beta_x - last.beta_x).abs() < 1e-6 * first.beta_x);
    let tunes = sol.tunes.unwrap();
    assert!(tunes.qx > 0.0 && tunes.qy > 0.0);
}

#[test]
fn fodo_natural_chromaticity_is_negative() {
    let bl = ring(8, Vec::new());
    let xi = chromaticity(&bl, &OpticsConfig::default(), 1e-4).unwrap();
    assert!(xi.xi_x < 0.0, "xi_x = {}", xi.xi_x);
    assert!(xi.xi_y < 0.0, "xi_y = {}", xi.xi_y);
}

#[test]
fn bends_create_periodic_dispersion() {
    let cell = vec![
        Element::thin_quadrupole("QF", 0.5),
        Element::bend("B1", m(2.0), 0.05),
        Element::thin_quadrupole("QD", -0.5),
        Element::bend("B2", m(2.0), 0.05),
    ];
    let mut builder = BeamlineBuilder::new(proton());
    builder.repeat(&cell, 4);
    let bl = builder.build(Topology::Ring).unwrap();
    let sol = solve_periodic_optics(&bl, &OpticsConfig::default()).unwrap();
    let first = &sol.twiss[0];
    let last = sol.twiss.last().unwrap();
    assert!(first.disp_x > 0.0);
    assert!((first.disp_x - last.disp_x).abs() < 1e-9);
    assert!(first.disp_y.abs() < 1e-15);
}

#[test]
fn six_d_mode_reports_synchrotron_tune() {
    let bl = ring(
        8,
        vec![Element::cavity("RF", m(0.0), 0.05, -PI / 2.0, 100e6)],
    );
    let config = OpticsConfig {
        mode: SolveMode::SixD,
        ..OpticsConfig::default()
    };
    let sol = solve_periodic_optics(&bl, &config).unwrap();
    let qs = sol.tunes.unwrap().qs.unwrap();
    assert!(qs > 0.0 && qs < 0.1, "qs = {qs}");
}

#[test]
fn six_d_mode_needs_rf() {
    let bl = ring(2, Vec::new());
    let config = OpticsConfig {
        mode: SolveMode::SixD,
        ..OpticsConfig::default()
    };
    assert!(matches!(
        solve_periodic_optics(&bl, &config),
        Err(OpticsError::InvalidConfiguration { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stable_thin_fodo_is_periodic(gl in 0.1f64..1.2, drift in 0.5f64..2.0, cells in 1usize..5) {
        let mut builder = BeamlineBuilder::new(proton());
        builder.repeat(&fodo_cell(gl, -gl, drift), cells);
        let bl = builder.build(Topology::Ring).unwrap();
        let sol = solve_periodic_optics(&bl, &OpticsConfig::default()).unwrap();

        let first = &sol.twiss[0];
        let last = sol.twiss.last().unwrap();
        prop_assert!((first.beta_x - last.beta_x).abs() < 1e-8 * first.beta_x);
        prop_assert!((first.alpha_y - last.alpha_y).abs() < 1e-8 * (1.0 + first.alpha_y.abs()));
        prop_assert!(sol.twiss.iter().all(|t| t.beta_x > 0.0 && t.beta_y > 0.0));

        let f = proton().rigidity_tm() / gl;
        let cos_mu = 1.0 - drift * drift / (2.0 * f * f);
        let tunes = sol.tunes.unwrap();
        let cell_mu = TAU * tunes.qx / cells as f64;
        prop_assert!((cell_mu.cos() - cos_mu).abs() < 1e-6);
    }
}
