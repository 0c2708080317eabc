//! Compilation of lattice documents into solver inputs.

use std::collections::HashMap;

use om_beamline::{Beamline, BeamlineBuilder, Topology};
use om_core::units::m;
use om_elements::{Alignment, ApertureShape, Element, ElementKind, ReferenceParticle};
use om_envelope::{MomentsConfig, SpaceChargeConfig};
use om_linalg::{PhaseVector, SymMatrix};
use om_optics::{InitialTwiss, OpticsConfig, SolveMode};
use om_project::schema::{
    ApertureDef, BeamlineDef, ElementDef, ElementKindDef, EnvelopeSettingsDef, OpticsSettingsDef,
    SolveModeDef, TopologyDef, TrackingSettingsDef, TwissDef,
};
use om_track::TrackConfig;

use crate::error::{AppError, AppResult};

/// Build the beamline: sequence entries resolved by id, repeated
/// `periods` times.
pub fn compile_beamline(def: &BeamlineDef) -> AppResult<Beamline> {
    let reference = ReferenceParticle::from_mev(
        def.reference.particle.mass_mev(),
        def.reference.kinetic_mev,
        def.reference.particle.charge(),
    )?;

    let by_id: HashMap<&str, &ElementDef> =
        def.elements.iter().map(|e| (e.id.as_str(), e)).collect();
    let cell = def
        .sequence
        .iter()
        .map(|id| {
            by_id
                .get(id.as_str())
                .map(|e| build_element(e))
                .ok_or_else(|| AppError::Compile(format!("Element not found: {id}")))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let mut builder = BeamlineBuilder::new(reference);
    builder.repeat(&cell, def.periods);
    let topology = match def.topology {
        TopologyDef::Ring => Topology::Ring,
        TopologyDef::Line => Topology::Line,
    };
    Ok(builder.build(topology)?)
}

fn aperture_shape(def: &ApertureDef) -> ApertureShape {
    match *def {
        ApertureDef::Elliptic { ax_m, ay_m } => ApertureShape::Elliptic { ax: ax_m, ay: ay_m },
        ApertureDef::Rectangular { ax_m, ay_m } => ApertureShape::Rectangular { ax: ax_m, ay: ay_m },
    }
}

fn build_element(def: &ElementDef) -> Element {
    let kind = match &def.kind {
        ElementKindDef::Drift => ElementKind::Drift,
        ElementKindDef::Bend {
            field_t,
            gradient_t_per_m,
            edge_in_rad,
            edge_out_rad,
        } => ElementKind::Bend {
            field_t: *field_t,
            gradient_t_per_m: *gradient_t_per_m,
            edge_in_rad: *edge_in_rad,
            edge_out_rad: *edge_out_rad,
        },
        ElementKindDef::Quadrupole { gradient_t_per_m } => ElementKind::Quadrupole {
            gradient_t_per_m: *gradient_t_per_m,
        },
        ElementKindDef::Sextupole { b2_t_per_m2 } => ElementKind::Sextupole {
            b2_t_per_m2: *b2_t_per_m2,
        },
        ElementKindDef::Multipole { field_integrals } => ElementKind::Multipole {
            field_integrals: field_integrals.clone(),
        },
        ElementKindDef::Solenoid { field_t } => ElementKind::Solenoid { field_t: *field_t },
        ElementKindDef::Cavity {
            voltage_mv,
            phase_rad,
            frequency_hz,
        } => ElementKind::Cavity {
            voltage_mv: *voltage_mv,
            phase_rad: *phase_rad,
            frequency_hz: *frequency_hz,
        },
        ElementKindDef::Corrector { hkick_tm, vkick_tm } => ElementKind::Corrector {
            hkick_tm: *hkick_tm,
            vkick_tm: *vkick_tm,
        },
        ElementKindDef::Collimator { aperture } => ElementKind::Aperture {
            shape: aperture_shape(aperture),
        },
        ElementKindDef::Wakefield {
            loss_factor_v_per_pc,
            slope_v_per_pc_m,
            bunch_charge_pc,
        } => ElementKind::Wakefield {
            loss_factor_v_per_pc: *loss_factor_v_per_pc,
            slope_v_per_pc_m: *slope_v_per_pc_m,
            bunch_charge_pc: *bunch_charge_pc,
        },
        ElementKindDef::Scatterer {
            thickness_m,
            radiation_length_m,
        } => ElementKind::Scatterer {
            thickness_m: *thickness_m,
            radiation_length_m: *radiation_length_m,
        },
        ElementKindDef::Instrument => ElementKind::Instrument,
    };

    let mut element = Element::new(def.id.clone(), m(def.length_m), kind);
    if let Some(aperture) = &def.aperture {
        element = element.with_aperture(aperture_shape(aperture));
    }
    if let Some(a) = &def.alignment {
        element = element.with_alignment(Alignment {
            dx: a.dx_m,
            dy: a.dy_m,
            tilt: a.tilt_rad,
        });
    }
    element
}

pub fn initial_twiss(def: &TwissDef) -> InitialTwiss {
    InitialTwiss {
        beta_x: def.beta_x_m,
        alpha_x: def.alpha_x,
        beta_y: def.beta_y_m,
        alpha_y: def.alpha_y,
        disp_x: def.disp_x_m,
        disp_px: def.disp_px,
        disp_y: def.disp_y_m,
        disp_py: def.disp_py,
    }
}

pub fn optics_config(settings: &OpticsSettingsDef) -> OpticsConfig {
    OpticsConfig {
        tolerance: settings.tolerance,
        max_iterations: settings.max_iterations,
        relaxation: settings.relaxation,
        mode: match settings.mode {
            SolveModeDef::FourD => SolveMode::FourD,
            SolveModeDef::SixD => SolveMode::SixD,
        },
        momentum_offset: settings.momentum_offset,
        initial_twiss: settings.initial_twiss.as_ref().map(initial_twiss),
        ..OpticsConfig::default()
    }
}

/// Σ of a beam with the given Twiss functions, emittances and momentum
/// spread. Dispersion correlates the transverse coordinates with δ.
pub fn initial_sigma(env: &EnvelopeSettingsDef) -> SymMatrix {
    let t = &env.twiss;
    let mut sigma = SymMatrix::zeros();
    for (offset, beta, alpha, emittance) in [
        (0, t.beta_x_m, t.alpha_x, env.emittance_x_m),
        (2, t.beta_y_m, t.alpha_y, env.emittance_y_m),
    ] {
        let gamma = (1.0 + alpha * alpha) / beta;
        sigma.set(offset, offset, emittance * beta);
        sigma.set(offset, offset + 1, -emittance * alpha);
        sigma.set(offset + 1, offset + 1, emittance * gamma);
    }

    let spread2 = env.sigma_delta * env.sigma_delta;
    sigma.set(4, 4, env.sigma_z_m * env.sigma_z_m);
    sigma.set(5, 5, spread2);
    let disp = [t.disp_x_m, t.disp_px, t.disp_y_m, t.disp_py];
    for i in 0..4 {
        sigma.set(i, 5, disp[i] * spread2);
        for j in i..4 {
            sigma.set(i, j, sigma.get(i, j) + disp[i] * disp[j] * spread2);
        }
    }
    sigma
}

pub fn moments_config(env: &EnvelopeSettingsDef) -> MomentsConfig {
    MomentsConfig {
        space_charge: env.space_charge.as_ref().map(|sc| SpaceChargeConfig {
            peak_current_a: sc.peak_current_a,
            max_slice_length: sc.max_slice_length_m,
            tolerance: sc.tolerance,
            max_iterations: sc.max_iterations,
        }),
        cancel: None,
    }
}

pub fn track_config(tracking: &TrackingSettingsDef) -> TrackConfig {
    TrackConfig {
        fast: tracking.fast,
        aperture_losses: tracking.aperture_losses,
        seed: tracking.seed,
        record_every: tracking.record_every,
        cancel: None,
    }
}

pub fn initial_particles(tracking: &TrackingSettingsDef) -> Vec<PhaseVector> {
    tracking
        .particles
        .iter()
        .map(|p| PhaseVector::from_column_slice(p))
        .collect()
}
