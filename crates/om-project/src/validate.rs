//! Project validation logic.

use crate::schema::{
    ApertureDef, BeamlineDef, ElementDef, ElementKindDef, Project, SettingsDef, TopologyDef,
    TwissDef,
};
use std::collections::HashSet;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, value, "must be finite"))
    }
}

fn require_positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be positive"))
    }
}

fn require_non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be non-negative"))
    }
}

pub fn validate_project(project: &Project) -> Result<(), ValidationError> {
    if project.version == 0 || project.version > crate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: project.version,
        });
    }

    let mut beamline_ids = HashSet::new();
    for beamline in &project.beamlines {
        if !beamline_ids.insert(&beamline.id) {
            return Err(ValidationError::DuplicateId {
                id: beamline.id.clone(),
                context: "beamlines".to_string(),
            });
        }
        validate_beamline(beamline)?;
    }

    Ok(())
}

pub fn validate_beamline(beamline: &BeamlineDef) -> Result<(), ValidationError> {
    let reference = &beamline.reference;
    require_positive("reference.kinetic_mev", reference.kinetic_mev)?;
    require_positive("reference.particle.mass_mev", reference.particle.mass_mev())?;
    let charge = reference.particle.charge();
    if !(charge.is_finite() && charge != 0.0) {
        return Err(invalid(
            "reference.particle.charge",
            charge,
            "must be finite and non-zero",
        ));
    }

    let mut element_ids = HashSet::new();
    for element in &beamline.elements {
        if !element_ids.insert(element.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: element.id.clone(),
                context: format!("beamline '{}' elements", beamline.id),
            });
        }
        validate_element(element)?;
    }

    if beamline.sequence.is_empty() {
        return Err(invalid(
            format!("beamline '{}' sequence", beamline.id),
            "[]",
            "a beamline needs at least one element",
        ));
    }
    for id in &beamline.sequence {
        if !element_ids.contains(id.as_str()) {
            return Err(ValidationError::MissingReference {
                id: id.clone(),
                context: format!("beamline '{}' sequence", beamline.id),
            });
        }
    }
    if beamline.periods == 0 {
        return Err(invalid("periods", 0, "must be at least 1"));
    }

    validate_settings(&beamline.settings, beamline.topology)
}

fn validate_element(element: &ElementDef) -> Result<(), ValidationError> {
    let field = |name: &str| format!("element '{}' {name}", element.id);

    require_non_negative(&field("length_m"), element.length_m)?;
    if element.kind.is_thin() && element.length_m != 0.0 {
        return Err(invalid(
            field("length_m"),
            element.length_m,
            "thin element must have zero length",
        ));
    }

    match &element.kind {
        ElementKindDef::Drift | ElementKindDef::Instrument => {}
        ElementKindDef::Bend {
            field_t,
            gradient_t_per_m,
            edge_in_rad,
            edge_out_rad,
        } => {
            for (name, v) in [
                ("field_t", field_t),
                ("gradient_t_per_m", gradient_t_per_m),
                ("edge_in_rad", edge_in_rad),
                ("edge_out_rad", edge_out_rad),
            ] {
                require_finite(&field(name), *v)?;
            }
        }
        ElementKindDef::Quadrupole { gradient_t_per_m } => {
            require_finite(&field("gradient_t_per_m"), *gradient_t_per_m)?
        }
        ElementKindDef::Sextupole { b2_t_per_m2 } => {
            require_finite(&field("b2_t_per_m2"), *b2_t_per_m2)?
        }
        ElementKindDef::Multipole { field_integrals } => {
            for b in field_integrals {
                require_finite(&field("field_integrals"), *b)?;
            }
        }
        ElementKindDef::Solenoid { field_t } => require_finite(&field("field_t"), *field_t)?,
        ElementKindDef::Cavity {
            voltage_mv,
            phase_rad,
            frequency_hz,
        } => {
            require_finite(&field("voltage_mv"), *voltage_mv)?;
            require_finite(&field("phase_rad"), *phase_rad)?;
            require_positive(&field("frequency_hz"), *frequency_hz)?;
        }
        ElementKindDef::Corrector { hkick_tm, vkick_tm } => {
            require_finite(&field("hkick_tm"), *hkick_tm)?;
            require_finite(&field("vkick_tm"), *vkick_tm)?;
        }
        ElementKindDef::Collimator { aperture } => validate_aperture(&field("aperture"), aperture)?,
        ElementKindDef::Wakefield {
            loss_factor_v_per_pc,
            slope_v_per_pc_m,
            bunch_charge_pc,
        } => {
            require_finite(&field("loss_factor_v_per_pc"), *loss_factor_v_per_pc)?;
            require_finite(&field("slope_v_per_pc_m"), *slope_v_per_pc_m)?;
            require_finite(&field("bunch_charge_pc"), *bunch_charge_pc)?;
        }
        ElementKindDef::Scatterer {
            thickness_m,
            radiation_length_m,
        } => {
            require_non_negative(&field("thickness_m"), *thickness_m)?;
            require_positive(&field("radiation_length_m"), *radiation_length_m)?;
        }
    }

    if let Some(aperture) = &element.aperture {
        validate_aperture(&field("aperture"), aperture)?;
    }
    if let Some(a) = &element.alignment {
        require_finite(&field("alignment.dx_m"), a.dx_m)?;
        require_finite(&field("alignment.dy_m"), a.dy_m)?;
        require_finite(&field("alignment.tilt_rad"), a.tilt_rad)?;
    }
    Ok(())
}

fn validate_aperture(field: &str, aperture: &ApertureDef) -> Result<(), ValidationError> {
    let (ax, ay) = aperture.half_widths();
    require_positive(&format!("{field}.ax_m"), ax)?;
    require_positive(&format!("{field}.ay_m"), ay)
}

fn validate_twiss(field: &str, twiss: &TwissDef) -> Result<(), ValidationError> {
    require_positive(&format!("{field}.beta_x_m"), twiss.beta_x_m)?;
    require_positive(&format!("{field}.beta_y_m"), twiss.beta_y_m)?;
    for (name, v) in [
        ("alpha_x", twiss.alpha_x),
        ("alpha_y", twiss.alpha_y),
        ("disp_x_m", twiss.disp_x_m),
        ("disp_px", twiss.disp_px),
        ("disp_y_m", twiss.disp_y_m),
        ("disp_py", twiss.disp_py),
    ] {
        require_finite(&format!("{field}.{name}"), v)?;
    }
    Ok(())
}

fn validate_settings(settings: &SettingsDef, topology: TopologyDef) -> Result<(), ValidationError> {
    let optics = &settings.optics;
    require_positive("optics.tolerance", optics.tolerance)?;
    if optics.max_iterations == 0 {
        return Err(invalid("optics.max_iterations", 0, "must be positive"));
    }
    if !(optics.relaxation > 0.0 && optics.relaxation <= 1.0) {
        return Err(invalid(
            "optics.relaxation",
            optics.relaxation,
            "must be in (0, 1]",
        ));
    }
    require_finite("optics.momentum_offset", optics.momentum_offset)?;
    if let Some(step) = optics.chromaticity_step {
        require_positive("optics.chromaticity_step", step)?;
    }
    if let Some(twiss) = &optics.initial_twiss {
        validate_twiss("optics.initial_twiss", twiss)?;
    }

    if let Some(envelope) = &settings.envelope {
        validate_twiss("envelope.twiss", &envelope.twiss)?;
        require_non_negative("envelope.emittance_x_m", envelope.emittance_x_m)?;
        require_non_negative("envelope.emittance_y_m", envelope.emittance_y_m)?;
        require_non_negative("envelope.sigma_z_m", envelope.sigma_z_m)?;
        require_non_negative("envelope.sigma_delta", envelope.sigma_delta)?;
        if let Some(sc) = &envelope.space_charge {
            require_non_negative("space_charge.peak_current_a", sc.peak_current_a)?;
            require_positive("space_charge.max_slice_length_m", sc.max_slice_length_m)?;
            require_positive("space_charge.tolerance", sc.tolerance)?;
            if sc.max_iterations == 0 {
                return Err(invalid("space_charge.max_iterations", 0, "must be positive"));
            }
        }
    }

    let tracking = &settings.tracking;
    if tracking.record_every == 0 {
        return Err(invalid("tracking.record_every", 0, "must be positive"));
    }
    if topology == TopologyDef::Line && tracking.turns > 1 {
        return Err(invalid(
            "tracking.turns",
            tracking.turns,
            "a line is tracked for a single pass",
        ));
    }
    for (i, p) in tracking.particles.iter().enumerate() {
        if p.iter().any(|v| !v.is_finite()) {
            return Err(invalid(
                format!("tracking.particles[{i}]"),
                format!("{p:?}"),
                "coordinates must be finite",
            ));
        }
    }
    Ok(())
}
