//! Element kinds, apertures, and misalignments.

/// Physical aperture in the element frame (half widths in m).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ApertureShape {
    Elliptic { ax: f64, ay: f64 },
    Rectangular { ax: f64, ay: f64 },
}

impl ApertureShape {
    pub fn half_widths(&self) -> (f64, f64) {
        match *self {
            ApertureShape::Elliptic { ax, ay } | ApertureShape::Rectangular { ax, ay } => (ax, ay),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        match *self {
            ApertureShape::Elliptic { ax, ay } => {
                let u = x / ax;
                let v = y / ay;
                u * u + v * v <= 1.0
            }
            ApertureShape::Rectangular { ax, ay } => x.abs() <= ax && y.abs() <= ay,
        }
    }

    pub fn is_valid(&self) -> bool {
        let (ax, ay) = self.half_widths();
        ax.is_finite() && ay.is_finite() && ax > 0.0 && ay > 0.0
    }
}

/// Transverse misalignment of an element.
///
/// Offsets shift particles into the element frame in the tracking map.
/// The tilt rotates the linear map about the longitudinal axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Alignment {
    pub dx: f64,
    pub dy: f64,
    pub tilt: f64,
}

impl Alignment {
    pub fn is_ideal(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0 && self.tilt == 0.0
    }

    pub fn has_offset(&self) -> bool {
        self.dx != 0.0 || self.dy != 0.0
    }
}

/// Closed set of element kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    Drift,
    /// Sector bend; a non-zero gradient makes it combined function.
    Bend {
        field_t: f64,
        gradient_t_per_m: f64,
        edge_in_rad: f64,
        edge_out_rad: f64,
    },
    Quadrupole {
        gradient_t_per_m: f64,
    },
    /// Thick sextupole, B_y = b2/2 (x² − y²).
    Sextupole {
        b2_t_per_m2: f64,
    },
    /// Thin multipole. Entry n is the integrated normal field derivative
    /// B_n·L in T·m^(1−n), so index 0 is a dipole kick and index 1 a thin
    /// quadrupole.
    Multipole {
        field_integrals: Vec<f64>,
    },
    Solenoid {
        field_t: f64,
    },
    /// RF cavity, phase 0 on crest.
    Cavity {
        voltage_mv: f64,
        phase_rad: f64,
        frequency_hz: f64,
    },
    /// Steering corrector with integrated dipole fields B_y·L and B_x·L.
    Corrector {
        hkick_tm: f64,
        vkick_tm: f64,
    },
    Aperture {
        shape: ApertureShape,
    },
    /// Lumped longitudinal wake: average energy loss and linear chirp.
    Wakefield {
        loss_factor_v_per_pc: f64,
        slope_v_per_pc_m: f64,
        bunch_charge_pc: f64,
    },
    /// Thin foil producing multiple Coulomb scattering.
    Scatterer {
        thickness_m: f64,
        radiation_length_m: f64,
    },
    Instrument,
}

impl ElementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Drift => "drift",
            ElementKind::Bend { .. } => "bend",
            ElementKind::Quadrupole { .. } => "quadrupole",
            ElementKind::Sextupole { .. } => "sextupole",
            ElementKind::Multipole { .. } => "multipole",
            ElementKind::Solenoid { .. } => "solenoid",
            ElementKind::Cavity { .. } => "cavity",
            ElementKind::Corrector { .. } => "corrector",
            ElementKind::Aperture { .. } => "aperture",
            ElementKind::Wakefield { .. } => "wakefield",
            ElementKind::Scatterer { .. } => "scatterer",
            ElementKind::Instrument => "instrument",
        }
    }

    /// Kinds that must have zero length.
    pub fn is_thin_only(&self) -> bool {
        matches!(
            self,
            ElementKind::Multipole { .. }
                | ElementKind::Wakefield { .. }
                | ElementKind::Scatterer { .. }
        )
    }

    /// All scalar parameters, for finiteness checks.
    pub(crate) fn parameters(&self) -> Vec<f64> {
        match self {
            ElementKind::Drift | ElementKind::Instrument => Vec::new(),
            ElementKind::Bend {
                field_t,
                gradient_t_per_m,
                edge_in_rad,
                edge_out_rad,
            } => vec![*field_t, *gradient_t_per_m, *edge_in_rad, *edge_out_rad],
            ElementKind::Quadrupole { gradient_t_per_m } => vec![*gradient_t_per_m],
            ElementKind::Sextupole { b2_t_per_m2 } => vec![*b2_t_per_m2],
            ElementKind::Multipole { field_integrals } => field_integrals.clone(),
            ElementKind::Solenoid { field_t } => vec![*field_t],
            ElementKind::Cavity {
                voltage_mv,
                phase_rad,
                frequency_hz,
            } => vec![*voltage_mv, *phase_rad, *frequency_hz],
            ElementKind::Corrector { hkick_tm, vkick_tm } => vec![*hkick_tm, *vkick_tm],
            ElementKind::Aperture { shape } => {
                let (ax, ay) = shape.half_widths();
                vec![ax, ay]
            }
            ElementKind::Wakefield {
                loss_factor_v_per_pc,
                slope_v_per_pc_m,
                bunch_charge_pc,
            } => vec![*loss_factor_v_per_pc, *slope_v_per_pc_m, *bunch_charge_pc],
            ElementKind::Scatterer {
                thickness_m,
                radiation_length_m,
            } => vec![*thickness_m, *radiation_length_m],
        }
    }
}
