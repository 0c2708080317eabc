//! Project schema definitions.

use om_core::units::constants::{ELECTRON_MASS_MEV, PROTON_MASS_MEV};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub beamlines: Vec<BeamlineDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeamlineDef {
    pub id: String,
    pub name: String,
    pub topology: TopologyDef,
    pub reference: ReferenceDef,
    #[serde(default)]
    pub elements: Vec<ElementDef>,
    /// Element ids in beam order; an id may appear more than once
    pub sequence: Vec<String>,
    /// Number of times the sequence is repeated
    #[serde(default = "default_periods")]
    pub periods: usize,
    #[serde(default)]
    pub settings: SettingsDef,
}

fn default_periods() -> usize {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopologyDef {
    Ring,
    Line,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceDef {
    pub particle: ParticleDef,
    pub kinetic_mev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ParticleDef {
    Proton,
    Electron,
    Custom { mass_mev: f64, charge: f64 },
}

impl ParticleDef {
    pub fn mass_mev(&self) -> f64 {
        match self {
            ParticleDef::Proton => PROTON_MASS_MEV,
            ParticleDef::Electron => ELECTRON_MASS_MEV,
            ParticleDef::Custom { mass_mev, .. } => *mass_mev,
        }
    }

    pub fn charge(&self) -> f64 {
        match self {
            ParticleDef::Proton => 1.0,
            ParticleDef::Electron => -1.0,
            ParticleDef::Custom { charge, .. } => *charge,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementDef {
    pub id: String,
    #[serde(default)]
    pub length_m: f64,
    pub kind: ElementKindDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<ApertureDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ElementKindDef {
    Drift,
    Bend {
        field_t: f64,
        #[serde(default)]
        gradient_t_per_m: f64,
        #[serde(default)]
        edge_in_rad: f64,
        #[serde(default)]
        edge_out_rad: f64,
    },
    Quadrupole {
        gradient_t_per_m: f64,
    },
    Sextupole {
        b2_t_per_m2: f64,
    },
    /// Thin multipole, `field_integrals[n]` = B_n·L in T·m^(1−n)
    Multipole {
        field_integrals: Vec<f64>,
    },
    Solenoid {
        field_t: f64,
    },
    Cavity {
        voltage_mv: f64,
        #[serde(default)]
        phase_rad: f64,
        frequency_hz: f64,
    },
    Corrector {
        #[serde(default)]
        hkick_tm: f64,
        #[serde(default)]
        vkick_tm: f64,
    },
    Collimator {
        aperture: ApertureDef,
    },
    Wakefield {
        loss_factor_v_per_pc: f64,
        #[serde(default)]
        slope_v_per_pc_m: f64,
        bunch_charge_pc: f64,
    },
    Scatterer {
        thickness_m: f64,
        radiation_length_m: f64,
    },
    Instrument,
}

impl ElementKindDef {
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKindDef::Drift => "Drift",
            ElementKindDef::Bend { .. } => "Bend",
            ElementKindDef::Quadrupole { .. } => "Quadrupole",
            ElementKindDef::Sextupole { .. } => "Sextupole",
            ElementKindDef::Multipole { .. } => "Multipole",
            ElementKindDef::Solenoid { .. } => "Solenoid",
            ElementKindDef::Cavity { .. } => "Cavity",
            ElementKindDef::Corrector { .. } => "Corrector",
            ElementKindDef::Collimator { .. } => "Collimator",
            ElementKindDef::Wakefield { .. } => "Wakefield",
            ElementKindDef::Scatterer { .. } => "Scatterer",
            ElementKindDef::Instrument => "Instrument",
        }
    }

    /// Kinds that only exist as zero-length kicks.
    pub fn is_thin(&self) -> bool {
        matches!(
            self,
            ElementKindDef::Multipole { .. }
                | ElementKindDef::Collimator { .. }
                | ElementKindDef::Wakefield { .. }
                | ElementKindDef::Scatterer { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape")]
pub enum ApertureDef {
    Elliptic { ax_m: f64, ay_m: f64 },
    Rectangular { ax_m: f64, ay_m: f64 },
}

impl ApertureDef {
    pub fn half_widths(&self) -> (f64, f64) {
        match *self {
            ApertureDef::Elliptic { ax_m, ay_m } | ApertureDef::Rectangular { ax_m, ay_m } => {
                (ax_m, ay_m)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AlignmentDef {
    #[serde(default)]
    pub dx_m: f64,
    #[serde(default)]
    pub dy_m: f64,
    #[serde(default)]
    pub tilt_rad: f64,
}

/// Per-beamline solver settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SettingsDef {
    #[serde(default)]
    pub optics: OpticsSettingsDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeSettingsDef>,
    #[serde(default)]
    pub tracking: TrackingSettingsDef,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SolveModeDef {
    #[default]
    #[serde(rename = "4d")]
    FourD,
    #[serde(rename = "6d")]
    SixD,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpticsSettingsDef {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_relaxation")]
    pub relaxation: f64,
    #[serde(default)]
    pub mode: SolveModeDef,
    #[serde(default)]
    pub momentum_offset: f64,
    /// Momentum step for chromaticity; `None` skips it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromaticity_step: Option<f64>,
    /// Entrance lattice functions, required for lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_twiss: Option<TwissDef>,
}

impl Default for OpticsSettingsDef {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            relaxation: default_relaxation(),
            mode: SolveModeDef::default(),
            momentum_offset: 0.0,
            chromaticity_step: None,
            initial_twiss: None,
        }
    }
}

fn default_tolerance() -> f64 {
    1e-12
}

fn default_max_iterations() -> usize {
    50
}

fn default_relaxation() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TwissDef {
    pub beta_x_m: f64,
    #[serde(default)]
    pub alpha_x: f64,
    pub beta_y_m: f64,
    #[serde(default)]
    pub alpha_y: f64,
    #[serde(default)]
    pub disp_x_m: f64,
    #[serde(default)]
    pub disp_px: f64,
    #[serde(default)]
    pub disp_y_m: f64,
    #[serde(default)]
    pub disp_py: f64,
}

/// Initial beam for envelope runs, given as Twiss functions and rms
/// emittances per plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeSettingsDef {
    pub twiss: TwissDef,
    pub emittance_x_m: f64,
    pub emittance_y_m: f64,
    #[serde(default)]
    pub sigma_z_m: f64,
    #[serde(default)]
    pub sigma_delta: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_charge: Option<SpaceChargeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpaceChargeDef {
    pub peak_current_a: f64,
    #[serde(default = "default_max_slice_length")]
    pub max_slice_length_m: f64,
    #[serde(default = "default_sc_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_sc_iterations")]
    pub max_iterations: usize,
}

fn default_max_slice_length() -> f64 {
    0.05
}

fn default_sc_tolerance() -> f64 {
    1e-8
}

fn default_sc_iterations() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingSettingsDef {
    #[serde(default = "default_turns")]
    pub turns: usize,
    #[serde(default)]
    pub fast: bool,
    #[serde(default = "default_true")]
    pub aperture_losses: bool,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_record_every")]
    pub record_every: usize,
    /// Initial coordinates (x, x', y, y', z, δ)
    #[serde(default)]
    pub particles: Vec<[f64; 6]>,
}

impl Default for TrackingSettingsDef {
    fn default() -> Self {
        Self {
            turns: default_turns(),
            fast: false,
            aperture_losses: true,
            seed: 0,
            record_every: default_record_every(),
            particles: Vec::new(),
        }
    }
}

fn default_turns() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_record_every() -> usize {
    1
}
