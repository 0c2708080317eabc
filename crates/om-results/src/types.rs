//! Result data types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub run_id: RunId,
    pub beamline_id: String,
    pub timestamp: String,
    pub run_type: RunType,
    pub solver_version: String,
}

impl RunManifest {
    /// Manifest stamped with the current UTC time.
    pub fn new(
        run_id: RunId,
        beamline_id: impl Into<String>,
        run_type: RunType,
        solver_version: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            beamline_id: beamline_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            run_type,
            solver_version: solver_version.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RunType {
    Twiss,
    Envelope,
    Track { turns: usize },
}

impl RunType {
    pub fn label(&self) -> &'static str {
        match self {
            RunType::Twiss => "twiss",
            RunType::Envelope => "envelope",
            RunType::Track { .. } => "track",
        }
    }
}

/// Lattice functions and closed orbit at one element boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TwissRecord {
    pub element: String,
    pub s_m: f64,
    pub beta_x_m: f64,
    pub alpha_x: f64,
    pub beta_y_m: f64,
    pub alpha_y: f64,
    pub disp_x_m: f64,
    pub disp_px: f64,
    pub disp_y_m: f64,
    pub disp_py: f64,
    pub mu_x: f64,
    pub mu_y: f64,
    pub orbit: [f64; 6],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TwissReport {
    pub qx: Option<f64>,
    pub qy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xi_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xi_y: Option<f64>,
    pub coupled: bool,
    pub iterations: usize,
    pub residual: f64,
    pub records: Vec<TwissRecord>,
}

/// Beam sizes and emittances at one element boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeRecord {
    pub element: String,
    pub s_m: f64,
    pub sigma_x_m: f64,
    pub sigma_y_m: f64,
    pub sigma_z_m: f64,
    pub emittance_x_m: f64,
    pub emittance_y_m: f64,
    pub emittance_z_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeReport {
    pub space_charge: bool,
    pub iterations: usize,
    pub residual: f64,
    pub records: Vec<EnvelopeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub turn: usize,
    pub coords: [f64; 6],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticleRecord {
    pub index: usize,
    pub coords: [f64; 6],
    pub turn: usize,
    pub alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost_element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost_element_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost_turn: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackReport {
    pub turns: usize,
    pub fast: bool,
    pub particles: Vec<ParticleRecord>,
}

impl TrackReport {
    pub fn alive_count(&self) -> usize {
        self.particles.iter().filter(|p| p.alive).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum RunReport {
    Twiss(TwissReport),
    Envelope(EnvelopeReport),
    Track(TrackReport),
}
