//! Beamline element: kind, geometry, aperture and alignment.

use crate::error::{ElementError, ElementResult};
use crate::kick::track_body;
use crate::kind::{Alignment, ApertureShape, ElementKind};
use crate::linear::{body_matrix, reference_energy_gain_mev};
use crate::reference::ReferenceParticle;
use om_core::units::{Length, m};
use om_linalg::{PhaseVector, RMatrix, rotation};

/// Relative tolerance when comparing a sub-length to the full length.
const LENGTH_EPS: f64 = 1e-12;

/// One element of a beamline.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub name: String,
    pub length: Length,
    pub kind: ElementKind,
    /// Physical aperture. Tracking checks it at the entrance of elements
    /// with length and at the exit of every element.
    pub aperture: Option<ApertureShape>,
    pub alignment: Alignment,
}

impl Element {
    pub fn new(name: impl Into<String>, length: Length, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            length,
            kind,
            aperture: None,
            alignment: Alignment::default(),
        }
    }

    pub fn drift(name: impl Into<String>, length: Length) -> Self {
        Self::new(name, length, ElementKind::Drift)
    }

    /// Sector bend with field `field_t` and no pole face rotation.
    pub fn bend(name: impl Into<String>, length: Length, field_t: f64) -> Self {
        Self::new(
            name,
            length,
            ElementKind::Bend {
                field_t,
                gradient_t_per_m: 0.0,
                edge_in_rad: 0.0,
                edge_out_rad: 0.0,
            },
        )
    }

    pub fn quadrupole(name: impl Into<String>, length: Length, gradient_t_per_m: f64) -> Self {
        Self::new(name, length, ElementKind::Quadrupole { gradient_t_per_m })
    }

    pub fn sextupole(name: impl Into<String>, length: Length, b2_t_per_m2: f64) -> Self {
        Self::new(name, length, ElementKind::Sextupole { b2_t_per_m2 })
    }

    pub fn multipole(name: impl Into<String>, field_integrals: Vec<f64>) -> Self {
        Self::new(name, m(0.0), ElementKind::Multipole { field_integrals })
    }

    /// Thin quadrupole with integrated gradient `gl_t` (T).
    pub fn thin_quadrupole(name: impl Into<String>, gl_t: f64) -> Self {
        Self::multipole(name, vec![0.0, gl_t])
    }

    pub fn solenoid(name: impl Into<String>, length: Length, field_t: f64) -> Self {
        Self::new(name, length, ElementKind::Solenoid { field_t })
    }

    pub fn cavity(
        name: impl Into<String>,
        length: Length,
        voltage_mv: f64,
        phase_rad: f64,
        frequency_hz: f64,
    ) -> Self {
        Self::new(
            name,
            length,
            ElementKind::Cavity {
                voltage_mv,
                phase_rad,
                frequency_hz,
            },
        )
    }

    pub fn corrector(name: impl Into<String>, length: Length, hkick_tm: f64, vkick_tm: f64) -> Self {
        Self::new(name, length, ElementKind::Corrector { hkick_tm, vkick_tm })
    }

    pub fn collimator(name: impl Into<String>, shape: ApertureShape) -> Self {
        Self::new(name, m(0.0), ElementKind::Aperture { shape })
    }

    pub fn wakefield(
        name: impl Into<String>,
        loss_factor_v_per_pc: f64,
        slope_v_per_pc_m: f64,
        bunch_charge_pc: f64,
    ) -> Self {
        Self::new(
            name,
            m(0.0),
            ElementKind::Wakefield {
                loss_factor_v_per_pc,
                slope_v_per_pc_m,
                bunch_charge_pc,
            },
        )
    }

    pub fn scatterer(name: impl Into<String>, thickness_m: f64, radiation_length_m: f64) -> Self {
        Self::new(
            name,
            m(0.0),
            ElementKind::Scatterer {
                thickness_m,
                radiation_length_m,
            },
        )
    }

    pub fn instrument(name: impl Into<String>) -> Self {
        Self::new(name, m(0.0), ElementKind::Instrument)
    }

    pub fn with_aperture(mut self, shape: ApertureShape) -> Self {
        self.aperture = Some(shape);
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Pole face rotations of a bend; no effect on other kinds.
    pub fn with_edges(mut self, edge_in: f64, edge_out: f64) -> Self {
        if let ElementKind::Bend {
            edge_in_rad,
            edge_out_rad,
            ..
        } = &mut self.kind
        {
            *edge_in_rad = edge_in;
            *edge_out_rad = edge_out;
        }
        self
    }

    pub fn length_m(&self) -> f64 {
        self.length.value
    }

    fn invalid(&self, what: &'static str) -> ElementError {
        ElementError::InvalidParameter {
            element: self.name.clone(),
            what,
        }
    }

    /// Check the element invariants.
    pub fn validate(&self) -> ElementResult<()> {
        let len = self.length_m();
        if !(len.is_finite() && len >= 0.0) {
            return Err(self.invalid("length must be finite and non-negative"));
        }
        if self.kind.parameters().iter().any(|v| !v.is_finite()) {
            return Err(self.invalid("strengths must be finite"));
        }
        if self.kind.is_thin_only() && len != 0.0 {
            return Err(self.invalid("thin element must have zero length"));
        }
        if !self.alignment.dx.is_finite()
            || !self.alignment.dy.is_finite()
            || !self.alignment.tilt.is_finite()
        {
            return Err(self.invalid("alignment must be finite"));
        }
        if let Some(shape) = &self.aperture
            && !shape.is_valid()
        {
            return Err(self.invalid("aperture half-widths must be positive"));
        }
        match &self.kind {
            ElementKind::Aperture { shape } if !shape.is_valid() => {
                Err(self.invalid("aperture half-widths must be positive"))
            }
            ElementKind::Scatterer {
                thickness_m,
                radiation_length_m,
            } if *thickness_m < 0.0 || *radiation_length_m <= 0.0 => Err(self.invalid(
                "scatterer needs non-negative thickness and positive radiation length",
            )),
            ElementKind::Cavity {
                voltage_mv,
                frequency_hz,
                ..
            } if *voltage_mv != 0.0 && *frequency_hz <= 0.0 => {
                Err(self.invalid("cavity frequency must be positive"))
            }
            _ => Ok(()),
        }
    }

    /// Reference particle at the element exit.
    pub fn reference_after(&self, reference: &ReferenceParticle) -> ElementResult<ReferenceParticle> {
        let gain = reference_energy_gain_mev(&self.kind, reference);
        if gain == 0.0 {
            return Ok(*reference);
        }
        reference.with_kinetic(reference.kinetic_mev() + gain)
    }

    /// Linear map over the full element.
    pub fn transfer_matrix(&self, reference: &ReferenceParticle) -> ElementResult<RMatrix> {
        let body = body_matrix(&self.kind, self.length_m(), reference, true, true)?;
        Ok(self.apply_tilt(body))
    }

    /// Linear map from the entrance to `sub_length` into the element.
    pub fn transfer_matrix_for_length(
        &self,
        sub_length: f64,
        reference: &ReferenceParticle,
    ) -> ElementResult<RMatrix> {
        let len = self.length_m();
        if !(sub_length.is_finite() && sub_length >= 0.0 && sub_length <= len * (1.0 + LENGTH_EPS))
        {
            return Err(self.invalid("sub-length outside the element"));
        }
        if len == 0.0 {
            return self.transfer_matrix(reference);
        }
        self.portion(0.0, sub_length / len).transfer_matrix(reference)
    }

    /// Track one particle through the element, including misalignments.
    pub fn track(&self, coords: &mut PhaseVector, reference: &ReferenceParticle) -> ElementResult<()> {
        let a = self.alignment;
        if a.is_ideal() {
            return track_body(&self.kind, self.length_m(), reference, coords);
        }
        coords[0] -= a.dx;
        coords[2] -= a.dy;
        if a.tilt != 0.0 {
            *coords = rotation(a.tilt) * *coords;
        }
        track_body(&self.kind, self.length_m(), reference, coords)?;
        if a.tilt != 0.0 {
            *coords = rotation(-a.tilt) * *coords;
        }
        coords[0] += a.dx;
        coords[2] += a.dy;
        Ok(())
    }

    /// True when the particle is inside every aperture of the element.
    ///
    /// Coordinates are in the lab frame; offsets and tilt are removed first.
    pub fn within_aperture(&self, coords: &PhaseVector) -> bool {
        let shapes = [
            self.aperture,
            match self.kind {
                ElementKind::Aperture { shape } => Some(shape),
                _ => None,
            },
        ];
        if shapes.iter().all(Option::is_none) {
            return coords[0].is_finite() && coords[2].is_finite();
        }
        let a = self.alignment;
        let (x, y) = (coords[0] - a.dx, coords[2] - a.dy);
        let (s, c) = a.tilt.sin_cos();
        let (xe, ye) = (c * x + s * y, -s * x + c * y);
        shapes.iter().flatten().all(|shape| shape.contains(xe, ye))
    }

    /// True when the element needs the nonlinear tracking map.
    pub fn is_nonlinear(&self) -> bool {
        match &self.kind {
            ElementKind::Sextupole { b2_t_per_m2 } => *b2_t_per_m2 != 0.0,
            ElementKind::Multipole { field_integrals } => {
                field_integrals.iter().skip(2).any(|b| *b != 0.0)
            }
            _ => false,
        }
    }

    /// True when the element displaces the closed orbit from the axis.
    pub fn perturbs_orbit(&self) -> bool {
        if self.alignment.has_offset() {
            return true;
        }
        match &self.kind {
            ElementKind::Corrector { hkick_tm, vkick_tm } => *hkick_tm != 0.0 || *vkick_tm != 0.0,
            ElementKind::Multipole { field_integrals } => {
                field_integrals.first().is_some_and(|b0| *b0 != 0.0)
            }
            _ => false,
        }
    }

    /// Highland rms scattering angle (rad); zero for non-scatterers.
    pub fn scattering_angle(&self, reference: &ReferenceParticle) -> f64 {
        let ElementKind::Scatterer {
            thickness_m,
            radiation_length_m,
        } = self.kind
        else {
            return 0.0;
        };
        if thickness_m <= 0.0 {
            return 0.0;
        }
        let t = thickness_m / radiation_length_m;
        let log_term = (1.0 + 0.038 * t.ln()).max(0.0);
        13.6 / (reference.beta() * reference.momentum_mev()) * reference.charge().abs()
            * t.sqrt()
            * log_term
    }

    /// Slice a thick element into `n` equal pieces.
    ///
    /// Thin elements, and `n <= 1`, return a single copy.
    pub fn split(&self, n: usize) -> Vec<Element> {
        if n <= 1 || self.length_m() == 0.0 {
            return vec![self.clone()];
        }
        let step = 1.0 / n as f64;
        (0..n)
            .map(|i| {
                let end = if i + 1 == n { 1.0 } else { (i + 1) as f64 * step };
                self.portion(i as f64 * step, end)
            })
            .collect()
    }

    /// The part of the element between fractional positions `start` and `end`.
    fn portion(&self, start: f64, end: f64) -> Element {
        let frac = end - start;
        let kind = match &self.kind {
            ElementKind::Bend {
                field_t,
                gradient_t_per_m,
                edge_in_rad,
                edge_out_rad,
            } => ElementKind::Bend {
                field_t: *field_t,
                gradient_t_per_m: *gradient_t_per_m,
                edge_in_rad: if start == 0.0 { *edge_in_rad } else { 0.0 },
                edge_out_rad: if (end - 1.0).abs() <= LENGTH_EPS {
                    *edge_out_rad
                } else {
                    0.0
                },
            },
            ElementKind::Cavity {
                voltage_mv,
                phase_rad,
                frequency_hz,
            } => ElementKind::Cavity {
                voltage_mv: voltage_mv * frac,
                phase_rad: *phase_rad,
                frequency_hz: *frequency_hz,
            },
            ElementKind::Corrector { hkick_tm, vkick_tm } => ElementKind::Corrector {
                hkick_tm: hkick_tm * frac,
                vkick_tm: vkick_tm * frac,
            },
            other => other.clone(),
        };
        Element {
            name: self.name.clone(),
            length: self.length * frac,
            kind,
            aperture: self.aperture,
            alignment: self.alignment,
        }
    }

    fn apply_tilt(&self, body: RMatrix) -> RMatrix {
        let tilt = self.alignment.tilt;
        if tilt == 0.0 {
            body
        } else {
            rotation(-tilt) * body * rotation(tilt)
        }
    }
}
