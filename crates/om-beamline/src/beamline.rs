//! Immutable beamline and linear map composition.

use om_core::ElementId;
use om_elements::{Element, ReferenceParticle};
use om_linalg::{DEFAULT_TOL, RMatrix, inverse};

use crate::error::{BeamlineError, BeamlineResult};
use crate::validate;

/// Whether the beamline closes on itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Ring,
    Line,
}

impl Topology {
    pub fn as_str(self) -> &'static str {
        match self {
            Topology::Ring => "ring",
            Topology::Line => "line",
        }
    }
}

/// Validated, non-empty element sequence with its injection reference.
#[derive(Clone, Debug)]
pub struct Beamline {
    elements: Vec<Element>,
    reference: ReferenceParticle,
    topology: Topology,
}

/// Validate and assemble a beamline.
pub fn load_beamline(
    elements: Vec<Element>,
    reference: ReferenceParticle,
    topology: Topology,
) -> BeamlineResult<Beamline> {
    validate::validate_elements(&elements)?;
    let beamline = Beamline {
        elements,
        reference,
        topology,
    };
    // Rejects cavities or wakes that stop the reference particle.
    beamline.references()?;
    tracing::debug!(
        elements = beamline.len(),
        length_m = beamline.total_length(),
        topology = topology.as_str(),
        "beamline loaded"
    );
    Ok(beamline)
}

impl Beamline {
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.index())
    }

    /// First element with the given name.
    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .position(|e| e.name == name)
            .and_then(ElementId::from_index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Always false for a loaded beamline.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn reference(&self) -> &ReferenceParticle {
        &self.reference
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn total_length(&self) -> f64 {
        self.elements.iter().map(Element::length_m).sum()
    }

    /// True when a closed-orbit iteration is needed for this lattice.
    pub fn needs_orbit_iteration(&self) -> bool {
        self.elements
            .iter()
            .any(|e| e.is_nonlinear() || e.perturbs_orbit())
    }

    fn element_error(&self, index: usize) -> impl Fn(om_elements::ElementError) -> BeamlineError + '_ {
        move |source| BeamlineError::Element {
            index,
            name: self.elements[index].name.clone(),
            source,
        }
    }

    /// s at every element boundary (N + 1 values, starting at 0).
    pub fn positions(&self) -> Vec<f64> {
        let mut s = 0.0;
        let mut out = Vec::with_capacity(self.len() + 1);
        out.push(s);
        for e in &self.elements {
            s += e.length_m();
            out.push(s);
        }
        out
    }

    /// Reference particle at every element boundary (N + 1 values).
    pub fn references(&self) -> BeamlineResult<Vec<ReferenceParticle>> {
        let mut out = Vec::with_capacity(self.len() + 1);
        let mut r = self.reference;
        out.push(r);
        for (i, e) in self.elements.iter().enumerate() {
            r = e.reference_after(&r).map_err(self.element_error(i))?;
            out.push(r);
        }
        Ok(out)
    }

    /// Linear map of each element, evaluated at its local reference.
    pub fn element_matrices(&self) -> BeamlineResult<Vec<RMatrix>> {
        let refs = self.references()?;
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| e.transfer_matrix(&refs[i]).map_err(self.element_error(i)))
            .collect()
    }

    /// Maps from the start to every boundary (N + 1 values, first identity).
    pub fn cumulative_matrices(&self) -> BeamlineResult<Vec<RMatrix>> {
        let mats = self.element_matrices()?;
        let mut out = Vec::with_capacity(mats.len() + 1);
        let mut acc = RMatrix::identity();
        out.push(acc);
        for m in &mats {
            acc = m * acc;
            out.push(acc);
        }
        Ok(out)
    }

    fn check_range(&self, start: usize, end: usize) -> BeamlineResult<()> {
        if start > end || end > self.len() {
            return Err(BeamlineError::invalid(format!(
                "range {start}..{end} outside beamline of {} elements",
                self.len()
            )));
        }
        Ok(())
    }

    /// Map from boundary `start` to boundary `end`, elements applied in
    /// physical order (M_{end-1} ··· M_start).
    pub fn compose_range(&self, start: usize, end: usize) -> BeamlineResult<RMatrix> {
        self.check_range(start, end)?;
        let refs = self.references()?;
        let mut acc = RMatrix::identity();
        for i in start..end {
            let m = self.elements[i]
                .transfer_matrix(&refs[i])
                .map_err(self.element_error(i))?;
            acc = m * acc;
        }
        Ok(acc)
    }

    /// Inverse of `compose_range(start, end)` built from element inverses in
    /// reverse order.
    pub fn inverse_compose_range(&self, start: usize, end: usize) -> BeamlineResult<RMatrix> {
        self.check_range(start, end)?;
        let refs = self.references()?;
        let mut acc = RMatrix::identity();
        for i in start..end {
            let m = self.elements[i]
                .transfer_matrix(&refs[i])
                .map_err(self.element_error(i))?;
            acc *= inverse(&m, DEFAULT_TOL)?;
        }
        Ok(acc)
    }

    /// Full-turn map of a ring.
    pub fn one_turn_matrix(&self) -> BeamlineResult<RMatrix> {
        if self.topology != Topology::Ring {
            return Err(BeamlineError::invalid(
                "one-turn matrix requested for a line",
            ));
        }
        self.compose_range(0, self.len())
    }
}
