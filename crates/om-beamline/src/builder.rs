//! Incremental beamline builder.

use om_core::ElementId;
use om_elements::{Element, ReferenceParticle};

use crate::beamline::{Beamline, Topology, load_beamline};
use crate::error::BeamlineResult;

/// Builder for constructing a beamline incrementally.
///
/// Use `push` (or `extend`) to append elements in physical order, then call
/// `build()` to validate and freeze it into an immutable `Beamline`.
#[derive(Debug, Clone)]
pub struct BeamlineBuilder {
    reference: ReferenceParticle,
    elements: Vec<Element>,
}

impl BeamlineBuilder {
    pub fn new(reference: ReferenceParticle) -> Self {
        Self {
            reference,
            elements: Vec::new(),
        }
    }

    /// Append an element and return its id, or `None` once the line has
    /// outgrown the id range (the element is still appended).
    pub fn push(&mut self, element: Element) -> Option<ElementId> {
        let id = ElementId::from_index(self.elements.len());
        self.elements.push(element);
        id
    }

    /// Append a cell `count` times (e.g. the periods of a ring).
    pub fn repeat(&mut self, cell: &[Element], count: usize) {
        for _ in 0..count {
            self.elements.extend_from_slice(cell);
        }
    }

    pub fn extend(&mut self, elements: impl IntoIterator<Item = Element>) {
        self.elements.extend(elements);
    }

    /// Rename an element (useful for post-construction adjustments).
    pub fn rename(&mut self, id: ElementId, new_name: impl Into<String>) {
        if let Some(e) = self.elements.get_mut(id.index()) {
            e.name = new_name.into();
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Validate and build.
    pub fn build(self, topology: Topology) -> BeamlineResult<Beamline> {
        load_beamline(self.elements, self.reference, topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use om_core::units::{m, mev};

    #[test]
    fn builder_assigns_sequential_ids() {
        let mut b = BeamlineBuilder::new(ReferenceParticle::proton(mev(50.0)).unwrap());
        let d = b.push(Element::drift("D", m(1.0))).unwrap();
        let q = b.push(Element::quadrupole("Q", m(0.1), 2.0)).unwrap();
        assert_eq!(d.index(), 0);
        assert_eq!(q.index(), 1);
        b.rename(q, "QF");
        let bl = b.build(Topology::Line).unwrap();
        assert_eq!(bl.element(q).map(|e| e.name.as_str()), Some("QF"));
    }

    #[test]
    fn repeat_appends_cells() {
        let mut b = BeamlineBuilder::new(ReferenceParticle::proton(mev(50.0)).unwrap());
        let cell = [Element::drift("D", m(1.0)), Element::thin_quadrupole("Q", 0.2)];
        b.repeat(&cell, 4);
        assert_eq!(b.len(), 8);
        let bl = b.build(Topology::Ring).unwrap();
        assert_eq!(bl.total_length(), 4.0);
    }

    #[test]
    fn empty_builder_fails() {
        let b = BeamlineBuilder::new(ReferenceParticle::proton(mev(50.0)).unwrap());
        assert!(b.is_empty());
        assert!(b.build(Topology::Ring).is_err());
    }
}
