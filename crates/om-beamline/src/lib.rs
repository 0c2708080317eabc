//! om-beamline: ordered element sequences and their composed maps.
//!
//! Provides:
//! - `Beamline`: elements + reference particle + topology (ring or line)
//! - `BeamlineBuilder`: incremental construction with validation on build
//! - range composition of linear maps, threading the evolving reference
//!
//! # Example
//!
//! ```
//! use om_beamline::{BeamlineBuilder, Topology};
//! use om_core::units::{m, mev};
//! use om_elements::{Element, ReferenceParticle};
//!
//! let mut builder = BeamlineBuilder::new(ReferenceParticle::proton(mev(100.0)).unwrap());
//! builder.push(Element::drift("D1", m(1.0)));
//! builder.push(Element::quadrupole("QF", m(0.2), 4.0));
//! let line = builder.build(Topology::Line).unwrap();
//!
//! let r = line.compose_range(0, line.len()).unwrap();
//! assert!((r.determinant() - 1.0).abs() < 1e-12);
//! ```

pub mod beamline;
pub mod builder;
pub mod error;
pub(crate) mod validate;

pub use beamline::{Beamline, Topology, load_beamline};
pub use builder::BeamlineBuilder;
pub use error::{BeamlineError, BeamlineResult};
