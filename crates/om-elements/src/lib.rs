//! om-elements: transfer maps for beamline elements.
//!
//! Every element kind exposes:
//! - a linear 6×6 transfer matrix for its full length or any sub-length
//! - a tracking map that adds the nonlinear terms (sextupole and multipole
//!   kicks, chromatic focusing, exact RF energy gain, misalignment offsets)
//! - the reference particle downstream of it (cavities and wakefields change
//!   the reference momentum)
//!
//! The element set is closed, so kinds are a plain enum and every map is an
//! exhaustive `match`.
//!
//! # Example
//!
//! ```
//! use om_core::units::{m, mev};
//! use om_elements::{Element, ReferenceParticle};
//!
//! let reference = ReferenceParticle::proton(mev(200.0)).unwrap();
//! let quad = Element::quadrupole("QF", m(0.3), 5.0);
//! let r = quad.transfer_matrix(&reference).unwrap();
//! assert!((r.determinant() - 1.0).abs() < 1e-12);
//! ```

pub mod common;
pub mod element;
pub mod error;
pub mod kick;
pub mod kind;
pub mod linear;
pub mod reference;
pub mod space_charge;

// Re-exports
pub use element::Element;
pub use error::{ElementError, ElementResult};
pub use kind::{Alignment, ApertureShape, ElementKind};
pub use reference::ReferenceParticle;
pub use space_charge::space_charge_kick_matrix;
