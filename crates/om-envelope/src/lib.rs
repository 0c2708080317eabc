//! Beam second-moment (sigma matrix) propagation.
//!
//! `propagate_moments` carries a 6×6 covariance through a beamline element
//! by element. With a [`SpaceChargeConfig`] the envelope becomes a fixed
//! point: elements are sliced, each slice gets a linear KV space-charge lens
//! sized from the previous iterate, and the loop stops once the rms sizes
//! settle.
//!
//! # Example
//!
//! ```
//! use om_beamline::{Topology, load_beamline};
//! use om_core::units::{m, mev};
//! use om_elements::{Element, ReferenceParticle};
//! use om_envelope::{MomentsConfig, propagate_moments};
//! use om_linalg::SymMatrix;
//!
//! let reference = ReferenceParticle::proton(mev(100.0)).unwrap();
//! let line = load_beamline(vec![Element::drift("D", m(1.0))], reference, Topology::Line).unwrap();
//! let sigma0 = SymMatrix::from_variances([1e-6, 1e-6, 1e-6, 1e-6, 0.0, 0.0]);
//! let sol = propagate_moments(&line, &sigma0, &MomentsConfig::default()).unwrap();
//! assert_eq!(sol.sigmas.len(), 2);
//! ```

pub mod config;
pub mod error;
pub mod propagate;

pub use config::{MomentsConfig, SpaceChargeConfig};
pub use error::{EnvelopeError, EnvelopeResult};
pub use propagate::{
    EnvelopePoint, MomentsProgressEvent, MomentsSolution, propagate_moments,
    propagate_with_progress,
};
