//! om-core: stable foundation for the optics workspace.
//!
//! Contains:
//! - units (uom SI types + constructors, physical constants)
//! - numeric (Real + finiteness and sign checks)
//! - ids (compact element identifiers)
//! - cancel (cooperative cancellation token shared by solvers and tracking)
//! - timing (opt-in wall clock timers)
//! - error (shared error types)

pub mod cancel;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use cancel::CancelToken;
pub use error::{OmError, OmResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
