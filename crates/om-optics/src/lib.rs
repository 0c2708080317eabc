//! Periodic optics solver: closed orbit, Twiss functions and tunes.
//!
//! A ring is solved in stages: the linear one-turn matrix is built, periodic
//! optics are extracted from it (per plane, or from 4D eigenvectors when the
//! planes are coupled), and when the lattice contains nonlinear or
//! orbit-perturbing elements the closed orbit is found with a damped Newton
//! iteration on the tracking map. Element maps are then relinearized about
//! the orbit and the optics extracted again. Lines propagate caller-supplied
//! initial optics instead.

pub mod chromaticity;
pub mod config;
pub mod error;
pub mod jacobian;
pub mod modes;
pub mod newton;
pub mod orbit;
pub mod solve;
pub mod twiss;

pub use chromaticity::{Chromaticity, chromaticity};
pub use config::{OpticsConfig, SolveMode};
pub use error::{OpticsError, OpticsResult};
pub use modes::NormalModes;
pub use newton::{NewtonConfig, NewtonResult};
pub use solve::{
    OpticsProgressEvent, OpticsSolution, SolveStage, solve_periodic_optics, solve_with_progress,
};
pub use twiss::{CoupledBetas, InitialTwiss, PlaneTwiss, Tunes, TwissParameters};
