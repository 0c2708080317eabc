//! Turn-by-turn particle tracking.
//!
//! Particles are independent: `track` advances them in parallel with rayon
//! while every particle's own turns run strictly in order. Losses at
//! apertures, or to non-finite coordinates, are recorded on the particle
//! and it is not advanced any further.

pub mod config;
pub mod error;
pub mod particle;
pub mod tracker;

pub use config::TrackConfig;
pub use error::TrackError;
pub use particle::{LossReason, ParticleState, TrackParam};
pub use tracker::{TrackResult, track};
