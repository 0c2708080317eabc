//! Reference particle kinematics.

use crate::error::{ElementError, ElementResult};
use om_core::numeric::{ensure_finite, ensure_positive};
use om_core::units::constants::{
    BRHO_FACTOR, ELECTRON_MASS_MEV, PROTON_MASS_MEV, Z0_OVER_4PI_OHM,
};
use om_core::units::{Energy, to_mev};

/// The design particle every transfer map is computed for.
///
/// Energies are stored in MeV, charge in units of the elementary charge.
/// Cavities and wakefields produce a new reference downstream; nothing here
/// is global state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceParticle {
    mass_mev: f64,
    kinetic_mev: f64,
    charge: f64,
}

impl ReferenceParticle {
    /// Create a reference particle from rest mass and kinetic energy.
    pub fn new(mass: Energy, kinetic: Energy, charge: f64) -> ElementResult<Self> {
        Self::from_mev(to_mev(mass), to_mev(kinetic), charge)
    }

    pub fn from_mev(mass_mev: f64, kinetic_mev: f64, charge: f64) -> ElementResult<Self> {
        ensure_positive(mass_mev, "reference rest mass")?;
        ensure_positive(kinetic_mev, "reference kinetic energy")?;
        ensure_finite(charge, "reference charge")?;
        if charge == 0.0 {
            return Err(ElementError::NonPhysical {
                what: "reference charge must be non-zero",
            });
        }
        Ok(Self {
            mass_mev,
            kinetic_mev,
            charge,
        })
    }

    pub fn proton(kinetic: Energy) -> ElementResult<Self> {
        Self::from_mev(PROTON_MASS_MEV, to_mev(kinetic), 1.0)
    }

    pub fn electron(kinetic: Energy) -> ElementResult<Self> {
        Self::from_mev(ELECTRON_MASS_MEV, to_mev(kinetic), -1.0)
    }

    pub fn mass_mev(&self) -> f64 {
        self.mass_mev
    }

    pub fn kinetic_mev(&self) -> f64 {
        self.kinetic_mev
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn total_energy_mev(&self) -> f64 {
        self.mass_mev + self.kinetic_mev
    }

    pub fn gamma(&self) -> f64 {
        1.0 + self.kinetic_mev / self.mass_mev
    }

    pub fn beta(&self) -> f64 {
        self.momentum_mev() / self.total_energy_mev()
    }

    pub fn beta_gamma(&self) -> f64 {
        self.momentum_mev() / self.mass_mev
    }

    /// Momentum times c, in MeV.
    pub fn momentum_mev(&self) -> f64 {
        (self.kinetic_mev * (self.kinetic_mev + 2.0 * self.mass_mev)).sqrt()
    }

    /// Magnetic rigidity Bρ in T·m (always positive).
    pub fn rigidity_tm(&self) -> f64 {
        self.momentum_mev() / (BRHO_FACTOR * self.charge.abs())
    }

    /// Convert a field (or field gradient, or integrated field) into the
    /// corresponding normalized strength, including the charge sign.
    pub fn normalize(&self, field: f64) -> f64 {
        field * self.charge.signum() / self.rigidity_tm()
    }

    /// Same particle species at a new kinetic energy.
    pub fn with_kinetic(&self, kinetic_mev: f64) -> ElementResult<Self> {
        if !(kinetic_mev.is_finite() && kinetic_mev > 0.0) {
            return Err(ElementError::NonPhysical {
                what: "kinetic energy dropped to zero or below",
            });
        }
        Ok(Self {
            kinetic_mev,
            ..*self
        })
    }

    /// Same particle species at momentum p·(1 + δ).
    pub fn off_momentum(&self, delta: f64) -> ElementResult<Self> {
        let p = self.momentum_mev() * (1.0 + delta);
        if !(p.is_finite() && p > 0.0) {
            return Err(ElementError::NonPhysical {
                what: "momentum deviation below -1",
            });
        }
        let total = (p * p + self.mass_mev * self.mass_mev).sqrt();
        self.with_kinetic(total - self.mass_mev)
    }

    /// Characteristic current I0 = mc²/(|q| e) / 29.98 Ω in amperes.
    pub fn characteristic_current_a(&self) -> f64 {
        self.mass_mev * 1e6 / (self.charge.abs() * Z0_OVER_4PI_OHM)
    }

    /// Generalized perveance K = 2 I / (I0 β³ γ³) for a beam current `current_a`.
    pub fn perveance(&self, current_a: f64) -> f64 {
        let bg = self.beta_gamma();
        2.0 * current_a.abs() / (self.characteristic_current_a() * bg * bg * bg)
    }
}
