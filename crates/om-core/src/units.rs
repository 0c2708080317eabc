// om-core/src/units.rs

use uom::si::f64::{Energy as UomEnergy, Length as UomLength, Ratio as UomRatio};

// Public canonical unit types (SI, f64)
pub type Energy = UomEnergy;
pub type Length = UomLength;
pub type Ratio = UomRatio;

#[inline]
pub fn m(v: f64) -> Length {
    use uom::si::length::meter;
    Length::new::<meter>(v)
}

#[inline]
pub fn mev(v: f64) -> Energy {
    use uom::si::energy::megaelectronvolt;
    Energy::new::<megaelectronvolt>(v)
}

/// Energy expressed in MeV.
#[inline]
pub fn to_mev(e: Energy) -> f64 {
    use uom::si::energy::megaelectronvolt;
    e.get::<megaelectronvolt>()
}

#[inline]
pub fn unitless(v: f64) -> Ratio {
    use uom::si::ratio::ratio;
    Ratio::new::<ratio>(v)
}

pub mod constants {
    /// Speed of light in vacuum (m/s).
    pub const C_MPS: f64 = 299_792_458.0;
    /// Proton rest energy (MeV).
    pub const PROTON_MASS_MEV: f64 = 938.272_088_16;
    /// Electron rest energy (MeV).
    pub const ELECTRON_MASS_MEV: f64 = 0.510_998_950;
    /// 1 / (4 pi eps0 c) in ohm; converts rest energy in volts to the
    /// characteristic (Alfven-type) current I0 = mc^2/e / 29.98 ohm.
    pub const Z0_OVER_4PI_OHM: f64 = 29.979_245_8;
    /// Bρ [T·m] = pc [MeV] / (BRHO_FACTOR * charge).
    pub const BRHO_FACTOR: f64 = 299.792_458;
}
