//! Envelope propagation options.

use om_core::CancelToken;

use crate::error::{EnvelopeError, EnvelopeResult};

/// Space-charge fixed-point settings.
#[derive(Clone, Debug)]
pub struct SpaceChargeConfig {
    /// Peak beam current (A)
    pub peak_current_a: f64,
    /// Longest slice a space-charge kick may cover (m)
    pub max_slice_length: f64,
    /// Convergence threshold on the max relative change of rms sizes
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SpaceChargeConfig {
    fn default() -> Self {
        Self {
            peak_current_a: 0.0,
            max_slice_length: 0.05,
            tolerance: 1e-8,
            max_iterations: 100,
        }
    }
}

impl SpaceChargeConfig {
    pub fn with_current(peak_current_a: f64) -> Self {
        Self {
            peak_current_a,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> EnvelopeResult<()> {
        if !(self.peak_current_a.is_finite() && self.peak_current_a >= 0.0) {
            return Err(EnvelopeError::invalid(
                "peak current must be finite and non-negative",
            ));
        }
        if !(self.max_slice_length.is_finite() && self.max_slice_length > 0.0) {
            return Err(EnvelopeError::invalid("max slice length must be positive"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(EnvelopeError::invalid("tolerance must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(EnvelopeError::invalid("max_iterations must be positive"));
        }
        Ok(())
    }
}

/// Options for `propagate_moments`.
#[derive(Clone, Debug, Default)]
pub struct MomentsConfig {
    /// `None` propagates without self-fields in a single pass
    pub space_charge: Option<SpaceChargeConfig>,
    pub cancel: Option<CancelToken>,
}

impl MomentsConfig {
    pub fn with_space_charge(mut self, space_charge: SpaceChargeConfig) -> Self {
        self.space_charge = Some(space_charge);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
