//! Tracking options.

use om_core::CancelToken;

/// Options for `track`.
#[derive(Clone, Debug)]
pub struct TrackConfig {
    /// Use only the linear element matrices
    pub fast: bool,
    /// Enforce apertures and record losses
    pub aperture_losses: bool,
    /// Base seed for scattering kicks; each particle gets its own stream
    pub seed: u64,
    /// Record every N-th turn
    pub record_every: usize,
    pub cancel: Option<CancelToken>,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            fast: false,
            aperture_losses: true,
            seed: 0,
            record_every: 1,
            cancel: None,
        }
    }
}

impl TrackConfig {
    pub fn fast() -> Self {
        Self {
            fast: true,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
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
