//! Per-particle tracking state.

use om_linalg::PhaseVector;

/// Why a particle stopped being tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossReason {
    /// Outside an element aperture.
    Aperture,
    /// Coordinates became non-finite or the map could not be applied.
    Unbounded,
}

impl LossReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LossReason::Aperture => "aperture",
            LossReason::Unbounded => "unbounded",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticleState {
    Alive,
    Lost {
        element_index: usize,
        turn: usize,
        reason: LossReason,
    },
}

/// One tracked particle.
///
/// `turn` counts completed turns. A lost particle keeps the coordinates it
/// had where it was lost.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackParam {
    pub coords: PhaseVector,
    pub turn: usize,
    pub state: ParticleState,
}

impl TrackParam {
    pub fn new(coords: PhaseVector) -> Self {
        Self {
            coords,
            turn: 0,
            state: ParticleState::Alive,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == ParticleState::Alive
    }

    pub(crate) fn lose(&mut self, element_index: usize, reason: LossReason) {
        self.state = ParticleState::Lost {
            element_index,
            turn: self.turn,
            reason,
        };
    }
}
