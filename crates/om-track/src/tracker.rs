//! Turn-by-turn particle tracking.

use om_beamline::{Beamline, Topology};
use om_elements::ReferenceParticle;
use om_linalg::{PhaseVector, RMatrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::TrackConfig;
use crate::error::TrackError;
use crate::particle::{LossReason, ParticleState, TrackParam};

/// Relative kinetic-energy change per turn treated as a closed reference.
const REFERENCE_DRIFT_TOL: f64 = 1e-12;

/// Output of a tracking run.
#[derive(Clone, Debug)]
pub struct TrackResult {
    /// Final state of every particle, in input order
    pub particles: Vec<TrackParam>,
    /// Per particle: turn 0, every `record_every` turns, and the final state
    pub history: Vec<Vec<TrackParam>>,
    pub turns: usize,
}

impl TrackResult {
    pub fn alive_count(&self) -> usize {
        self.particles.iter().filter(|p| p.is_alive()).count()
    }

    pub fn lost(&self) -> impl Iterator<Item = (usize, &TrackParam)> {
        self.particles
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_alive())
    }
}

/// Read-only lattice data shared by all particles.
struct Lattice<'a> {
    beamline: &'a Beamline,
    references: Vec<ReferenceParticle>,
    matrices: Option<Vec<RMatrix>>,
    scattering: Vec<f64>,
}

/// Track `initial` particles for `turns` turns.
///
/// Every turn starts from the beamline's injection reference, so a ring
/// whose reference energy changes over one turn can only be tracked for a
/// single pass.
///
/// Particles are advanced in parallel; each particle's turns are strictly
/// sequential and its scattering stream depends only on `config.seed` and
/// its index, so results do not depend on thread scheduling.
pub fn track(
    beamline: &Beamline,
    initial: &[PhaseVector],
    turns: usize,
    config: &TrackConfig,
) -> Result<TrackResult, TrackError> {
    if config.record_every == 0 {
        return Err(TrackError::invalid("record_every must be positive"));
    }
    if beamline.topology() == Topology::Line && turns > 1 {
        return Err(TrackError::invalid(format!(
            "a line can only be tracked for one pass, {turns} turns requested"
        )));
    }

    let references = beamline.references()?;
    if turns > 1 {
        let start = references[0].kinetic_mev();
        let end = references.last().map_or(start, |r| r.kinetic_mev());
        if (end - start).abs() > REFERENCE_DRIFT_TOL * start {
            return Err(TrackError::invalid(format!(
                "reference energy changes over one turn ({start} -> {end} MeV), \
                 multi-turn tracking needs a closed reference"
            )));
        }
    }
    let scattering = beamline
        .elements()
        .iter()
        .zip(&references)
        .map(|(e, r)| e.scattering_angle(r))
        .collect();
    let lattice = Lattice {
        beamline,
        matrices: if config.fast {
            Some(beamline.element_matrices()?)
        } else {
            None
        },
        references,
        scattering,
    };

    let histories = initial
        .par_iter()
        .enumerate()
        .map(|(index, coords)| track_particle(&lattice, index, *coords, turns, config))
        .collect::<Result<Vec<_>, _>>()?;

    let particles: Vec<TrackParam> = histories
        .iter()
        .filter_map(|h| h.last().copied())
        .collect();
    let result = TrackResult {
        particles,
        history: histories,
        turns,
    };

    let lost = result.particles.len() - result.alive_count();
    if lost > 0 {
        warn!(lost, total = result.particles.len(), "particles lost");
    }
    info!(
        particles = result.particles.len(),
        turns,
        alive = result.alive_count(),
        fast = config.fast,
        "tracking finished"
    );
    Ok(result)
}

fn particle_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn track_particle(
    lattice: &Lattice<'_>,
    index: usize,
    coords: PhaseVector,
    turns: usize,
    config: &TrackConfig,
) -> Result<Vec<TrackParam>, TrackError> {
    let mut rng = particle_rng(config.seed, index);
    let mut particle = TrackParam::new(coords);
    let mut history = vec![particle];

    for turn in 0..turns {
        if config.is_cancelled() {
            return Err(TrackError::Cancelled { turn });
        }
        if !advance_turn(lattice, &mut particle, &mut rng, config) {
            debug!(particle = index, state = ?particle.state, "particle lost");
            break;
        }
        particle.turn = turn + 1;
        if particle.turn % config.record_every == 0 {
            history.push(particle);
        }
    }

    if history.last() != Some(&particle) {
        history.push(particle);
    }
    Ok(history)
}

/// One pass through the lattice. Returns false once the particle is lost.
fn advance_turn(
    lattice: &Lattice<'_>,
    particle: &mut TrackParam,
    rng: &mut StdRng,
    config: &TrackConfig,
) -> bool {
    let elements = lattice.beamline.elements();
    for (i, element) in elements.iter().enumerate() {
        if config.aperture_losses && element.length_m() > 0.0 && !element.within_aperture(&particle.coords)
        {
            particle.lose(i, LossReason::Aperture);
            return false;
        }

        let mut next = particle.coords;
        let transported = match &lattice.matrices {
            Some(matrices) => {
                next = matrices[i] * next;
                true
            }
            None => element.track(&mut next, &lattice.references[i]).is_ok(),
        };
        if !transported || next.iter().any(|v| !v.is_finite()) {
            particle.lose(i, LossReason::Unbounded);
            return false;
        }

        let theta = lattice.scattering[i];
        if theta > 0.0 {
            next[1] += theta * rng.sample::<f64, _>(StandardNormal);
            next[3] += theta * rng.sample::<f64, _>(StandardNormal);
        }
        particle.coords = next;

        if config.aperture_losses && !element.within_aperture(&particle.coords) {
            particle.lose(i, LossReason::Aperture);
            return false;
        }
    }
    debug_assert!(matches!(particle.state, ParticleState::Alive));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scattering_stream_has_unit_variance() {
        let mut rng = particle_rng(42, 0);
        let n = 20_000;
        let samples: Vec<f64> = (0..n)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }

    #[test]
    fn scattering_stream_is_reproducible() {
        let draw = |seed| -> Vec<f64> {
            let mut rng = particle_rng(seed, 3);
            (0..8).map(|_| rng.sample::<f64, _>(StandardNormal)).collect()
        };
        assert_eq!(draw(11), draw(11));
        assert_ne!(draw(11), draw(12));
    }

    #[test]
    fn particle_streams_differ() {
        let a: f64 = particle_rng(1, 0).r#gen();
        let b: f64 = particle_rng(1, 1).r#gen();
        assert_ne!(a, b);
    }
}
