//! Particle ensemble: the single owner of all particle state
//!
//! Particles live in one contiguous vector in id order. Ids are assigned
//! monotonically and compaction keeps the order, so lookup by [`ParticleId`]
//! is a binary search.

use super::{Particle, ParticleId, TerminationReason};
use crate::core_types::Vec3;
use rayon::prelude::*;

/// Arena of particles with stable ids.
///
/// # Example
///
/// ```
/// use plume_core::particles::ParticleEnsemble;
/// use plume_core::Vec3;
///
/// let mut ensemble = ParticleEnsemble::new(1, 7);
/// let id = ensemble.spawn(Vec3::new(0.0, 0.0, 10.0), vec![1.0], 0);
/// assert_eq!(ensemble.active_count(), 1);
/// assert!(ensemble.get(id).is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ParticleEnsemble {
    particles: Vec<Particle>,
    next_id: u64,
    seed: u64,
    species_count: usize,
}

impl ParticleEnsemble {
    pub fn new(species_count: usize, seed: u64) -> Self {
        Self {
            particles: Vec::new(),
            next_id: 0,
            seed,
            species_count,
        }
    }

    pub fn species_count(&self) -> usize {
        self.species_count
    }

    /// Add a particle and return its handle.
    pub fn spawn(&mut self, position: Vec3, mass: Vec<f64>, release_group: usize) -> ParticleId {
        debug_assert_eq!(mass.len(), self.species_count);
        let id = ParticleId(self.next_id);
        self.next_id += 1;
        self.particles
            .push(Particle::new(id, position, mass, release_group, self.seed));
        id
    }

    pub fn get(&self, id: ParticleId) -> Option<&Particle> {
        self.particles
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.particles[i])
    }

    pub fn get_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &mut self.particles[i])
    }

    /// All stored particles, active or not, in id order.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.particles.iter().filter(|p| p.is_active())
    }

    /// Number of stored particles, including terminated ones awaiting compaction.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.particles.par_iter().filter(|p| p.is_active()).count()
    }

    /// Number of particles ever spawned.
    pub fn spawned_count(&self) -> u64 {
        self.next_id
    }

    /// Airborne mass per species over active particles (kg).
    pub fn airborne_mass(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.species_count];
        for particle in self.iter_active() {
            for (total, m) in totals.iter_mut().zip(&particle.mass) {
                *total += m;
            }
        }
        totals
    }

    /// Count of terminated particles per reason, for diagnostics.
    pub fn terminated_count(&self, reason: TerminationReason) -> usize {
        self.particles
            .iter()
            .filter(|p| p.status == super::ParticleStatus::Terminated(reason))
            .count()
    }

    /// Drop terminated particles. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.particles.len();
        self.particles.retain(Particle::is_active);
        before - self.particles.len()
    }
}
