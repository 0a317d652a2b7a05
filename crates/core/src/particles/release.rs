//! Release groups: where, when and how much tracer enters the ensemble
//!
//! A group spreads `particle_count` particles evenly over its time window.
//! Particle k is due at `start + k·(end − start)/count`; an instantaneous
//! release (`end == start`) emits everything at `start`. Each particle carries
//! an equal share of the group's mass of every species.

use super::ParticleEnsemble;
use crate::core_types::Vec3;
use crate::error::{DispersionError, Result};
use crate::grid::MapProjection;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Spatial extent of a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReleaseRegion {
    /// Single point: projected metres, height above ground.
    Point { x: f64, y: f64, z: f64 },
    /// Axis-aligned box in projected metres and metres above ground.
    Box {
        x: (f64, f64),
        y: (f64, f64),
        z: (f64, f64),
    },
    /// Box given in degrees; mapped through the run's projection.
    GeographicBox {
        lon: (f64, f64),
        lat: (f64, f64),
        z: (f64, f64),
    },
}

/// Release definition delivered by the configuration collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseGroupConfig {
    pub name: String,
    /// Start of the release window (s).
    pub start: f64,
    /// End of the release window (s); equal to `start` for an instantaneous release.
    pub end: f64,
    pub region: ReleaseRegion,
    /// Total released mass per species (kg), indexed like the species table.
    pub species_mass: Vec<f64>,
    pub particle_count: usize,
}

impl ReleaseGroupConfig {
    /// Instantaneous point release of one species.
    pub fn point(name: impl Into<String>, time: f64, position: Vec3, mass: f64, particle_count: usize) -> Self {
        Self {
            name: name.into(),
            start: time,
            end: time,
            region: ReleaseRegion::Point {
                x: position.x,
                y: position.y,
                z: position.z,
            },
            species_mass: vec![mass],
            particle_count,
        }
    }

    pub(crate) fn validate(&self, species_count: usize) -> Result<()> {
        let fail = |msg: String| Err(DispersionError::invalid_config(format!("release '{}': {msg}", self.name)));
        if self.particle_count == 0 {
            return fail("particle count must be positive".into());
        }
        if !(self.start.is_finite() && self.end.is_finite()) || self.end < self.start {
            return fail(format!("window [{}, {}] is invalid", self.start, self.end));
        }
        if self.species_mass.len() != species_count {
            return fail(format!(
                "{} species masses given, species table has {species_count}",
                self.species_mass.len()
            ));
        }
        if self.species_mass.iter().any(|m| !(m.is_finite() && *m >= 0.0)) {
            return fail("species masses must be finite and non-negative".into());
        }
        let ordered = |r: (f64, f64)| r.0 <= r.1;
        match &self.region {
            ReleaseRegion::Point { z, .. } if *z < 0.0 => fail("release height below ground".into()),
            ReleaseRegion::Box { x, y, z } if !(ordered(*x) && ordered(*y) && ordered(*z)) || z.0 < 0.0 => {
                fail("box bounds must be ordered and above ground".into())
            }
            ReleaseRegion::GeographicBox { lon, lat, z }
                if !(ordered(*lon) && ordered(*lat) && ordered(*z)) || z.0 < 0.0 =>
            {
                fail("box bounds must be ordered and above ground".into())
            }
            _ => Ok(()),
        }
    }
}

/// Mass and particle count emitted by one release call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReleaseSummary {
    pub particles: usize,
    /// Released mass per species (kg).
    pub mass: Vec<f64>,
}

/// Runtime state of a release group.
#[derive(Debug, Clone)]
pub struct ReleaseGroup {
    pub index: usize,
    pub config: ReleaseGroupConfig,
    /// Projected bounds (x, y, z) the group samples from.
    bounds: [(f64, f64); 3],
    released: usize,
    rng: ChaCha8Rng,
}

impl ReleaseGroup {
    pub fn new(
        index: usize,
        config: ReleaseGroupConfig,
        projection: &dyn MapProjection,
        seed: u64,
    ) -> Self {
        let bounds = match &config.region {
            ReleaseRegion::Point { x, y, z } => [(*x, *x), (*y, *y), (*z, *z)],
            ReleaseRegion::Box { x, y, z } => [*x, *y, *z],
            ReleaseRegion::GeographicBox { lon, lat, z } => {
                let corners = [
                    projection.from_geographic(lon.0, lat.0),
                    projection.from_geographic(lon.1, lat.0),
                    projection.from_geographic(lon.0, lat.1),
                    projection.from_geographic(lon.1, lat.1),
                ];
                let xs = corners.iter().map(|c| c.0);
                let ys = corners.iter().map(|c| c.1);
                [
                    (xs.clone().fold(f64::INFINITY, f64::min), xs.fold(f64::NEG_INFINITY, f64::max)),
                    (ys.clone().fold(f64::INFINITY, f64::min), ys.fold(f64::NEG_INFINITY, f64::max)),
                    *z,
                ]
            }
        };
        let stream = (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            index,
            config,
            bounds,
            released: 0,
            rng: ChaCha8Rng::seed_from_u64(seed ^ stream),
        }
    }

    /// Particles released so far.
    pub fn released(&self) -> usize {
        self.released
    }

    pub fn is_exhausted(&self) -> bool {
        self.released >= self.config.particle_count
    }

    /// Number of particles due by time `t` (cumulative).
    pub fn due_by(&self, t: f64) -> usize {
        let count = self.config.particle_count;
        if t < self.config.start {
            return 0;
        }
        let span = self.config.end - self.config.start;
        if span <= 0.0 || t >= self.config.end {
            return count;
        }
        let fraction = (t - self.config.start) / span;
        ((fraction * count as f64).floor() as usize + 1).min(count)
    }

    /// Spawn every particle due by time `t` into the ensemble.
    pub fn release(&mut self, t: f64, ensemble: &mut ParticleEnsemble) -> ReleaseSummary {
        let due = self.due_by(t);
        let count = self.config.particle_count as f64;
        let share: Vec<f64> = self.config.species_mass.iter().map(|m| m / count).collect();
        let mut summary = ReleaseSummary {
            particles: 0,
            mass: vec![0.0; share.len()],
        };
        while self.released < due {
            let position = Vec3::new(
                self.sample_axis(0),
                self.sample_axis(1),
                self.sample_axis(2),
            );
            ensemble.spawn(position, share.clone(), self.index);
            for (total, m) in summary.mass.iter_mut().zip(&share) {
                *total += m;
            }
            summary.particles += 1;
            self.released += 1;
        }
        summary
    }

    fn sample_axis(&mut self, axis: usize) -> f64 {
        let (lo, hi) = self.bounds[axis];
        if hi > lo {
            self.rng.random_range(lo..hi)
        } else {
            lo
        }
    }
}
