//! Point receptors
//!
//! A receptor estimates the near-surface concentration at a fixed point from
//! particles below `layer_depth`, each weighted by a bilinear tent of
//! half-widths (h_x, h_y) centred on the receptor:
//!
//! ```text
//! w = max(0, 1 − |x − x_r|/h_x) · max(0, 1 − |y − y_r|/h_y)
//! c = Σ m w / (h_x h_y Δz)
//! ```
//!
//! The tent integrates to h_x·h_y, so a uniform field is recovered without bias.

use crate::core_types::SpeciesIndex;
use crate::grid::MapProjection;
use crate::particles::Particle;
use serde::{Deserialize, Serialize};

/// A named receptor location in projected metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptorSpec {
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl ReceptorSpec {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
        }
    }

    /// Receptor given in degrees.
    pub fn geographic(name: impl Into<String>, lon: f64, lat: f64, projection: &dyn MapProjection) -> Self {
        let (x, y) = projection.from_geographic(lon, lat);
        Self::new(name, x, y)
    }
}

/// Window-mean concentration at one receptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceptorSample {
    pub name: String,
    /// Mean concentration per species (kg/m³).
    pub concentration: Vec<f64>,
}

/// Accumulator for all receptors of a run.
#[derive(Debug, Clone)]
pub struct ReceptorSet {
    receptors: Vec<ReceptorSpec>,
    species_count: usize,
    /// Tent half-widths (m).
    half_width: (f64, f64),
    /// Depth of the sampled near-surface layer (m).
    layer_depth: f64,
    /// Weighted mass `[receptor][species]`.
    mass: Vec<f64>,
    samples: usize,
}

impl ReceptorSet {
    pub fn new(receptors: Vec<ReceptorSpec>, species_count: usize, half_width: (f64, f64), layer_depth: f64) -> Self {
        let n = receptors.len() * species_count;
        Self {
            receptors,
            species_count,
            half_width,
            layer_depth,
            mass: vec![0.0; n],
            samples: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.receptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receptors.is_empty()
    }

    /// Tent weight of a particle at (x, y) for receptor `r`.
    pub fn weight(&self, r: usize, x: f64, y: f64) -> f64 {
        let spec = &self.receptors[r];
        let (hx, hy) = self.half_width;
        (1.0 - (x - spec.x).abs() / hx).max(0.0) * (1.0 - (y - spec.y).abs() / hy).max(0.0)
    }

    /// Add one sample of the active particles.
    pub fn accumulate(&mut self, particles: &[Particle]) {
        if self.receptors.is_empty() {
            return;
        }
        for p in particles.iter().filter(|p| p.is_active() && p.position.z < self.layer_depth) {
            for r in 0..self.receptors.len() {
                let w = self.weight(r, p.position.x, p.position.y);
                if w <= 0.0 {
                    continue;
                }
                for (species, m) in p.mass.iter().enumerate() {
                    self.mass[r * self.species_count + species] += m * w;
                }
            }
        }
        self.samples += 1;
    }

    /// Window-mean concentration of one receptor and species (kg/m³).
    pub fn concentration(&self, r: usize, species: SpeciesIndex) -> f64 {
        let volume = self.half_width.0 * self.half_width.1 * self.layer_depth;
        self.mass[r * self.species_count + species] / (self.samples.max(1) as f64 * volume)
    }

    pub fn frame(&self) -> Vec<ReceptorSample> {
        self.receptors
            .iter()
            .enumerate()
            .map(|(r, spec)| ReceptorSample {
                name: spec.name.clone(),
                concentration: (0..self.species_count).map(|s| self.concentration(r, s)).collect(),
            })
            .collect()
    }

    pub fn reset_window(&mut self) {
        self.mass.iter_mut().for_each(|m| *m = 0.0);
        self.samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Vec3;
    use crate::particles::ParticleId;
    use approx::assert_relative_eq;

    #[test]
    fn tent_weights_fall_off_linearly() {
        let set = ReceptorSet::new(vec![ReceptorSpec::new("site", 0.0, 0.0)], 1, (100.0, 100.0), 50.0);
        assert_eq!(set.weight(0, 0.0, 0.0), 1.0);
        assert_relative_eq!(set.weight(0, 50.0, 0.0), 0.5);
        assert_relative_eq!(set.weight(0, 50.0, -50.0), 0.25);
        assert_eq!(set.weight(0, 100.0, 0.0), 0.0);
    }

    #[test]
    fn uniform_particles_give_uniform_concentration() {
        let mut set = ReceptorSet::new(vec![ReceptorSpec::new("site", 0.0, 0.0)], 1, (100.0, 100.0), 50.0);
        // one particle of 1 kg per 10 m × 10 m × 50 m box
        let mut particles = Vec::new();
        let mut id = 0;
        for i in -15..15 {
            for j in -15..15 {
                let x = (f64::from(i) + 0.5) * 10.0;
                let y = (f64::from(j) + 0.5) * 10.0;
                particles.push(Particle::new(ParticleId(id), Vec3::new(x, y, 25.0), vec![1.0], 0, 1));
                id += 1;
            }
        }
        particles.push(Particle::new(ParticleId(id), Vec3::new(0.0, 0.0, 80.0), vec![100.0], 0, 1));
        set.accumulate(&particles);
        assert_relative_eq!(set.concentration(0, 0), 1.0 / 5000.0, max_relative = 1e-9);
        assert_eq!(set.frame()[0].name, "site");
    }
}
