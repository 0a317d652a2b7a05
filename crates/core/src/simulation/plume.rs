//! Per-release-group plume statistics (centre-of-mass trajectory)

use crate::core_types::Vec3;
use crate::particles::ParticleEnsemble;
use serde::Serialize;

/// Mass-weighted moments of the active particles of one release group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlumeStatistics {
    pub release_group: usize,
    pub particles: usize,
    /// Airborne mass over all species (kg).
    pub mass: f64,
    pub centroid: Vec3,
    /// RMS horizontal distance from the centroid (m).
    pub horizontal_spread: f64,
    /// RMS vertical distance from the centroid (m).
    pub vertical_spread: f64,
}

impl PlumeStatistics {
    /// Statistics for groups `0..group_count`. Particles are weighted by mass,
    /// or equally when a group carries no mass.
    pub fn compute(ensemble: &ParticleEnsemble, group_count: usize) -> Vec<PlumeStatistics> {
        let mut count = vec![0usize; group_count];
        let mut mass = vec![0.0; group_count];
        let mut first = vec![Vec3::zeros(); group_count];
        for p in ensemble.iter_active().filter(|p| p.release_group < group_count) {
            let g = p.release_group;
            count[g] += 1;
            mass[g] += p.total_mass();
        }
        let weight_of = |g: usize, m: f64| if mass[g] > 0.0 { m } else { 1.0 };
        let mut weight = vec![0.0; group_count];
        for p in ensemble.iter_active().filter(|p| p.release_group < group_count) {
            let w = weight_of(p.release_group, p.total_mass());
            first[p.release_group] += p.position * w;
            weight[p.release_group] += w;
        }
        let centroids: Vec<Vec3> = (0..group_count)
            .map(|g| if weight[g] > 0.0 { first[g] / weight[g] } else { Vec3::zeros() })
            .collect();
        let mut horizontal = vec![0.0; group_count];
        let mut vertical = vec![0.0; group_count];
        for p in ensemble.iter_active().filter(|p| p.release_group < group_count) {
            let g = p.release_group;
            let w = weight_of(g, p.total_mass());
            let d = p.position - centroids[g];
            horizontal[g] += w * (d.x * d.x + d.y * d.y);
            vertical[g] += w * d.z * d.z;
        }
        (0..group_count)
            .map(|g| {
                let norm = if weight[g] > 0.0 { 1.0 / weight[g] } else { 0.0 };
                PlumeStatistics {
                    release_group: g,
                    particles: count[g],
                    mass: mass[g],
                    centroid: centroids[g],
                    horizontal_spread: (horizontal[g] * norm).sqrt(),
                    vertical_spread: (vertical[g] * norm).sqrt(),
                }
            })
            .collect()
    }
}
