//! Kernel weights sum to one and every grid conserves the mass it bins
mod common;

use approx::assert_relative_eq;
use plume_core::output::{box_weights, ConcentrationGrid, KernelBandwidth};
use plume_core::particles::{Particle, ParticleId};
use plume_core::{OutputGridSpec, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn particles(n: u64) -> Vec<Particle> {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    (0..n)
        .map(|i| {
            let position = Vec3::new(
                rng.random_range(-500.0..10_500.0),
                rng.random_range(-500.0..10_500.0),
                rng.random_range(0.0..1200.0),
            );
            Particle::new(ParticleId(i), position, vec![rng.random_range(0.1..2.0), 1.0], 0, 1)
        })
        .collect()
}

#[test]
fn weights_sum_to_one_for_every_particle() {
    let spec = OutputGridSpec::new("out", (0.0, 0.0), (250.0, 400.0), (40, 25), vec![1000.0]);
    let mut weights = Vec::new();
    for p in particles(5000) {
        for h in [0.0, 0.3, 0.5, 1.7, 6.0] {
            let inside = box_weights(&spec, p.position.x, p.position.y, h * spec.dx, h * spec.dy, &mut weights);
            if !inside {
                assert!(!spec.contains(p.position.x, p.position.y));
                continue;
            }
            let sum: f64 = weights.iter().map(|w| w.2).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
            assert!(weights.iter().all(|w| w.2 >= 0.0 && w.0 < spec.nx && w.1 < spec.ny));
        }
    }
}

#[test]
fn overlapping_grids_each_conserve_their_mass() {
    let all = particles(20_000);
    let mother = OutputGridSpec::new("mother", (0.0, 0.0), (1000.0, 1000.0), (10, 10), vec![200.0, 1500.0]);
    let nest = OutputGridSpec::new("nest", (2000.0, 3000.0), (100.0, 100.0), (30, 30), vec![200.0, 1500.0]);
    for bandwidth in [
        KernelBandwidth::Fixed { cells: 0.5 },
        KernelBandwidth::Adaptive {
            cells: 0.5,
            reference_count: 50.0,
            max_cells: 4.0,
        },
    ] {
        for spec in [mother.clone(), nest.clone()] {
            let mut grid = ConcentrationGrid::new(spec.clone(), 2, Vec::new());
            let tally = grid.accumulate(&all, &bandwidth);
            let expected: f64 = all
                .iter()
                .filter(|p| spec.contains(p.position.x, p.position.y) && spec.level_of(p.position.z).is_some())
                .map(|p| p.mass[0])
                .sum();
            assert_relative_eq!(tally.mass[0], expected, max_relative = 1e-10);
            assert_relative_eq!(grid.accumulated_mass(0), expected, max_relative = 1e-9);
            assert_relative_eq!(grid.frame().total_mass(&spec, 0, 0), expected, max_relative = 1e-9);
        }
    }
}
