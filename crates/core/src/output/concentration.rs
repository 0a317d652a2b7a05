//! Concentration and deposition accumulators for one output grid
//!
//! Airborne mass is sampled at the configured cadence and summed per
//! (age class, species, level, cell); dividing by the sample count and the
//! cell volume at OUTPUT gives the window-mean concentration. Deposited mass
//! is summed per (species, cell) both for the current window and for the
//! whole run.
//!
//! Sampling runs over fixed-size particle chunks in parallel; each chunk
//! builds a sparse partial tally and the partials are merged in chunk order,
//! so the result does not depend on the number of worker threads.

use super::flux::{FluxFrame, FluxTally};
use super::kernel::box_weights;
use super::{KernelBandwidth, OutputGridSpec};
use crate::core_types::{SpeciesIndex, Vec3};
use crate::particles::Particle;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Particles per accumulation chunk.
const CHUNK: usize = 4096;

/// Which deposition accumulator receives removed mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositionKind {
    Dry,
    Wet,
}

/// What one sampling pass added to a grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleTally {
    /// Particles whose mass landed in the grid.
    pub particles: usize,
    /// Mass added per species (kg).
    pub mass: Vec<f64>,
}

impl SampleTally {
    fn merge(&mut self, other: &SampleTally) {
        self.particles += other.particles;
        for (a, b) in self.mass.iter_mut().zip(&other.mass) {
            *a += b;
        }
    }
}

/// Window-mean fields of one output grid, ready for the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFrame {
    pub grid: String,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub species_count: usize,
    pub age_classes: usize,
    pub samples: usize,
    /// Mean concentration (kg/m³), indexed like the accumulator.
    pub concentration: Vec<f64>,
    /// Deposition during the window (kg/m²), `[species][iy][ix]`.
    pub dry_deposition: Vec<f64>,
    pub wet_deposition: Vec<f64>,
    /// Deposition since the start of the run (kg/m²).
    pub cumulative_dry: Vec<f64>,
    pub cumulative_wet: Vec<f64>,
    /// Gross face fluxes over the window, when enabled.
    pub fluxes: Option<FluxFrame>,
}

impl GridFrame {
    /// Index of a concentration value.
    #[inline]
    pub fn index(&self, age: usize, species: SpeciesIndex, iz: usize, ix: usize, iy: usize) -> usize {
        (((age * self.species_count + species) * self.nz + iz) * self.ny + iy) * self.nx + ix
    }

    /// Column-integrated mass of one species and age class (kg), from the
    /// concentrations and cell volumes of `spec`.
    pub fn total_mass(&self, spec: &OutputGridSpec, age: usize, species: SpeciesIndex) -> f64 {
        let mut total = 0.0;
        for iz in 0..self.nz {
            let volume = spec.cell_volume(iz);
            for iy in 0..self.ny {
                for ix in 0..self.nx {
                    total += self.concentration[self.index(age, species, iz, ix, iy)] * volume;
                }
            }
        }
        total
    }
}

/// Mass accumulator over one output grid.
#[derive(Debug, Clone)]
pub struct ConcentrationGrid {
    spec: OutputGridSpec,
    species_count: usize,
    /// Upper age bounds (s); empty means one unbounded class.
    age_classes: Vec<f64>,
    mass: Vec<f64>,
    samples: usize,
    dry: Vec<f64>,
    wet: Vec<f64>,
    cumulative_dry: Vec<f64>,
    cumulative_wet: Vec<f64>,
    fluxes: Option<FluxTally>,
}

impl ConcentrationGrid {
    pub fn new(spec: OutputGridSpec, species_count: usize, age_classes: Vec<f64>) -> Self {
        let classes = age_classes.len().max(1);
        let volume = spec.volume_len() * species_count * classes;
        let surface = spec.horizontal_len() * species_count;
        Self {
            spec,
            species_count,
            age_classes,
            mass: vec![0.0; volume],
            samples: 0,
            dry: vec![0.0; surface],
            wet: vec![0.0; surface],
            cumulative_dry: vec![0.0; surface],
            cumulative_wet: vec![0.0; surface],
            fluxes: None,
        }
    }

    /// Also accumulate mass fluxes through the cell faces.
    pub fn with_fluxes(mut self) -> Self {
        self.fluxes = Some(FluxTally::new(&self.spec, self.species_count));
        self
    }

    pub fn fluxes(&self) -> Option<&FluxTally> {
        self.fluxes.as_ref()
    }

    /// Credit the faces crossed by one particle displacement. No-op unless
    /// fluxes are enabled.
    pub fn record_flux(&mut self, from: &Vec3, to: &Vec3, mass: &[f64]) {
        if let Some(fluxes) = self.fluxes.as_mut() {
            fluxes.record(&self.spec, from, to, mass);
        }
    }

    pub fn spec(&self) -> &OutputGridSpec {
        &self.spec
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn age_class_count(&self) -> usize {
        self.age_classes.len().max(1)
    }

    /// Age class of a particle; `None` when older than the last class.
    pub fn age_class(&self, age: f64) -> Option<usize> {
        if self.age_classes.is_empty() {
            return Some(0);
        }
        let class = self.age_classes.partition_point(|&bound| bound < age);
        (class < self.age_classes.len()).then_some(class)
    }

    #[inline]
    fn mass_index(&self, age: usize, species: SpeciesIndex, iz: usize, ix: usize, iy: usize) -> usize {
        (((age * self.species_count + species) * self.spec.nz() + iz) * self.spec.ny + iy) * self.spec.nx + ix
    }

    /// Accumulated airborne mass (kg) of one species summed over the window's
    /// samples.
    pub fn accumulated_mass(&self, species: SpeciesIndex) -> f64 {
        let block = self.spec.volume_len();
        (0..self.age_class_count())
            .map(|age| {
                let start = (age * self.species_count + species) * block;
                self.mass[start..start + block].iter().sum::<f64>()
            })
            .sum()
    }

    /// Add one sample of the active particles.
    pub fn accumulate(&mut self, particles: &[Particle], bandwidth: &KernelBandwidth) -> SampleTally {
        let local_counts = bandwidth.is_adaptive().then(|| self.cell_counts(particles));
        let this = &*self;
        let partials: Vec<(FxHashMap<usize, f64>, SampleTally)> = particles
            .par_chunks(CHUNK)
            .map(|chunk| this.partial_tally(chunk, bandwidth, local_counts.as_deref()))
            .collect();

        let mut tally = SampleTally {
            particles: 0,
            mass: vec![0.0; self.species_count],
        };
        for (cells, partial) in &partials {
            for (&index, &m) in cells {
                self.mass[index] += m;
            }
            tally.merge(partial);
        }
        self.samples += 1;
        tally
    }

    fn cell_counts(&self, particles: &[Particle]) -> Vec<u32> {
        let mut counts = vec![0u32; self.spec.horizontal_len()];
        for p in particles.iter().filter(|p| p.is_active()) {
            if let Some((ix, iy)) = self.spec.cell_of(p.position.x, p.position.y) {
                counts[self.spec.index_2d(ix, iy)] += 1;
            }
        }
        counts
    }

    fn partial_tally(
        &self,
        chunk: &[Particle],
        bandwidth: &KernelBandwidth,
        local_counts: Option<&[u32]>,
    ) -> (FxHashMap<usize, f64>, SampleTally) {
        let mut cells: FxHashMap<usize, f64> = FxHashMap::default();
        let mut tally = SampleTally {
            particles: 0,
            mass: vec![0.0; self.species_count],
        };
        let mut weights = Vec::with_capacity(16);
        for p in chunk.iter().filter(|p| p.is_active()) {
            let (Some(age), Some(iz)) = (self.age_class(p.age), self.spec.level_of(p.position.z)) else {
                continue;
            };
            let local = match (local_counts, self.spec.cell_of(p.position.x, p.position.y)) {
                (Some(counts), Some((ix, iy))) => counts[self.spec.index_2d(ix, iy)] as usize,
                _ => 1,
            };
            let h = bandwidth.half_width(local);
            if !box_weights(&self.spec, p.position.x, p.position.y, h * self.spec.dx, h * self.spec.dy, &mut weights) {
                continue;
            }
            tally.particles += 1;
            for (species, &m) in p.mass.iter().enumerate() {
                if m == 0.0 {
                    continue;
                }
                for &(ix, iy, w) in &weights {
                    *cells.entry(self.mass_index(age, species, iz, ix, iy)).or_insert(0.0) += m * w;
                }
                tally.mass[species] += m;
            }
        }
        (cells, tally)
    }

    /// Credit deposited mass to the cell under (x, y). Returns whether the
    /// point lies in the grid.
    pub fn add_deposition(&mut self, kind: DepositionKind, species: SpeciesIndex, x: f64, y: f64, mass: f64) -> bool {
        let Some((ix, iy)) = self.spec.cell_of(x, y) else {
            return false;
        };
        let index = species * self.spec.horizontal_len() + self.spec.index_2d(ix, iy);
        let (window, cumulative) = match kind {
            DepositionKind::Dry => (&mut self.dry, &mut self.cumulative_dry),
            DepositionKind::Wet => (&mut self.wet, &mut self.cumulative_wet),
        };
        window[index] += mass;
        cumulative[index] += mass;
        true
    }

    /// Deposited mass (kg) of one species since the start of the run.
    pub fn deposited_mass(&self, kind: DepositionKind, species: SpeciesIndex) -> f64 {
        let n = self.spec.horizontal_len();
        let data = match kind {
            DepositionKind::Dry => &self.cumulative_dry,
            DepositionKind::Wet => &self.cumulative_wet,
        };
        data[species * n..(species + 1) * n].iter().sum()
    }

    /// Window means as a frame for the writer.
    pub fn frame(&self) -> GridFrame {
        let samples = self.samples.max(1) as f64;
        let block = self.spec.horizontal_len();
        let mut concentration = self.mass.clone();
        for (chunk_index, chunk) in concentration.chunks_mut(block).enumerate() {
            let iz = chunk_index % self.spec.nz();
            let volume = self.spec.cell_volume(iz);
            chunk.iter_mut().for_each(|c| *c /= samples * volume);
        }
        let area = self.spec.cell_area();
        let per_area = |v: &[f64]| v.iter().map(|m| m / area).collect::<Vec<f64>>();
        GridFrame {
            grid: self.spec.name.clone(),
            nx: self.spec.nx,
            ny: self.spec.ny,
            nz: self.spec.nz(),
            species_count: self.species_count,
            age_classes: self.age_class_count(),
            samples: self.samples,
            concentration,
            dry_deposition: per_area(&self.dry),
            wet_deposition: per_area(&self.wet),
            cumulative_dry: per_area(&self.cumulative_dry),
            cumulative_wet: per_area(&self.cumulative_wet),
            fluxes: self.fluxes.as_ref().map(FluxTally::frame),
        }
    }

    /// Start a new averaging window; cumulative deposition is kept.
    pub fn reset_window(&mut self) {
        self.mass.iter_mut().for_each(|m| *m = 0.0);
        self.dry.iter_mut().for_each(|m| *m = 0.0);
        self.wet.iter_mut().for_each(|m| *m = 0.0);
        if let Some(fluxes) = self.fluxes.as_mut() {
            fluxes.reset();
        }
        self.samples = 0;
    }
}
