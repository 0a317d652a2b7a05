//! Mass transport through output-cell faces
//!
//! Each step compares a particle's start and end cells. Every face crossed on
//! the way credits the particle's mass to the gross flux in the direction of
//! motion: east/west crossings at the row and level of the step midpoint,
//! north/south crossings at its column and level, up/down crossings at its
//! column and row. Faces are owned by the cell they bound on the side the
//! particle leaves, so `east[i]` is mass leaving cell `i` through its east
//! face and `west[i]` mass leaving it through its west face.

use super::OutputGridSpec;
use crate::core_types::{SpeciesIndex, Vec3};

/// Direction of a gross face flux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxDirection {
    East,
    West,
    North,
    South,
    Up,
    Down,
}

impl FluxDirection {
    pub const ALL: [FluxDirection; 6] = [
        FluxDirection::East,
        FluxDirection::West,
        FluxDirection::North,
        FluxDirection::South,
        FluxDirection::Up,
        FluxDirection::Down,
    ];

    #[inline]
    const fn slot(self) -> usize {
        match self {
            FluxDirection::East => 0,
            FluxDirection::West => 1,
            FluxDirection::North => 2,
            FluxDirection::South => 3,
            FluxDirection::Up => 4,
            FluxDirection::Down => 5,
        }
    }
}

/// Gross face fluxes of one window (kg), `[species][iz][iy][ix]` per direction.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxFrame {
    pub east: Vec<f64>,
    pub west: Vec<f64>,
    pub north: Vec<f64>,
    pub south: Vec<f64>,
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

/// Face-flux accumulator over one output grid.
#[derive(Debug, Clone)]
pub struct FluxTally {
    species_count: usize,
    volume: usize,
    data: Vec<f64>,
}

/// Signed cell coordinate of `v` on a uniform axis; may fall outside `0..n`.
#[inline]
fn axis_cell(v: f64, origin: f64, spacing: f64) -> i64 {
    ((v - origin) / spacing).floor() as i64
}

/// Signed level of height `z`; `nz` above the top.
#[inline]
fn level_cell(spec: &OutputGridSpec, z: f64) -> i64 {
    if z > spec.top() {
        spec.nz() as i64
    } else {
        spec.heights.partition_point(|&h| h < z) as i64
    }
}

/// Cells whose face is crossed moving from cell `a` to cell `b` on an axis of
/// `n` cells, clipped to the grid. Positive moves cross the upper face of
/// `a..b`, negative moves the lower face of `b+1..=a`.
fn crossed(a: i64, b: i64, n: usize) -> std::ops::Range<usize> {
    let n = n as i64;
    let (lo, hi) = if b > a { (a, b) } else { (b + 1, a + 1) };
    let lo = lo.clamp(0, n);
    let hi = hi.clamp(0, n);
    (lo as usize)..(hi.max(lo) as usize)
}

impl FluxTally {
    pub fn new(spec: &OutputGridSpec, species_count: usize) -> Self {
        let volume = spec.volume_len();
        Self {
            species_count,
            volume,
            data: vec![0.0; FluxDirection::ALL.len() * species_count * volume],
        }
    }

    #[inline]
    fn offset(&self, direction: FluxDirection, species: SpeciesIndex) -> usize {
        (direction.slot() * self.species_count + species) * self.volume
    }

    fn credit(&mut self, direction: FluxDirection, cell: usize, mass: &[f64]) {
        for (species, &m) in mass.iter().enumerate().take(self.species_count) {
            if m != 0.0 {
                let index = self.offset(direction, species) + cell;
                self.data[index] += m;
            }
        }
    }

    /// Credit the faces crossed by a particle moving `from` → `to` carrying `mass`.
    pub fn record(&mut self, spec: &OutputGridSpec, from: &Vec3, to: &Vec3, mass: &[f64]) {
        let mid = (from + to) * 0.5;
        let (i0, i1) = (axis_cell(from.x, spec.origin_x, spec.dx), axis_cell(to.x, spec.origin_x, spec.dx));
        let (j0, j1) = (axis_cell(from.y, spec.origin_y, spec.dy), axis_cell(to.y, spec.origin_y, spec.dy));
        let (k0, k1) = (level_cell(spec, from.z), level_cell(spec, to.z));
        let im = axis_cell(mid.x, spec.origin_x, spec.dx);
        let jm = axis_cell(mid.y, spec.origin_y, spec.dy);
        let km = level_cell(spec, mid.z);
        let inside = |v: i64, n: usize| (0..n as i64).contains(&v);

        if i0 != i1 && inside(jm, spec.ny) && inside(km, spec.nz()) {
            let direction = if i1 > i0 { FluxDirection::East } else { FluxDirection::West };
            for i in crossed(i0, i1, spec.nx) {
                self.credit(direction, spec.index_3d(i, jm as usize, km as usize), mass);
            }
        }
        if j0 != j1 && inside(im, spec.nx) && inside(km, spec.nz()) {
            let direction = if j1 > j0 { FluxDirection::North } else { FluxDirection::South };
            for j in crossed(j0, j1, spec.ny) {
                self.credit(direction, spec.index_3d(im as usize, j, km as usize), mass);
            }
        }
        if k0 != k1 && inside(im, spec.nx) && inside(jm, spec.ny) {
            let direction = if k1 > k0 { FluxDirection::Up } else { FluxDirection::Down };
            for k in crossed(k0, k1, spec.nz()) {
                self.credit(direction, spec.index_3d(im as usize, jm as usize, k), mass);
            }
        }
    }

    /// Gross flux (kg) leaving one cell through one face.
    pub fn get(
        &self,
        spec: &OutputGridSpec,
        direction: FluxDirection,
        species: SpeciesIndex,
        (ix, iy, iz): (usize, usize, usize),
    ) -> f64 {
        self.data[self.offset(direction, species) + spec.index_3d(ix, iy, iz)]
    }

    /// Sum of one direction over the whole grid and one species (kg).
    pub fn total(&self, direction: FluxDirection, species: SpeciesIndex) -> f64 {
        let start = self.offset(direction, species);
        self.data[start..start + self.volume].iter().sum()
    }

    pub fn frame(&self) -> FluxFrame {
        let block = self.species_count * self.volume;
        let slice = |direction: FluxDirection| {
            let start = direction.slot() * block;
            self.data[start..start + block].to_vec()
        };
        FluxFrame {
            east: slice(FluxDirection::East),
            west: slice(FluxDirection::West),
            north: slice(FluxDirection::North),
            south: slice(FluxDirection::South),
            up: slice(FluxDirection::Up),
            down: slice(FluxDirection::Down),
        }
    }

    pub fn reset(&mut self) {
        self.data.iter_mut().for_each(|m| *m = 0.0);
    }
}
