//! Domain-filling release
//!
//! The layer below `top` is filled with particles that all carry the same air
//! mass; a particle's tracer mass is that air mass times the species mixing
//! ratio. Boxes of the base grid (one cell by one layer) receive particles in
//! proportion to their air mass ρ·A·Δz.
//!
//! With boundary inflow on, air entering through the lateral faces of the
//! base grid becomes new particles of the same air mass:
//!
//! ```text
//! inflow air mass of a face box = ρ · max(0, u·n) · Δz · L · Δt
//! ```
//!
//! with n the inward normal and L the edge length of the box. Each face box
//! carries the part of a particle it could not emit into the next step.
//! Particles enter in the strip the inflow sweeps, at most one cell deep.

use super::{ParticleEnsemble, ReleaseSummary};
use crate::core_types::Vec3;
use crate::error::{DispersionError, Result};
use crate::grid::GridSpec;
use crate::interpolation::FieldInterpolator;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Settings of a domain-filling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainFillConfig {
    /// Particles placed at INIT.
    pub particle_count: usize,
    /// Upper edge of the filled layer (m above ground).
    pub top: f64,
    /// Layers the filled column is split into.
    pub layers: usize,
    /// Tracer mass per unit air mass (kg/kg), indexed like the species table.
    pub mixing_ratio: Vec<f64>,
    /// Emit particles for air entering through the lateral boundaries.
    pub boundary_inflow: bool,
}

impl Default for DomainFillConfig {
    fn default() -> Self {
        Self {
            particle_count: 10_000,
            top: 5000.0,
            layers: 10,
            mixing_ratio: Vec::new(),
            boundary_inflow: true,
        }
    }
}

impl DomainFillConfig {
    pub(crate) fn validate(&self, species_count: usize, model_top: f64) -> Result<()> {
        let fail = |msg: String| Err(DispersionError::invalid_config(format!("domain fill: {msg}")));
        if self.particle_count == 0 || self.layers == 0 {
            return fail("particle count and layer count must be positive".into());
        }
        if !(self.top.is_finite() && self.top > 0.0 && self.top <= model_top) {
            return fail(format!("top {} m must lie in (0, {model_top}] m", self.top));
        }
        if self.mixing_ratio.len() != species_count {
            return fail(format!(
                "{} mixing ratios given, species table has {species_count}",
                self.mixing_ratio.len()
            ));
        }
        if self.mixing_ratio.iter().any(|r| !(r.is_finite() && *r >= 0.0)) {
            return fail("mixing ratios must be finite and non-negative".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    West,
    East,
    South,
    North,
}

impl Side {
    const ALL: [Side; 4] = [Side::West, Side::East, Side::South, Side::North];

    /// Inward unit normal.
    fn normal(self) -> Vec3 {
        match self {
            Side::West => Vec3::x(),
            Side::East => -Vec3::x(),
            Side::South => Vec3::y(),
            Side::North => -Vec3::y(),
        }
    }
}

/// One cell edge by one layer of a lateral face.
#[derive(Debug, Clone, Copy)]
struct FaceBox {
    side: Side,
    /// Lower corner on the face.
    corner: Vec3,
    /// Edge length along the face (m).
    length: f64,
    /// Cell depth normal to the face (m).
    width: f64,
}

impl FaceBox {
    fn centre(&self, dz: f64) -> Vec3 {
        let along = match self.side {
            Side::West | Side::East => Vec3::new(0.0, 0.5 * self.length, 0.5 * dz),
            Side::South | Side::North => Vec3::new(0.5 * self.length, 0.0, 0.5 * dz),
        };
        self.corner + along
    }

    /// Lower corner and extent of the strip `depth` deep inside the face.
    fn strip(&self, depth: f64, dz: f64) -> (Vec3, Vec3) {
        match self.side {
            Side::West => (self.corner, Vec3::new(depth, self.length, dz)),
            Side::East => (self.corner - Vec3::new(depth, 0.0, 0.0), Vec3::new(depth, self.length, dz)),
            Side::South => (self.corner, Vec3::new(self.length, depth, dz)),
            Side::North => (self.corner - Vec3::new(0.0, depth, 0.0), Vec3::new(self.length, depth, dz)),
        }
    }
}

fn face_boxes(spec: &GridSpec, layers: usize, dz: f64) -> Vec<FaceBox> {
    let (x_max, y_max) = (spec.max_x(), spec.max_y());
    let mut boxes = Vec::with_capacity(2 * layers * (spec.nx + spec.ny));
    for k in 0..layers {
        let z = k as f64 * dz;
        for side in Side::ALL {
            match side {
                Side::West | Side::East => {
                    let x = if side == Side::West { spec.origin_x } else { x_max };
                    for iy in 0..spec.ny - 1 {
                        boxes.push(FaceBox {
                            side,
                            corner: Vec3::new(x, spec.point(0, iy).1, z),
                            length: spec.dy,
                            width: spec.dx,
                        });
                    }
                }
                Side::South | Side::North => {
                    let y = if side == Side::South { spec.origin_y } else { y_max };
                    for ix in 0..spec.nx - 1 {
                        boxes.push(FaceBox {
                            side,
                            corner: Vec3::new(spec.point(ix, 0).0, y, z),
                            length: spec.dx,
                            width: spec.dy,
                        });
                    }
                }
            }
        }
    }
    boxes
}

/// Runtime state of the domain-filling release.
#[derive(Debug, Clone)]
pub struct DomainFill {
    /// Release-group index carried by the particles.
    pub index: usize,
    pub config: DomainFillConfig,
    /// Air mass each particle represents (kg); zero before the fill.
    air_mass_per_particle: f64,
    /// Inflow air mass not yet emitted, per face box (kg).
    pending: Vec<f64>,
    rng: ChaCha8Rng,
}

impl DomainFill {
    pub fn new(index: usize, config: DomainFillConfig, seed: u64) -> Self {
        let stream = (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            index,
            config,
            air_mass_per_particle: 0.0,
            pending: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed ^ stream),
        }
    }

    pub fn air_mass_per_particle(&self) -> f64 {
        self.air_mass_per_particle
    }

    fn layer_depth(&self) -> f64 {
        self.config.top / self.config.layers as f64
    }

    fn spawn(&mut self, corner: Vec3, extent: Vec3, ensemble: &mut ParticleEnsemble, summary: &mut ReleaseSummary) {
        let offset = Vec3::new(
            self.rng.random::<f64>() * extent.x,
            self.rng.random::<f64>() * extent.y,
            self.rng.random::<f64>() * extent.z,
        );
        let mass: Vec<f64> = self
            .config
            .mixing_ratio
            .iter()
            .map(|r| r * self.air_mass_per_particle)
            .collect();
        for (total, m) in summary.mass.iter_mut().zip(&mass) {
            *total += m;
        }
        ensemble.spawn(corner + offset, mass, self.index);
        summary.particles += 1;
    }

    fn empty_summary(&self) -> ReleaseSummary {
        ReleaseSummary {
            particles: 0,
            mass: vec![0.0; self.config.mixing_ratio.len()],
        }
    }

    /// Place the initial particles over the base grid at `time`.
    pub fn fill(
        &mut self,
        interp: &FieldInterpolator<'_>,
        time: f64,
        ensemble: &mut ParticleEnsemble,
    ) -> Result<ReleaseSummary> {
        let spec = interp.hierarchy().base();
        let dz = self.layer_depth();
        let extent = Vec3::new(spec.dx, spec.dy, dz);
        let mut boxes = Vec::with_capacity(self.config.layers * (spec.nx - 1) * (spec.ny - 1));
        for k in 0..self.config.layers {
            for iy in 0..spec.ny - 1 {
                for ix in 0..spec.nx - 1 {
                    let (x, y) = spec.point(ix, iy);
                    let corner = Vec3::new(x, y, k as f64 * dz);
                    let location = interp.locate(&(corner + extent * 0.5))?;
                    let air = interp.air_density_at(&location, time)? * extent.x * extent.y * dz;
                    boxes.push((corner, air));
                }
            }
        }
        let total: f64 = boxes.iter().map(|(_, air)| air).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(DispersionError::NumericDegenerate {
                context: "domain fill".into(),
                detail: format!("air mass below {} m is {total} kg", self.config.top),
            });
        }
        let count = self.config.particle_count;
        self.air_mass_per_particle = total / count as f64;

        let mut summary = self.empty_summary();
        let mut cumulative = 0.0;
        for (corner, air) in boxes {
            cumulative += air;
            let due = ((cumulative / total * count as f64).round() as usize).min(count);
            while summary.particles < due {
                self.spawn(corner, extent, ensemble, &mut summary);
            }
        }
        Ok(summary)
    }

    /// Emit particles for the air entering the base grid during `[time, time + dt]`.
    pub fn inflow(
        &mut self,
        interp: &FieldInterpolator<'_>,
        time: f64,
        dt: f64,
        ensemble: &mut ParticleEnsemble,
    ) -> Result<ReleaseSummary> {
        let mut summary = self.empty_summary();
        if !self.config.boundary_inflow || self.air_mass_per_particle <= 0.0 {
            return Ok(summary);
        }
        let dz = self.layer_depth();
        let boxes = face_boxes(interp.hierarchy().base(), self.config.layers, dz);
        self.pending.resize(boxes.len(), 0.0);
        for (slot, face) in boxes.iter().enumerate() {
            let location = interp.locate(&face.centre(dz))?;
            let inward = interp.wind_at(&location, time)?.dot(&face.side.normal());
            if inward <= 0.0 {
                continue;
            }
            let air = interp.air_density_at(&location, time)? * inward * dz * face.length * dt;
            self.pending[slot] += air;
            let due = (self.pending[slot] / self.air_mass_per_particle).floor();
            if due < 1.0 {
                continue;
            }
            self.pending[slot] -= due * self.air_mass_per_particle;
            let (corner, extent) = face.strip((inward * dt).min(face.width), dz);
            for _ in 0..due as usize {
                self.spawn(corner, extent, ensemble, &mut summary);
            }
        }
        Ok(summary)
    }
}
