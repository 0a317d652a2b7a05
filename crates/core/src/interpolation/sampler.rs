//! Space-time interpolation of gridded fields
//!
//! ```text
//! column value   v_c  = v[k] + w_k (v[k+1] − v[k])         (native levels)
//! horizontal     v    = Σ_c b_c v_c                          (bilinear)
//! time           v(t) = (1 − w_t) v(t₀) + w_t v(t₁)
//! gradient       ∂v/∂x from the bilinear stencil, ∂v/∂z = Σ_c b_c (v[k+1] − v[k]) / Δz_c
//! ```
//!
//! Vertical interpolation happens in each corner column before horizontal
//! weighting, so terrain-following levels are never mixed across columns.

use super::location::{Location, CORNERS};
use crate::core_types::constants::{GRAVITY, R_DRY};
use crate::core_types::Vec3;
use crate::error::{DispersionError, Result};
use crate::grid::{GridHierarchy, GridSpec, LevelBracket};
use crate::met::{FieldId, FieldSnapshot, FieldStore};

/// Interpolated value of a field and its spatial gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    pub value: f64,
    /// (∂/∂x, ∂/∂y, ∂/∂z) in units per metre.
    pub gradient: Vec3,
}

impl FieldSample {
    fn lerp(self, other: Self, w: f64) -> Self {
        Self {
            value: self.value + w * (other.value - self.value),
            gradient: self.gradient + (other.gradient - self.gradient) * w,
        }
    }
}

/// Boundary-layer scaling parameters at a particle position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryLayerProfile {
    /// Height above ground (m).
    pub z: f64,
    /// Friction velocity u* (m/s).
    pub friction_velocity: f64,
    /// Convective velocity scale w* (m/s).
    pub convective_velocity: f64,
    /// Mixing height h (m AGL).
    pub mixing_height: f64,
    /// Inverse Obukhov length 1/L (1/m).
    pub inverse_obukhov: f64,
    /// Roughness length z₀ (m).
    pub roughness: f64,
    /// Coriolis parameter magnitude (1/s).
    pub coriolis: f64,
    /// Surface air temperature (K).
    pub surface_temperature: f64,
    /// Air density at the particle (kg/m³).
    pub density: f64,
    /// ∂ ln ρ / ∂z (1/m).
    pub density_log_gradient: f64,
}

impl BoundaryLayerProfile {
    /// Whether the particle is inside the mixed layer.
    #[inline]
    pub fn in_boundary_layer(&self) -> bool {
        self.z < self.mixing_height
    }
}

/// Precipitation and cloud layer at a particle position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PrecipitationSample {
    /// Large-scale precipitation (mm/h).
    pub large_scale: f64,
    /// Convective precipitation (mm/h).
    pub convective: f64,
    /// Cloud bottom (m AGL).
    pub cloud_bottom: f64,
    /// Cloud top (m AGL).
    pub cloud_top: f64,
}

impl PrecipitationSample {
    /// Total precipitation rate (mm/h).
    #[inline]
    pub fn total(&self) -> f64 {
        self.large_scale + self.convective
    }
}

const DEFAULT_ROUGHNESS: f64 = 0.1;
const DEFAULT_TEMPERATURE: f64 = 288.15;
const DEFAULT_SURFACE_PRESSURE: f64 = 101_325.0;

/// Read-only view over the field store used by particle workers.
#[derive(Debug, Clone, Copy)]
pub struct FieldInterpolator<'a> {
    hierarchy: &'a GridHierarchy,
    store: &'a FieldStore,
}

impl<'a> FieldInterpolator<'a> {
    pub fn new(hierarchy: &'a GridHierarchy, store: &'a FieldStore) -> Self {
        Self { hierarchy, store }
    }

    pub fn hierarchy(&self) -> &'a GridHierarchy {
        self.hierarchy
    }

    pub fn store(&self) -> &'a FieldStore {
        self.store
    }

    /// Resolve a point to its stencil on the finest covering grid.
    ///
    /// Fails with `OutOfDomain` outside the base grid or above the model top.
    pub fn locate(&self, point: &Vec3) -> Result<Location> {
        let out = || DispersionError::OutOfDomain {
            x: point.x,
            y: point.y,
            z: point.z,
        };
        if !(point.x.is_finite() && point.y.is_finite() && point.z.is_finite()) {
            return Err(out());
        }
        let grid = self.hierarchy.containing(point.x, point.y).ok_or_else(out)?;
        let spec = self.hierarchy.get(grid);
        let (gx, gy) = spec.fractional_index(point.x, point.y);
        let ix0 = (gx.floor().max(0.0) as usize).min(spec.nx - 2);
        let iy0 = (gy.floor().max(0.0) as usize).min(spec.ny - 2);
        let fx = (gx - ix0 as f64).clamp(0.0, 1.0);
        let fy = (gy - iy0 as f64).clamp(0.0, 1.0);

        let (earlier, _) = self.store.bracket(grid);
        let held = LevelBracket {
            lower: 0,
            weight: 0.0,
            thickness: 0.0,
        };
        let mut location = Location {
            grid,
            ix0,
            iy0,
            fx,
            fy,
            z: point.z,
            terrain: 0.0,
            brackets: [held; 4],
        };
        let weights = location.weights();
        for (c, (dx, dy)) in CORNERS.iter().enumerate() {
            let terrain = earlier.surface_or(FieldId::Terrain, ix0 + dx, iy0 + dy, 0.0);
            location.terrain += weights[c] * terrain;
            location.brackets[c] = spec.vertical.bracket(point.z, terrain).ok_or_else(out)?;
        }
        Ok(location)
    }

    /// Value and gradient of `field` at `point` and `time`.
    pub fn sample(&self, point: &Vec3, time: f64, field: FieldId) -> Result<FieldSample> {
        let location = self.locate(point)?;
        self.sample_at(&location, time, field)
    }

    /// Value and gradient of `field` at a located point.
    pub fn sample_at(&self, location: &Location, time: f64, field: FieldId) -> Result<FieldSample> {
        let spec = self.hierarchy.get(location.grid);
        let (earlier, later) = self.store.bracket(location.grid);
        let w = self.store.time_weight(location.grid, time);
        let a = spatial_sample(spec, earlier, location, field)?;
        if w == 0.0 {
            return Ok(a);
        }
        let b = spatial_sample(spec, later, location, field)?;
        Ok(a.lerp(b, w))
    }

    /// Value of `field`, or `default` when the snapshot does not carry it.
    pub fn value_or(&self, location: &Location, time: f64, field: FieldId, default: f64) -> Result<f64> {
        let (earlier, _) = self.store.bracket(location.grid);
        if !earlier.has(field) {
            return Ok(default);
        }
        Ok(self.sample_at(location, time, field)?.value)
    }

    /// Mean wind (u, v, w) at a located point (m/s).
    pub fn wind_at(&self, location: &Location, time: f64) -> Result<Vec3> {
        Ok(Vec3::new(
            self.sample_at(location, time, FieldId::U)?.value,
            self.sample_at(location, time, FieldId::V)?.value,
            self.sample_at(location, time, FieldId::W)?.value,
        ))
    }

    fn surface_temperature_at(&self, location: &Location, time: f64) -> Result<f64> {
        match self.value_or(location, time, FieldId::Temperature2m, f64::NAN)? {
            t if t.is_finite() => Ok(t),
            _ => self.value_or(location, time, FieldId::Temperature, DEFAULT_TEMPERATURE),
        }
    }

    /// Air density and ∂ln ρ/∂z, with an isothermal hydrostatic fallback
    /// when the snapshot carries no density.
    fn density_with_gradient(&self, location: &Location, time: f64, surface_temperature: f64) -> Result<(f64, f64)> {
        if self.store.bracket(location.grid).0.has(FieldId::Density) {
            let rho = self.sample_at(location, time, FieldId::Density)?;
            let value = rho.value.max(1.0e-4);
            return Ok((value, rho.gradient.z / value));
        }
        let p_s = self.value_or(location, time, FieldId::SurfacePressure, DEFAULT_SURFACE_PRESSURE)?;
        let scale_height = R_DRY * surface_temperature / GRAVITY;
        let rho_s = p_s / (R_DRY * surface_temperature);
        Ok((rho_s * (-location.z.max(0.0) / scale_height).exp(), -1.0 / scale_height))
    }

    /// Air density at a located point (kg/m³).
    pub fn air_density_at(&self, location: &Location, time: f64) -> Result<f64> {
        let surface_temperature = self.surface_temperature_at(location, time)?;
        Ok(self.density_with_gradient(location, time, surface_temperature)?.0)
    }

    /// Boundary-layer scaling parameters at a located point.
    pub fn profile_at(&self, location: &Location, time: f64, point: &Vec3) -> Result<BoundaryLayerProfile> {
        let scalar = |field| self.sample_at(location, time, field).map(|s| s.value);
        let surface_temperature = self.surface_temperature_at(location, time)?;
        let (density, density_log_gradient) = self.density_with_gradient(location, time, surface_temperature)?;
        Ok(BoundaryLayerProfile {
            z: location.z,
            friction_velocity: scalar(FieldId::FrictionVelocity)?,
            convective_velocity: scalar(FieldId::ConvectiveVelocity)?.max(0.0),
            mixing_height: scalar(FieldId::MixingHeight)?,
            inverse_obukhov: scalar(FieldId::InverseObukhovLength)?,
            roughness: self.value_or(location, time, FieldId::Roughness, DEFAULT_ROUGHNESS)?,
            coriolis: self.hierarchy.coriolis_at(point.x, point.y),
            surface_temperature,
            density,
            density_log_gradient,
        })
    }

    /// Precipitation and cloud layer at a located point.
    pub fn precipitation_at(&self, location: &Location, time: f64) -> Result<PrecipitationSample> {
        let scalar = |field| self.sample_at(location, time, field).map(|s| s.value);
        Ok(PrecipitationSample {
            large_scale: scalar(FieldId::LargeScalePrecipitation)?.max(0.0),
            convective: scalar(FieldId::ConvectivePrecipitation)?.max(0.0),
            cloud_bottom: scalar(FieldId::CloudBottom)?,
            cloud_top: scalar(FieldId::CloudTop)?,
        })
    }

    /// Horizontal spacing (dx, dy) of the grid a location belongs to.
    pub fn spacing(&self, location: &Location) -> (f64, f64) {
        let spec = self.hierarchy.get(location.grid);
        (spec.dx, spec.dy)
    }
}

/// Spatial interpolation of one snapshot.
fn spatial_sample(
    spec: &GridSpec,
    snapshot: &FieldSnapshot,
    location: &Location,
    field: FieldId,
) -> Result<FieldSample> {
    let data = snapshot.require(field)?;
    let mut column = [0.0; 4];
    let mut vertical = [0.0; 4];
    for c in 0..4 {
        let (ix, iy) = location.corner(c);
        if field.is_3d() {
            let bracket = location.brackets[c];
            let lo = data[spec.index_3d(ix, iy, bracket.lower)];
            if bracket.thickness > 0.0 {
                let hi = data[spec.index_3d(ix, iy, bracket.lower + 1)];
                column[c] = lo + bracket.weight * (hi - lo);
                vertical[c] = (hi - lo) / bracket.thickness;
            } else {
                column[c] = lo;
            }
        } else {
            column[c] = data[spec.index_2d(ix, iy)];
        }
    }
    let (fx, fy) = (location.fx, location.fy);
    let weights = location.weights();
    let value: f64 = weights.iter().zip(&column).map(|(w, v)| w * v).sum();
    let ddx = ((1.0 - fy) * (column[1] - column[0]) + fy * (column[3] - column[2])) / spec.dx;
    let ddy = ((1.0 - fx) * (column[2] - column[0]) + fx * (column[3] - column[1])) / spec.dy;
    let ddz: f64 = weights.iter().zip(&vertical).map(|(w, v)| w * v).sum();
    Ok(FieldSample {
        value,
        gradient: Vec3::new(ddx, ddy, ddz),
    })
}
