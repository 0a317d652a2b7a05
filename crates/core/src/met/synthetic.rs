//! Analytic meteorology for scenarios, demos and regression tests
//!
//! Stands in for the excluded file reader: snapshots are generated on demand
//! from closures or from a horizontally uniform atmosphere.

use super::{FieldId, FieldSnapshot, MetReader};
use crate::core_types::constants::{saturation_specific_humidity, GRAVITY, R_DRY};
use crate::core_types::Vec3;
use crate::error::MetError;
use crate::grid::{GridId, GridSpec};
use serde::{Deserialize, Serialize};

type Generator = dyn Fn(GridId, &GridSpec, f64) -> Result<FieldSnapshot, MetError> + Send;

/// Reader that synthesises snapshots at a fixed list of times.
pub struct SyntheticReader {
    grids: Vec<GridSpec>,
    times: Vec<f64>,
    generator: Box<Generator>,
    loads: usize,
}

impl SyntheticReader {
    pub fn new<F>(grids: Vec<GridSpec>, times: Vec<f64>, generator: F) -> Self
    where
        F: Fn(GridId, &GridSpec, f64) -> Result<FieldSnapshot, MetError> + Send + 'static,
    {
        Self {
            grids,
            times,
            generator: Box::new(generator),
            loads: 0,
        }
    }

    /// Same atmosphere on every grid at every time.
    pub fn uniform(grids: Vec<GridSpec>, times: Vec<f64>, atmosphere: UniformAtmosphere) -> Self {
        Self::new(grids, times, move |grid, spec, time| {
            atmosphere.snapshot(grid, spec, time)
        })
    }

    /// Number of snapshots served so far.
    pub fn load_count(&self) -> usize {
        self.loads
    }
}

impl MetReader for SyntheticReader {
    fn available_times(&self, grid: GridId) -> Result<Vec<f64>, MetError> {
        if grid.index() >= self.grids.len() {
            return Err(MetError::IoFailure(format!("unknown grid {}", grid.index())));
        }
        Ok(self.times.clone())
    }

    fn load_snapshot(&mut self, grid: GridId, time: f64) -> Result<FieldSnapshot, MetError> {
        let spec = self
            .grids
            .get(grid.index())
            .ok_or_else(|| MetError::IoFailure(format!("unknown grid {}", grid.index())))?;
        if !self.times.iter().any(|&t| t == time) {
            return Err(MetError::TimeNotFound {
                grid: spec.name.clone(),
                time,
            });
        }
        self.loads += 1;
        (self.generator)(grid, spec, time)
    }
}

/// Evaluate `f(x, y, z)` at every point of a field on `spec`.
///
/// `terrain` supplies column elevations for terrain-following grids; `None`
/// means flat terrain.
pub fn field_from_fn(
    spec: &GridSpec,
    field: FieldId,
    terrain: Option<&[f64]>,
    f: impl Fn(f64, f64, f64) -> f64,
) -> Vec<f64> {
    let nz = if field.is_3d() { spec.nz() } else { 1 };
    let mut data = Vec::with_capacity(spec.horizontal_len() * nz);
    for iz in 0..nz {
        for iy in 0..spec.ny {
            for ix in 0..spec.nx {
                let (x, y) = spec.point(ix, iy);
                let elevation = terrain.map_or(0.0, |t| t[spec.index_2d(ix, iy)]);
                let z = if field.is_3d() {
                    spec.vertical.level_height(iz, elevation)
                } else {
                    0.0
                };
                data.push(f(x, y, z));
            }
        }
    }
    data
}

/// Horizontally uniform, steady atmosphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniformAtmosphere {
    /// Mean wind (u, v, w) in m/s.
    pub wind: Vec3,
    /// Temperature at the surface (K).
    pub surface_temperature: f64,
    /// Temperature decrease with height (K/m).
    pub lapse_rate: f64,
    /// Relative humidity (fraction) at every level.
    pub relative_humidity: f64,
    pub surface_pressure: f64,
    /// Surface sensible heat flux (W/m², positive upward).
    pub heat_flux: f64,
    /// Prescribed friction velocity; derived from the wind when `None`.
    pub friction_velocity: Option<f64>,
    /// Prescribed mixing height; Richardson-diagnosed when `None`.
    pub mixing_height: Option<f64>,
    pub roughness: f64,
    /// Large-scale precipitation (mm/h).
    pub large_scale_precipitation: f64,
    /// Convective precipitation (mm/h).
    pub convective_precipitation: f64,
}

impl Default for UniformAtmosphere {
    fn default() -> Self {
        Self {
            wind: Vec3::new(5.0, 0.0, 0.0),
            surface_temperature: 288.15,
            lapse_rate: 0.0065,
            relative_humidity: 0.5,
            surface_pressure: 101_325.0,
            heat_flux: 0.0,
            friction_velocity: Some(0.3),
            mixing_height: Some(1000.0),
            roughness: 0.1,
            large_scale_precipitation: 0.0,
            convective_precipitation: 0.0,
        }
    }
}

impl UniformAtmosphere {
    /// Calm, neutral atmosphere with no precipitation.
    pub fn calm() -> Self {
        Self {
            wind: Vec3::zeros(),
            ..Self::default()
        }
    }

    fn temperature_at(&self, z: f64) -> f64 {
        self.surface_temperature - self.lapse_rate * z
    }

    fn pressure_at(&self, z: f64) -> f64 {
        let t_mean = self.temperature_at(0.5 * z);
        self.surface_pressure * (-GRAVITY * z / (R_DRY * t_mean)).exp()
    }

    /// Build the snapshot for one grid and time.
    pub fn snapshot(&self, grid: GridId, spec: &GridSpec, time: f64) -> Result<FieldSnapshot, MetError> {
        let n2 = spec.horizontal_len();
        let wrap = |e: crate::error::DispersionError| MetError::IoFailure(e.to_string());

        let temperature = field_from_fn(spec, FieldId::Temperature, None, |_, _, z| {
            self.temperature_at(z)
        });
        let humidity = field_from_fn(spec, FieldId::SpecificHumidity, None, |_, _, z| {
            self.relative_humidity * saturation_specific_humidity(self.temperature_at(z), self.pressure_at(z))
        });
        let relative_humidity = vec![self.relative_humidity; spec.volume_len()];
        let density = field_from_fn(spec, FieldId::Density, None, |_, _, z| {
            self.pressure_at(z) / (R_DRY * self.temperature_at(z))
        });

        let mut snapshot = FieldSnapshot::new(grid, spec, time)
            .with(FieldId::U, vec![self.wind.x; spec.volume_len()])
            .and_then(|s| s.with(FieldId::V, vec![self.wind.y; spec.volume_len()]))
            .and_then(|s| s.with(FieldId::W, vec![self.wind.z; spec.volume_len()]))
            .and_then(|s| s.with(FieldId::Temperature, temperature))
            .and_then(|s| s.with(FieldId::SpecificHumidity, humidity))
            .and_then(|s| s.with(FieldId::RelativeHumidity, relative_humidity))
            .and_then(|s| s.with(FieldId::Density, density))
            .and_then(|s| s.with(FieldId::Terrain, vec![0.0; n2]))
            .and_then(|s| s.with(FieldId::SurfacePressure, vec![self.surface_pressure; n2]))
            .and_then(|s| s.with(FieldId::Temperature2m, vec![self.surface_temperature; n2]))
            .and_then(|s| s.with(FieldId::SurfaceSensibleHeatFlux, vec![self.heat_flux; n2]))
            .and_then(|s| s.with(FieldId::Roughness, vec![self.roughness; n2]))
            .and_then(|s| {
                s.with(
                    FieldId::LargeScalePrecipitation,
                    vec![self.large_scale_precipitation; n2],
                )
            })
            .and_then(|s| {
                s.with(
                    FieldId::ConvectivePrecipitation,
                    vec![self.convective_precipitation; n2],
                )
            })
            .map_err(wrap)?;
        if let Some(ustar) = self.friction_velocity {
            snapshot
                .insert(FieldId::FrictionVelocity, vec![ustar; n2])
                .map_err(wrap)?;
        }
        if let Some(h) = self.mixing_height {
            snapshot
                .insert(FieldId::MixingHeight, vec![h; n2])
                .map_err(wrap)?;
        }
        Ok(snapshot)
    }
}
