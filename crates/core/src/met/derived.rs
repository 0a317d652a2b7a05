//! Surface-layer and boundary-layer parameters derived after each snapshot load
//!
//! Computes, per grid column, the quantities the turbulence, deposition and
//! convection code needs but readers rarely supply directly. Fields already
//! present in the snapshot are never overwritten.
//!
//! # Formulas
//!
//! ```text
//! u*   = sqrt(τ / ρ)                       (from surface stress)
//! u*   = κ |U₁| / ln(z₁ / z₀)              (neutral log law fallback)
//! 1/L  = −κ g H / (ρ c_p T u*³)            (Obukhov length)
//! w*   = (g H h / (ρ c_p T))^(1/3)         (H > 0, else 0)
//! Ri_b = (g/θv_s)(θv − θv_s)(z − z_s) / (|ΔU|² + b u*²)
//! ```
//!
//! The mixing height is the lowest height where the bulk Richardson number
//! exceeds Ri_c = 0.25, with the shear term b = 100 of Vogelezang & Holtslag.
//!
//! # References
//!
//! - Obukhov, A.M. (1946). "Turbulence in an atmosphere with a non-uniform temperature."
//! - Vogelezang, D.H.P. & Holtslag, A.A.M. (1996). "Evaluation and model impacts of
//!   alternative boundary-layer height formulations." Boundary-Layer Meteorology, 81, 245-269.
//! - Stull, R.B. (1988). "An Introduction to Boundary Layer Meteorology."

use super::{FieldId, FieldSnapshot, LandUseMap};
use crate::core_types::constants::{
    saturation_specific_humidity, virtual_temperature, CP_AIR, GRAVITY, KARMAN, P_REFERENCE,
    R_DRY,
};
use crate::error::Result;
use crate::grid::GridSpec;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Critical bulk Richardson number.
pub const RICHARDSON_CRITICAL: f64 = 0.25;

/// Shear contribution coefficient b in the bulk Richardson number.
const SHEAR_COEFFICIENT: f64 = 100.0;

/// Smallest friction velocity used in derived quantities (m/s).
pub const MIN_FRICTION_VELOCITY: f64 = 1.0e-3;

/// Largest |1/L| kept (1/m): |L| ≥ 1 m.
const MAX_INVERSE_OBUKHOV: f64 = 1.0;

/// Relative humidity above which a layer is treated as cloudy.
const CLOUD_RH_THRESHOLD: f64 = 0.8;

/// Tunables for the derived-parameter pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedOptions {
    /// Roughness length used when the snapshot has no `Roughness` field (m).
    pub default_roughness: f64,
    /// Lower clamp of the diagnosed mixing height (m).
    pub min_mixing_height: f64,
    /// Upper clamp of the diagnosed mixing height (m).
    pub max_mixing_height: f64,
    /// Cloud bottom assumed where no saturated layer is found (m AGL).
    pub default_cloud_bottom: f64,
    /// Cloud top assumed where no saturated layer is found (m AGL).
    pub default_cloud_top: f64,
    /// Land-use cover; sets the roughness of snapshots without a
    /// `Roughness` field and the surface resistances of dry deposition.
    pub land_use: Option<LandUseMap>,
}

impl Default for DerivedOptions {
    fn default() -> Self {
        Self {
            default_roughness: 0.1,
            min_mixing_height: 100.0,
            max_mixing_height: 4500.0,
            default_cloud_bottom: 500.0,
            default_cloud_top: 3000.0,
            land_use: None,
        }
    }
}

/// Surface air density from pressure and temperature (kg/m³).
#[inline]
pub fn surface_density(pressure: f64, temperature: f64) -> f64 {
    pressure / (R_DRY * temperature)
}

/// Inverse Obukhov length (1/m) from the surface sensible heat flux (W/m²).
pub fn inverse_obukhov_length(heat_flux: f64, ustar: f64, temperature: f64, density: f64) -> f64 {
    let ustar = ustar.max(MIN_FRICTION_VELOCITY);
    let oli = -KARMAN * GRAVITY * heat_flux / (density * CP_AIR * temperature * ustar.powi(3));
    oli.clamp(-MAX_INVERSE_OBUKHOV, MAX_INVERSE_OBUKHOV)
}

/// Convective velocity scale w* (m/s); zero for non-positive heat flux.
pub fn convective_velocity(heat_flux: f64, mixing_height: f64, temperature: f64, density: f64) -> f64 {
    if heat_flux <= 0.0 {
        return 0.0;
    }
    (GRAVITY * heat_flux * mixing_height / (density * CP_AIR * temperature)).cbrt()
}

/// Friction velocity from the neutral logarithmic profile.
pub fn log_law_friction_velocity(wind_speed: f64, height: f64, roughness: f64) -> f64 {
    let z0 = roughness.max(1.0e-5);
    let z = height.max(2.0 * z0);
    (KARMAN * wind_speed / (z / z0).ln()).max(MIN_FRICTION_VELOCITY)
}

/// One column's thermodynamic profile used by the Richardson and cloud diagnostics.
#[derive(Debug, Clone)]
pub struct ColumnProfile {
    /// Level heights AGL (m).
    pub heights: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    /// Temperature (K).
    pub temperature: Vec<f64>,
    /// Specific humidity (kg/kg).
    pub humidity: Vec<f64>,
    /// Hydrostatic pressure (Pa).
    pub pressure: Vec<f64>,
}

impl ColumnProfile {
    /// Extract a column and integrate pressure hydrostatically from the surface.
    pub fn extract(snapshot: &FieldSnapshot, spec: &GridSpec, ix: usize, iy: usize) -> Result<Self> {
        let terrain = snapshot.surface_or(FieldId::Terrain, ix, iy, 0.0);
        let nz = spec.nz();
        let heights: Vec<f64> = (0..nz)
            .map(|k| spec.vertical.level_height(k, terrain))
            .collect();
        let temperature = snapshot.column(FieldId::Temperature, ix, iy)?;
        let humidity = if snapshot.has(FieldId::SpecificHumidity) {
            snapshot.column(FieldId::SpecificHumidity, ix, iy)?
        } else {
            vec![0.0; nz]
        };
        let u = snapshot.column(FieldId::U, ix, iy)?;
        let v = snapshot.column(FieldId::V, ix, iy)?;
        let p_surface = snapshot.surface_or(FieldId::SurfacePressure, ix, iy, 101_325.0);
        let mut pressure = Vec::with_capacity(nz);
        let mut p = p_surface;
        let mut z_prev = 0.0;
        let mut tv_prev = virtual_temperature(temperature[0], humidity[0]);
        for k in 0..nz {
            let tv = virtual_temperature(temperature[k], humidity[k]);
            let tv_mean = 0.5 * (tv + tv_prev);
            p *= (-GRAVITY * (heights[k] - z_prev) / (R_DRY * tv_mean)).exp();
            pressure.push(p);
            z_prev = heights[k];
            tv_prev = tv;
        }
        Ok(Self {
            heights,
            u,
            v,
            temperature,
            humidity,
            pressure,
        })
    }

    /// Virtual potential temperature at level `k` (K).
    pub fn theta_v(&self, k: usize) -> f64 {
        virtual_temperature(self.temperature[k], self.humidity[k])
            * (P_REFERENCE / self.pressure[k]).powf(R_DRY / CP_AIR)
    }

    /// Relative humidity at level `k` (fraction).
    pub fn relative_humidity(&self, k: usize) -> f64 {
        self.humidity[k] / saturation_specific_humidity(self.temperature[k], self.pressure[k])
    }
}

/// Bulk Richardson mixing height (m AGL), unclamped.
pub fn richardson_mixing_height(profile: &ColumnProfile, ustar: f64) -> f64 {
    let nz = profile.heights.len();
    let z_s = profile.heights[0];
    let theta_s = profile.theta_v(0);
    let shear_floor = SHEAR_COEFFICIENT * ustar * ustar;
    let mut ri_prev = 0.0;
    for k in 1..nz {
        let du = profile.u[k] - profile.u[0];
        let dv = profile.v[k] - profile.v[0];
        let dz = profile.heights[k] - z_s;
        let denom = (du * du + dv * dv + shear_floor).max(1.0e-6);
        let ri = GRAVITY / theta_s * (profile.theta_v(k) - theta_s) * dz / denom;
        if ri > RICHARDSON_CRITICAL {
            let z0 = profile.heights[k - 1];
            let z1 = profile.heights[k];
            let frac = ((RICHARDSON_CRITICAL - ri_prev) / (ri - ri_prev)).clamp(0.0, 1.0);
            return z0 + frac * (z1 - z0);
        }
        ri_prev = ri;
    }
    profile.heights[nz - 1]
}

/// Cloud bottom and top (m AGL) from the first and last cloudy levels of the
/// lowest contiguous saturated layer.
pub fn cloud_layer(profile: &ColumnProfile) -> Option<(f64, f64)> {
    let nz = profile.heights.len();
    let first = (0..nz).find(|&k| profile.relative_humidity(k) >= CLOUD_RH_THRESHOLD)?;
    let mut last = first;
    while last + 1 < nz && profile.relative_humidity(last + 1) >= CLOUD_RH_THRESHOLD {
        last += 1;
    }
    let top = if last == first {
        // single saturated level: give it half a layer above
        let above = profile.heights.get(last + 1).copied().unwrap_or(profile.heights[last]);
        0.5 * (profile.heights[last] + above)
    } else {
        profile.heights[last]
    };
    Some((profile.heights[first], top))
}

/// Fill in derived surface/boundary-layer fields on a freshly loaded snapshot.
pub fn derive_surface_parameters(
    snapshot: &mut FieldSnapshot,
    spec: &GridSpec,
    options: &DerivedOptions,
) -> Result<()> {
    if !snapshot.has(FieldId::Roughness) {
        if let Some(map) = &options.land_use {
            snapshot.insert(FieldId::Roughness, map.roughness_field(spec))?;
        }
    }

    let n2 = spec.horizontal_len();
    let has_temperature = snapshot.has(FieldId::Temperature);
    let has_winds = snapshot.has(FieldId::U) && snapshot.has(FieldId::V);

    let need_ustar = !snapshot.has(FieldId::FrictionVelocity)
        && (snapshot.has(FieldId::SurfaceStress) || has_winds);
    let need_hmix = !snapshot.has(FieldId::MixingHeight) && has_temperature && has_winds;
    let can_stability = snapshot.has(FieldId::SurfaceSensibleHeatFlux)
        && (snapshot.has(FieldId::Temperature2m) || has_temperature);
    let need_oli = !snapshot.has(FieldId::InverseObukhovLength) && can_stability;
    let need_wstar = !snapshot.has(FieldId::ConvectiveVelocity) && can_stability;
    let need_clouds = !snapshot.has(FieldId::CloudBottom)
        && (snapshot.has(FieldId::LargeScalePrecipitation)
            || snapshot.has(FieldId::ConvectivePrecipitation));

    if !(need_ustar || need_hmix || need_oli || need_wstar || need_clouds) {
        return Ok(());
    }

    let mut ustar_out = vec![0.0; n2];
    let mut hmix_out = vec![0.0; n2];
    let mut oli_out = vec![0.0; n2];
    let mut wstar_out = vec![0.0; n2];
    let mut cloud_bottom = vec![options.default_cloud_bottom; n2];
    let mut cloud_top = vec![options.default_cloud_top; n2];

    let lowest_height = |terrain: f64| spec.vertical.level_height(0, terrain);

    for iy in 0..spec.ny {
        for ix in 0..spec.nx {
            let idx = spec.index_2d(ix, iy);
            let terrain = snapshot.surface_or(FieldId::Terrain, ix, iy, 0.0);
            let p_s = snapshot.surface_or(FieldId::SurfacePressure, ix, iy, 101_325.0);
            let t_s = match snapshot.get(FieldId::Temperature2m) {
                Some(t2m) => t2m[idx],
                None => snapshot
                    .get(FieldId::Temperature)
                    .map_or(288.15, |t| t[idx]),
            };
            let rho = surface_density(p_s, t_s);

            let ustar = if let Some(given) = snapshot.get(FieldId::FrictionVelocity) {
                given[idx].max(MIN_FRICTION_VELOCITY)
            } else if let Some(stress) = snapshot.get(FieldId::SurfaceStress) {
                (stress[idx].abs() / rho).sqrt().max(MIN_FRICTION_VELOCITY)
            } else if has_winds {
                let u = snapshot.get(FieldId::U).map_or(0.0, |d| d[idx]);
                let v = snapshot.get(FieldId::V).map_or(0.0, |d| d[idx]);
                let z0 = snapshot.surface_or(FieldId::Roughness, ix, iy, options.default_roughness);
                log_law_friction_velocity(u.hypot(v), lowest_height(terrain), z0)
            } else {
                MIN_FRICTION_VELOCITY
            };
            ustar_out[idx] = ustar;

            let profile = if (need_hmix || need_clouds) && has_temperature && has_winds {
                Some(ColumnProfile::extract(snapshot, spec, ix, iy)?)
            } else {
                None
            };

            let hmix = if let Some(given) = snapshot.get(FieldId::MixingHeight) {
                given[idx]
            } else if let Some(profile) = &profile {
                richardson_mixing_height(profile, ustar)
                    .clamp(options.min_mixing_height, options.max_mixing_height)
            } else {
                options.min_mixing_height
            };
            hmix_out[idx] = hmix;

            let heat_flux = snapshot.surface_or(FieldId::SurfaceSensibleHeatFlux, ix, iy, 0.0);
            oli_out[idx] = inverse_obukhov_length(heat_flux, ustar, t_s, rho);
            wstar_out[idx] = convective_velocity(heat_flux, hmix, t_s, rho);

            if need_clouds {
                if let Some((bottom, top)) = profile.as_ref().and_then(cloud_layer) {
                    cloud_bottom[idx] = bottom;
                    cloud_top[idx] = top.max(bottom + 1.0);
                }
            }
        }
    }

    if need_ustar {
        snapshot.insert(FieldId::FrictionVelocity, ustar_out)?;
    }
    if need_hmix {
        snapshot.insert(FieldId::MixingHeight, hmix_out)?;
    }
    if need_oli {
        snapshot.insert(FieldId::InverseObukhovLength, oli_out)?;
    }
    if need_wstar {
        snapshot.insert(FieldId::ConvectiveVelocity, wstar_out)?;
    }
    if need_clouds {
        snapshot.insert(FieldId::CloudBottom, cloud_bottom)?;
        snapshot.insert(FieldId::CloudTop, cloud_top)?;
    }
    debug!(
        "Derived surface parameters for grid '{}' at t={}s",
        snapshot.grid_name(),
        snapshot.time()
    );
    Ok(())
}
