//! Undilute parcel ascent: LCL, buoyancy profile, CAPE and neutral buoyancy
//!
//! A parcel with the properties of the lowest model level rises dry-
//! adiabatically to its lifting condensation level, then along the
//! pseudo-adiabat.
//!
//! ```text
//! T_LCL = 2840 / (3.5 ln T − ln e − 4.805) + 55        (e in hPa)
//! Γ_d   = g / c_p
//! Γ_m   = g (1 + L r_s / (R_d T)) / (c_p + ε L² r_s / (R_d T²))
//! B     = g (T_v,parcel − T_v,env) / T_v,env
//! CAPE  = ∫ max(B, 0) dz   from LFC to LNB
//! ```
//!
//! # References
//!
//! - Bolton, D. (1980). "The computation of equivalent potential temperature."
//!   Monthly Weather Review, 108, 1046-1053.
//! - Emanuel, K.A. (1994). "Atmospheric Convection." Oxford University Press.

use crate::core_types::constants::{
    saturation_specific_humidity, virtual_temperature, CP_AIR, EPSILON, GRAVITY,
    LATENT_HEAT_VAPORISATION, R_DRY,
};
use crate::met::derived::ColumnProfile;

/// Dry adiabatic lapse rate (K/m).
pub const DRY_LAPSE_RATE: f64 = GRAVITY / CP_AIR;

/// Largest moist-adiabat integration step (m).
const MOIST_STEP: f64 = 50.0;

/// Environmental sounding of one column, bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct Sounding {
    /// Level heights AGL (m).
    pub heights: Vec<f64>,
    /// Temperature (K).
    pub temperature: Vec<f64>,
    /// Specific humidity (kg/kg).
    pub humidity: Vec<f64>,
    /// Pressure (Pa).
    pub pressure: Vec<f64>,
}

impl Sounding {
    pub fn from_profile(profile: &ColumnProfile) -> Self {
        Self {
            heights: profile.heights.clone(),
            temperature: profile.temperature.clone(),
            humidity: profile.humidity.clone(),
            pressure: profile.pressure.clone(),
        }
    }

    /// Linear blend `(1 − w)·self + w·other` of two soundings on the same levels.
    pub fn blend(&self, other: &Self, w: f64) -> Self {
        let mix = |a: &[f64], b: &[f64]| a.iter().zip(b).map(|(x, y)| x + w * (y - x)).collect();
        Self {
            heights: mix(&self.heights, &other.heights),
            temperature: mix(&self.temperature, &other.temperature),
            humidity: mix(&self.humidity, &other.humidity),
            pressure: mix(&self.pressure, &other.pressure),
        }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Air density at level `k` (kg/m³).
    pub fn density(&self, k: usize) -> f64 {
        self.pressure[k] / (R_DRY * virtual_temperature(self.temperature[k], self.humidity[k]))
    }

    /// Environmental virtual temperature at level `k` (K).
    pub fn virtual_temperature(&self, k: usize) -> f64 {
        virtual_temperature(self.temperature[k], self.humidity[k])
    }

    /// Pressure at height `z`, log-linear between levels (Pa).
    pub fn pressure_at(&self, z: f64) -> f64 {
        let (k, w) = self.bracket(z);
        let (p0, p1) = (self.pressure[k], self.pressure[k + 1]);
        (p0.ln() + w * (p1.ln() - p0.ln())).exp()
    }

    /// Linear interpolation of a per-level quantity at height `z`.
    pub fn interpolate(&self, values: &[f64], z: f64) -> f64 {
        let (k, w) = self.bracket(z);
        values[k] + w * (values[k + 1] - values[k])
    }

    /// Lower level index and weight for height `z`, extrapolating at the ends.
    fn bracket(&self, z: f64) -> (usize, f64) {
        let n = self.heights.len();
        let k = self
            .heights
            .partition_point(|&h| h <= z)
            .saturating_sub(1)
            .min(n - 2);
        let dz = self.heights[k + 1] - self.heights[k];
        let w = if dz > 0.0 { (z - self.heights[k]) / dz } else { 0.0 };
        (k, w)
    }
}

/// Vapour pressure (Pa) from specific humidity and pressure.
#[inline]
pub fn vapour_pressure(q: f64, p: f64) -> f64 {
    q * p / (EPSILON + (1.0 - EPSILON) * q)
}

/// Temperature at the lifting condensation level (K), Bolton (1980) eq. 21.
///
/// `None` for a completely dry parcel.
pub fn lcl_temperature(t: f64, q: f64, p: f64) -> Option<f64> {
    let e_hpa = vapour_pressure(q, p) / 100.0;
    if e_hpa.is_nan() || e_hpa <= 0.0 {
        return None;
    }
    let denom = 3.5 * t.ln() - e_hpa.ln() - 4.805;
    if denom <= 0.0 {
        return None;
    }
    Some((2840.0 / denom + 55.0).min(t))
}

/// Pseudo-adiabatic lapse rate (K/m) at temperature `t` and pressure `p`.
pub fn moist_lapse_rate(t: f64, p: f64) -> f64 {
    let rs = saturation_specific_humidity(t, p);
    let l = LATENT_HEAT_VAPORISATION;
    GRAVITY * (1.0 + l * rs / (R_DRY * t)) / (CP_AIR + EPSILON * l * l * rs / (R_DRY * t * t))
}

/// Result of lifting the surface parcel through a sounding.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelAscent {
    /// Lifting condensation level (m AGL).
    pub lcl: f64,
    /// Level of free convection (m AGL), if the parcel ever becomes buoyant.
    pub lfc: Option<f64>,
    /// Level of neutral buoyancy (m AGL); the LCL when the parcel is never buoyant.
    pub lnb: f64,
    /// Convective available potential energy (J/kg).
    pub cape: f64,
    /// Parcel buoyancy at each sounding level (m/s²).
    pub buoyancy: Vec<f64>,
}

impl ParcelAscent {
    /// Depth of the buoyant cloud layer (m).
    pub fn cloud_depth(&self) -> f64 {
        (self.lnb - self.lcl).max(0.0)
    }

    /// Buoyancy at arbitrary height, linear between sounding levels (m/s²).
    pub fn buoyancy_at(&self, sounding: &Sounding, z: f64) -> f64 {
        sounding.interpolate(&self.buoyancy, z)
    }
}

/// Lift the lowest-level parcel. `None` when the sounding is too short or dry.
pub fn lift_parcel(sounding: &Sounding) -> Option<ParcelAscent> {
    let n = sounding.len();
    if n < 2 {
        return None;
    }
    let z0 = sounding.heights[0];
    let t0 = sounding.temperature[0];
    let q0 = sounding.humidity[0];
    let t_lcl = lcl_temperature(t0, q0, sounding.pressure[0])?;
    let lcl = z0 + (t0 - t_lcl) / DRY_LAPSE_RATE;

    // parcel temperature and humidity at each level
    let mut buoyancy = Vec::with_capacity(n);
    let mut z_moist = lcl;
    let mut t_moist = t_lcl;
    for k in 0..n {
        let z = sounding.heights[k];
        let (t_p, q_p) = if z <= lcl {
            (t0 - DRY_LAPSE_RATE * (z - z0), q0)
        } else {
            while z_moist < z {
                let step = (z - z_moist).min(MOIST_STEP);
                let p = sounding.pressure_at(z_moist + 0.5 * step);
                t_moist -= moist_lapse_rate(t_moist, p) * step;
                z_moist += step;
            }
            (t_moist, saturation_specific_humidity(t_moist, sounding.pressure[k]))
        };
        let tv_env = sounding.virtual_temperature(k);
        buoyancy.push(GRAVITY * (virtual_temperature(t_p, q_p) - tv_env) / tv_env);
    }

    // first buoyant region above the LCL
    let first = (0..n).find(|&k| sounding.heights[k] > lcl && buoyancy[k] > 0.0);
    let Some(first) = first else {
        return Some(ParcelAscent {
            lcl,
            lfc: None,
            lnb: lcl,
            cape: 0.0,
            buoyancy,
        });
    };
    let lfc = if first > 0 && sounding.heights[first - 1] > lcl && buoyancy[first - 1] < 0.0 {
        let (b0, b1) = (buoyancy[first - 1], buoyancy[first]);
        let (h0, h1) = (sounding.heights[first - 1], sounding.heights[first]);
        h0 + (h1 - h0) * (-b0 / (b1 - b0))
    } else {
        lcl.max(sounding.heights[first.saturating_sub(1)])
    };

    let mut cape = 0.0;
    let mut lnb = sounding.heights[n - 1];
    let mut z_prev = lfc;
    let mut b_prev = 0.0f64.max(if first > 0 { buoyancy[first - 1] } else { 0.0 });
    for k in first..n {
        let (z, b) = (sounding.heights[k], buoyancy[k]);
        if b <= 0.0 {
            let frac = b_prev / (b_prev - b);
            lnb = z_prev + (z - z_prev) * frac;
            cape += 0.5 * b_prev * (lnb - z_prev);
            break;
        }
        cape += 0.5 * (b + b_prev) * (z - z_prev);
        z_prev = z;
        b_prev = b;
    }
    Some(ParcelAscent {
        lcl,
        lfc: Some(lfc),
        lnb,
        cape,
        buoyancy,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Moist tropical sounding with a conditionally unstable troposphere.
    pub(crate) fn tropical_sounding() -> Sounding {
        let heights: Vec<f64> = (0..30u32).map(|k| 10.0 + 500.0 * f64::from(k)).collect();
        let temperature: Vec<f64> = heights.iter().map(|z| 302.0 - 0.0065 * z).collect();
        let mut pressure = Vec::with_capacity(heights.len());
        let mut humidity = Vec::with_capacity(heights.len());
        for (z, t) in heights.iter().zip(&temperature) {
            let p = 101_000.0 * (-z / 8500.0f64).exp();
            let rh = if *z < 2000.0 { 0.85 } else { 0.5 };
            humidity.push(rh * saturation_specific_humidity(*t, p));
            pressure.push(p);
        }
        Sounding {
            heights,
            temperature,
            humidity,
            pressure,
        }
    }

    /// Dry, strongly stable sounding.
    pub(crate) fn stable_sounding() -> Sounding {
        let mut s = tropical_sounding();
        for (k, z) in s.heights.iter().enumerate() {
            s.temperature[k] = 280.0 + 0.003 * z;
            s.humidity[k] = 0.1 * saturation_specific_humidity(s.temperature[k], s.pressure[k]);
        }
        s
    }

    #[test]
    fn lcl_temperature_matches_bolton_example() {
        // T = 300 K with e = 20 hPa gives T_L ≈ 288.4 K
        let p = 100_000.0;
        let e = 2000.0;
        let q = EPSILON * e / (p - (1.0 - EPSILON) * e);
        let t_l = lcl_temperature(300.0, q, p).unwrap();
        assert_relative_eq!(t_l, 288.4, epsilon = 0.5);
        assert!(lcl_temperature(300.0, 0.0, p).is_none());
    }

    #[test]
    fn moist_lapse_rate_is_below_dry() {
        let gm = moist_lapse_rate(295.0, 95_000.0);
        assert!(gm < DRY_LAPSE_RATE);
        assert!(gm > 0.003, "{gm}");
    }

    #[test]
    fn tropical_parcel_has_cape() {
        let ascent = lift_parcel(&tropical_sounding()).unwrap();
        assert!(ascent.lcl > 100.0 && ascent.lcl < 1500.0, "lcl {}", ascent.lcl);
        assert!(ascent.cape > 500.0, "cape {}", ascent.cape);
        assert!(ascent.cloud_depth() > 5000.0, "depth {}", ascent.cloud_depth());
    }

    #[test]
    fn stable_parcel_has_no_cape() {
        let ascent = lift_parcel(&stable_sounding()).unwrap();
        assert_eq!(ascent.cape, 0.0);
        assert!(ascent.lfc.is_none());
    }
}
