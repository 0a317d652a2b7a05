//! Wet scavenging by precipitation
//!
//! Precipitation only falls on part of a grid cell. The grid-mean rate is
//! concentrated into the precipitating fraction, the scavenging coefficient is
//! evaluated with that local intensity, and the removed fraction is scaled
//! back by the precipitating area:
//!
//! ```text
//! f_p        = max(0.05, (P_ls·f_ls(P_ls) + P_c·f_c(P_c)) / (P_ls + P_c))
//! I          = (P_ls + P_c) / f_p                       mm/h in the raining area
//! Λ_below    = A · I^B                                  z < cloud bottom
//! Λ_in       = S_i · I / (3.6e6 · H_cloud)              cloud bottom ≤ z ≤ cloud top
//! fraction   = f_p · (1 − exp(−Λ Δt))
//! ```
//!
//! Above the cloud top, and whenever the precipitation rate is zero, the
//! fraction is exactly zero.
//!
//! # References
//!
//! - Hertel, O. et al. (1995). "Development and testing of a new variable
//!   scale air pollution model - ACDEP." Atmos. Environ., 29, 1267-1290.
//! - Stohl, A. et al. (2005). "Technical note: The Lagrangian particle
//!   dispersion model FLEXPART version 6.2." Atmos. Chem. Phys., 5, 2461-2474.

use crate::core_types::WetScavengingParams;
use crate::interpolation::PrecipitationSample;

/// Intensity thresholds (mm/h) of the precipitating-fraction tables.
const INTENSITY_CLASSES: [f64; 5] = [0.5, 1.25, 2.15, 3.35, 5.0];
/// Precipitating fraction of a cell for large-scale rain, per class.
const LARGE_SCALE_FRACTION: [f64; 5] = [0.5, 0.65, 0.8, 0.9, 0.95];
/// Precipitating fraction of a cell for convective rain, per class.
const CONVECTIVE_FRACTION: [f64; 5] = [0.4, 0.55, 0.7, 0.8, 0.9];
/// Smallest precipitating fraction.
const MIN_FRACTION: f64 = 0.05;
/// Thinnest cloud used for in-cloud scavenging (m).
const MIN_CLOUD_DEPTH: f64 = 50.0;

/// Where a particle sits relative to the precipitating cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudPosition {
    BelowCloud,
    InCloud,
    AboveCloud,
}

impl CloudPosition {
    pub fn classify(z: f64, precipitation: &PrecipitationSample) -> Self {
        if z > precipitation.cloud_top {
            CloudPosition::AboveCloud
        } else if z >= precipitation.cloud_bottom {
            CloudPosition::InCloud
        } else {
            CloudPosition::BelowCloud
        }
    }
}

fn class_fraction(rate: f64, table: &[f64; 5]) -> f64 {
    let class = INTENSITY_CLASSES.iter().filter(|&&t| rate > t).count();
    table[class.min(table.len() - 1)]
}

/// Fraction of the grid cell that is precipitating.
pub fn precipitating_fraction(precipitation: &PrecipitationSample) -> f64 {
    let total = precipitation.total();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = precipitation.large_scale * class_fraction(precipitation.large_scale, &LARGE_SCALE_FRACTION)
        + precipitation.convective * class_fraction(precipitation.convective, &CONVECTIVE_FRACTION);
    (weighted / total).max(MIN_FRACTION)
}

/// Scavenging coefficient Λ (1/s) at local intensity `intensity` (mm/h).
pub fn scavenging_coefficient(
    position: CloudPosition,
    intensity: f64,
    cloud_depth: f64,
    params: &WetScavengingParams,
) -> f64 {
    match position {
        CloudPosition::AboveCloud => 0.0,
        CloudPosition::BelowCloud => params.below_cloud_a * intensity.powf(params.below_cloud_b),
        CloudPosition::InCloud => {
            params.in_cloud_ratio * intensity / (3.6e6 * cloud_depth.max(MIN_CLOUD_DEPTH))
        }
    }
}

/// Fraction of a species' mass removed in `dt` at height `z`, in [0, 1].
pub fn wet_fraction(z: f64, precipitation: &PrecipitationSample, params: &WetScavengingParams, dt: f64) -> f64 {
    let total = precipitation.total();
    if total.is_nan() || total <= 0.0 {
        return 0.0;
    }
    let position = CloudPosition::classify(z, precipitation);
    if position == CloudPosition::AboveCloud {
        return 0.0;
    }
    let area = precipitating_fraction(precipitation);
    let intensity = total / area;
    let depth = precipitation.cloud_top - precipitation.cloud_bottom;
    let lambda = scavenging_coefficient(position, intensity, depth, params);
    (area * (1.0 - (-lambda * dt).exp())).clamp(0.0, 1.0)
}
