//! Physical constants shared by the boundary-layer, convection and deposition code.

/// Gravitational acceleration (m/s²).
pub const GRAVITY: f64 = 9.81;

/// von Kármán constant.
pub const KARMAN: f64 = 0.4;

/// Gas constant for dry air (J/(kg·K)).
pub const R_DRY: f64 = 287.05;

/// Gas constant for water vapour (J/(kg·K)).
pub const R_VAPOUR: f64 = 461.5;

/// Specific heat of dry air at constant pressure (J/(kg·K)).
pub const CP_AIR: f64 = 1004.6;

/// Latent heat of vaporisation (J/kg).
pub const LATENT_HEAT_VAPORISATION: f64 = 2.501e6;

/// Ratio of gas constants R_d / R_v.
pub const EPSILON: f64 = R_DRY / R_VAPOUR;

/// Reference pressure for potential temperature (Pa).
pub const P_REFERENCE: f64 = 100_000.0;

/// Earth's angular velocity (rad/s).
pub const EARTH_ROTATION: f64 = 7.292e-5;

/// Kinematic viscosity of air (m²/s).
pub const KINEMATIC_VISCOSITY_AIR: f64 = 1.5e-5;

/// Dynamic viscosity of air (kg/(m·s)).
pub const DYNAMIC_VISCOSITY_AIR: f64 = 1.81e-5;

/// Molecular diffusivity of water vapour in air (m²/s).
pub const DIFFUSIVITY_WATER_VAPOUR: f64 = 2.11e-5;

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380649e-23;

/// Mean free path of air molecules at standard conditions (m).
pub const MEAN_FREE_PATH_AIR: f64 = 0.065e-6;

/// Prandtl number of air.
pub const PRANDTL_AIR: f64 = 0.72;

/// Standard sea-level air density (kg/m³), used where no density field exists.
pub const AIR_DENSITY_STANDARD: f64 = 1.225;

/// Saturation vapour pressure over water, Bolton (1980) (Pa) at temperature `t` (K).
#[inline]
pub fn saturation_vapour_pressure(t: f64) -> f64 {
    let tc = t - 273.15;
    611.2 * (17.67 * tc / (tc + 243.5)).exp()
}

/// Saturation specific humidity (kg/kg) at temperature `t` (K) and pressure `p` (Pa).
#[inline]
pub fn saturation_specific_humidity(t: f64, p: f64) -> f64 {
    let es = saturation_vapour_pressure(t).min(0.5 * p);
    EPSILON * es / (p - (1.0 - EPSILON) * es)
}

/// Virtual temperature (K) from temperature (K) and specific humidity (kg/kg).
#[inline]
pub fn virtual_temperature(t: f64, q: f64) -> f64 {
    t * (1.0 + 0.608 * q)
}

/// Coriolis parameter (1/s) at latitude `lat_deg`.
#[inline]
pub fn coriolis_parameter(lat_deg: f64) -> f64 {
    2.0 * EARTH_ROTATION * lat_deg.to_radians().sin()
}
