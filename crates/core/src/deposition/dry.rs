//! Dry deposition by a resistance network
//!
//! ```text
//! r_a = [ln(z_r/z₀) − ψ_h(z_r/L) + ψ_h(z₀/L)] / (κ u*)       aerodynamic
//! r_b = 2/(κ u*) · (Sc/Pr)^(2/3)                            gas, quasi-laminar
//! r_b = 1 / (u* (Sc^(-2/3) + 10^(-3/St)))                   particle
//! v_d = 1 / (r_a + r_b + r_c)                               gas
//! v_d = v_s + 1 / (r_a + r_b + r_a r_b v_s)                 particle
//! v_s = ρ_p d² g C_c / (18 μ)                               Stokes with slip
//! ```
//!
//! Removal applies only inside the near-surface layer of depth Δ:
//! fraction = 1 − exp(−v_d Δt / Δ).
//!
//! With land-use cover the velocity is the cover-weighted sum of per-class
//! velocities, each with the class roughness in r_a and, for reactive gases,
//! the class surface resistance r_c.
//!
//! # References
//!
//! - Businger, J.A. et al. (1971). "Flux-profile relationships in the
//!   atmospheric surface layer." J. Atmos. Sci., 28, 181-189.
//! - Seinfeld, J.H. & Pandis, S.N. (2006). "Atmospheric Chemistry and
//!   Physics", 2nd ed., ch. 9 and 19. Wiley.
//! - Slinn, W.G.N. (1982). "Predictions for particle deposition to vegetative
//!   canopies." Atmos. Environ., 16, 1785-1794.

use crate::core_types::constants::{
    BOLTZMANN, DIFFUSIVITY_WATER_VAPOUR, DYNAMIC_VISCOSITY_AIR, GRAVITY, KARMAN,
    KINEMATIC_VISCOSITY_AIR, MEAN_FREE_PATH_AIR, PRANDTL_AIR,
};
use super::surface::gas_surface_resistance;
use crate::core_types::DryDepositionParams;
use crate::interpolation::BoundaryLayerProfile;
use crate::met::{LandUseClass, LandUseFractions};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Smallest friction velocity used in the resistances (m/s).
const MIN_USTAR: f64 = 0.01;

/// Near-surface layer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DryDepositionOptions {
    /// Depth of the layer in which particles deposit (m).
    pub layer_depth: f64,
    /// Reference height of the aerodynamic resistance (m).
    pub reference_height: f64,
    /// Global radiation used by the stomatal resistance (W/m²).
    pub radiation: f64,
}

impl Default for DryDepositionOptions {
    fn default() -> Self {
        Self {
            layer_depth: 30.0,
            reference_height: 15.0,
            radiation: 400.0,
        }
    }
}

/// Businger–Dyer integrated stability function for heat.
pub fn psi_heat(zeta: f64) -> f64 {
    if zeta >= 0.0 {
        -5.0 * zeta.min(10.0)
    } else {
        2.0 * ((1.0 + (1.0 - 16.0 * zeta).sqrt()) / 2.0).ln()
    }
}

/// Aerodynamic resistance between `z_ref` and the roughness length (s/m).
pub fn aerodynamic_resistance(z_ref: f64, roughness: f64, ustar: f64, inverse_obukhov: f64) -> f64 {
    let z0 = roughness.clamp(1.0e-5, 0.5 * z_ref);
    let shape = (z_ref / z0).ln() - psi_heat(z_ref * inverse_obukhov) + psi_heat(z0 * inverse_obukhov);
    shape.max(0.1) / (KARMAN * ustar.max(MIN_USTAR))
}

/// Cunningham slip correction for a particle of diameter `d` (m).
pub fn cunningham(d: f64) -> f64 {
    let knudsen = 2.0 * MEAN_FREE_PATH_AIR / d;
    1.0 + knudsen * (1.257 + 0.4 * (-0.55 * d / MEAN_FREE_PATH_AIR).exp())
}

/// Stokes gravitational settling velocity with slip correction (m/s, positive down).
pub fn settling_velocity(density: f64, diameter: f64) -> f64 {
    density * diameter * diameter * GRAVITY * cunningham(diameter) / (18.0 * DYNAMIC_VISCOSITY_AIR)
}

/// Settling velocity of a species; zero for gases.
pub fn species_settling_velocity(params: &DryDepositionParams) -> f64 {
    match params {
        DryDepositionParams::Particle { density, diameter } => settling_velocity(*density, *diameter),
        _ => 0.0,
    }
}

/// Gas quasi-laminar resistance (s/m).
pub fn gas_laminar_resistance(ustar: f64, diffusivity_ratio: f64) -> f64 {
    let diffusivity = DIFFUSIVITY_WATER_VAPOUR / diffusivity_ratio;
    let schmidt = KINEMATIC_VISCOSITY_AIR / diffusivity;
    2.0 / (KARMAN * ustar.max(MIN_USTAR)) * (schmidt / PRANDTL_AIR).powf(2.0 / 3.0)
}

/// Particle quasi-laminar resistance from Brownian diffusion and impaction (s/m).
pub fn particle_laminar_resistance(ustar: f64, density: f64, diameter: f64, temperature: f64) -> f64 {
    let ustar = ustar.max(MIN_USTAR);
    let brownian = BOLTZMANN * temperature * cunningham(diameter) / (3.0 * PI * DYNAMIC_VISCOSITY_AIR * diameter);
    let schmidt = KINEMATIC_VISCOSITY_AIR / brownian;
    let stokes = settling_velocity(density, diameter) * ustar * ustar / (GRAVITY * KINEMATIC_VISCOSITY_AIR);
    let impaction = if stokes > 0.0 { 10f64.powf(-3.0 / stokes) } else { 0.0 };
    1.0 / (ustar * (schmidt.powf(-2.0 / 3.0) + impaction))
}

/// Deposition velocity over one surface of roughness `roughness`, with
/// `class` selecting the gas surface resistance when known.
fn surface_velocity(
    params: &DryDepositionParams,
    profile: &BoundaryLayerProfile,
    roughness: f64,
    class: Option<LandUseClass>,
    options: &DryDepositionOptions,
) -> f64 {
    let ustar = profile.friction_velocity;
    let ra = || aerodynamic_resistance(options.reference_height, roughness, ustar, profile.inverse_obukhov);
    match params {
        DryDepositionParams::None => 0.0,
        DryDepositionParams::ConstantVelocity(v) => *v,
        DryDepositionParams::Gas {
            diffusivity_ratio,
            surface_resistance,
            reactivity,
        } => {
            let rb = gas_laminar_resistance(ustar, *diffusivity_ratio);
            let rc = match (class, reactivity) {
                (Some(class), Some(gas)) => gas_surface_resistance(
                    class,
                    gas,
                    *diffusivity_ratio,
                    profile.surface_temperature,
                    options.radiation,
                ),
                _ => *surface_resistance,
            };
            1.0 / (ra() + rb + rc)
        }
        DryDepositionParams::Particle { density, diameter } => {
            let ra = ra();
            let rb = particle_laminar_resistance(ustar, *density, *diameter, profile.surface_temperature);
            let vs = settling_velocity(*density, *diameter);
            vs + 1.0 / (ra + rb + ra * rb * vs)
        }
    }
}

/// Deposition velocity of a species under the local surface conditions (m/s).
pub fn deposition_velocity(
    params: &DryDepositionParams,
    profile: &BoundaryLayerProfile,
    land_use: Option<&LandUseFractions>,
    options: &DryDepositionOptions,
) -> f64 {
    match (params, land_use) {
        (DryDepositionParams::None | DryDepositionParams::ConstantVelocity(_), _) | (_, None) => {
            surface_velocity(params, profile, profile.roughness, None, options)
        }
        (_, Some(cover)) => cover
            .iter()
            .map(|(class, fraction)| {
                fraction * surface_velocity(params, profile, class.roughness(), Some(class), options)
            })
            .sum(),
    }
}

/// Fraction of a species' mass removed in `dt` at height `z`, in [0, 1].
pub fn dry_fraction(
    z: f64,
    params: &DryDepositionParams,
    profile: &BoundaryLayerProfile,
    land_use: Option<&LandUseFractions>,
    dt: f64,
    options: &DryDepositionOptions,
) -> f64 {
    if z >= options.layer_depth || matches!(params, DryDepositionParams::None) {
        return 0.0;
    }
    let vd = deposition_velocity(params, profile, land_use, options);
    if !(vd.is_finite() && vd > 0.0) {
        return 0.0;
    }
    1.0 - (-vd * dt / options.layer_depth).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn profile(ustar: f64, inverse_obukhov: f64) -> BoundaryLayerProfile {
        BoundaryLayerProfile {
            z: 5.0,
            friction_velocity: ustar,
            convective_velocity: 0.0,
            mixing_height: 800.0,
            inverse_obukhov,
            roughness: 0.1,
            coriolis: 1.0e-4,
            surface_temperature: 288.0,
            density: 1.2,
            density_log_gradient: -1.2e-4,
        }
    }

    #[test]
    fn neutral_aerodynamic_resistance_is_log_law() {
        let ra = aerodynamic_resistance(15.0, 0.1, 0.4, 0.0);
        assert_relative_eq!(ra, (150.0f64).ln() / (0.4 * 0.4), epsilon = 1e-12);
        // stable stratification resists transfer, unstable helps it
        assert!(aerodynamic_resistance(15.0, 0.1, 0.4, 0.02) > ra);
        assert!(aerodynamic_resistance(15.0, 0.1, 0.4, -0.02) < ra);
    }

    #[test]
    fn settling_grows_with_size() {
        let small = settling_velocity(2500.0, 1.0e-6);
        let large = settling_velocity(2500.0, 20.0e-6);
        assert!(small < 1.0e-4, "{small}");
        // 20 µm ash settles at about 3 cm/s
        assert!(large > 0.02 && large < 0.04, "{large}");
    }

    #[test]
    fn particle_velocity_exceeds_settling() {
        let params = DryDepositionParams::Particle {
            density: 2500.0,
            diameter: 10.0e-6,
        };
        let vd = deposition_velocity(&params, &profile(0.3, 0.0), None, &DryDepositionOptions::default());
        assert!(vd > settling_velocity(2500.0, 10.0e-6));
    }

    #[test]
    fn fraction_is_zero_above_layer_and_bounded_inside() {
        let params = DryDepositionParams::Gas {
            diffusivity_ratio: 1.9,
            surface_resistance: 100.0,
            reactivity: None,
        };
        let options = DryDepositionOptions::default();
        let p = profile(0.3, 0.0);
        assert_eq!(dry_fraction(31.0, &params, &p, None, 600.0, &options), 0.0);
        let f = dry_fraction(5.0, &params, &p, None, 600.0, &options);
        assert!(f > 0.0 && f < 1.0);
        let constant = DryDepositionParams::ConstantVelocity(0.01);
        assert_relative_eq!(
            dry_fraction(5.0, &constant, &p, None, 600.0, &options),
            1.0 - (-0.01 * 600.0 / 30.0f64).exp(),
            epsilon = 1e-15
        );
    }

    #[test]
    fn land_use_sets_gas_velocity_per_class() {
        use crate::core_types::GasReactivity;
        let so2 = DryDepositionParams::Gas {
            diffusivity_ratio: 1.9,
            surface_resistance: 500.0,
            reactivity: Some(GasReactivity {
                henry: 1.0e5,
                reactivity: 0.0,
            }),
        };
        let options = DryDepositionOptions::default();
        let p = profile(0.3, 0.0);
        let water = LandUseFractions::pure(LandUseClass::Water);
        let city = LandUseFractions::pure(LandUseClass::Urban);
        let bulk = deposition_velocity(&so2, &p, None, &options);
        let over_water = deposition_velocity(&so2, &p, Some(&water), &options);
        let over_city = deposition_velocity(&so2, &p, Some(&city), &options);
        // soluble gas: water is a near-perfect sink, far better than r_c = 500 s/m
        assert!(over_water > bulk && over_water > over_city, "{over_water} {bulk} {over_city}");

        // mixed cover is the fraction-weighted mean of the pure covers
        let half = LandUseFractions::mixed(&[(LandUseClass::Water, 0.5), (LandUseClass::Urban, 0.5)]);
        assert_relative_eq!(
            deposition_velocity(&so2, &p, Some(&half), &options),
            0.5 * (over_water + over_city),
            epsilon = 1e-12
        );

        // without reactivity only the class roughness changes the velocity
        let bulk_gas = DryDepositionParams::Gas {
            diffusivity_ratio: 1.9,
            surface_resistance: 500.0,
            reactivity: None,
        };
        let forest = LandUseFractions::pure(LandUseClass::DeciduousForest);
        let rb = gas_laminar_resistance(0.3, 1.9);
        let ra = aerodynamic_resistance(options.reference_height, 1.0, 0.3, 0.0);
        assert_relative_eq!(
            deposition_velocity(&bulk_gas, &p, Some(&forest), &options),
            1.0 / (ra + rb + 500.0),
            epsilon = 1e-12
        );
        // constant velocities ignore the cover
        let constant = DryDepositionParams::ConstantVelocity(0.004);
        assert_eq!(deposition_velocity(&constant, &p, Some(&forest), &options), 0.004);
    }
}
