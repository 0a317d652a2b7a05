//! Markov-chain update of the turbulent velocity
//!
//! Each component follows a first-order autoregressive process
//!
//! ```text
//! u'(t+Δt) = r u'(t) + sqrt(1 − r²) σ ξ,        r = exp(−Δt/τ)
//! ```
//!
//! The vertical component adds the drift correction of Thomson (1987) for
//! Gaussian inhomogeneous turbulence and is sub-stepped with Δt ≤ 0.2 τw,
//! reflecting at the ground and at the mixing height:
//!
//! ```text
//! a = ½ ∂σw²/∂z (1 + w'²/σw²) + σw² ∂lnρ/∂z
//! ```
//!
//! Above the mixing height the displacement is a random walk with constant
//! diffusivities, u' = sqrt(2K/Δt) ξ.
//!
//! # References
//!
//! - Thomson, D.J. (1987). "Criteria for the selection of stochastic models of
//!   particle trajectories in turbulent flows." J. Fluid Mech., 180, 529-556.
//! - Legg, B.J. & Raupach, M.R. (1982). "Markov-chain simulation of particle
//!   dispersion in inhomogeneous flows." Boundary-Layer Meteorology, 24, 3-13.

use super::{boundary_layer_stats, Regime, TurbulenceStats};
use crate::core_types::Vec3;
use crate::interpolation::BoundaryLayerProfile;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Switches and constants of the turbulence scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurbulenceOptions {
    /// Disable to advect with the mean wind only.
    pub enabled: bool,
    /// Horizontal diffusivity above the mixing height (m²/s).
    pub free_horizontal_diffusivity: f64,
    /// Vertical diffusivity above the mixing height (m²/s).
    pub free_vertical_diffusivity: f64,
    /// Largest vertical sub-step as a fraction of τw.
    pub substep_fraction: f64,
    /// Upper bound on vertical sub-steps per step.
    pub max_substeps: usize,
    /// Include the σw² ∂lnρ/∂z term of the drift.
    pub density_correction: bool,
}

impl Default for TurbulenceOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            free_horizontal_diffusivity: 50.0,
            free_vertical_diffusivity: 0.1,
            substep_fraction: 0.2,
            max_substeps: 200,
            density_correction: true,
        }
    }
}

impl TurbulenceOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.free_horizontal_diffusivity < 0.0 || self.free_vertical_diffusivity < 0.0 {
            return Err("free-troposphere diffusivities must be non-negative".into());
        }
        if !(self.substep_fraction > 0.0 && self.substep_fraction <= 1.0) {
            return Err(format!(
                "turbulence sub-step fraction must lie in (0, 1], got {}",
                self.substep_fraction
            ));
        }
        if self.max_substeps == 0 {
            return Err("turbulence needs at least one sub-step".into());
        }
        Ok(())
    }
}

/// Result of one turbulence update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurbulenceUpdate {
    /// Turbulent velocity at the end of the step (m/s).
    pub velocity: Vec3,
    /// Net turbulent vertical displacement over the step, reflections
    /// included (m).
    pub vertical_displacement: f64,
    pub regime: Regime,
}

#[inline]
fn gauss<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.sample(StandardNormal)
}

/// One AR(1) step of a single component.
#[inline]
fn autoregressive<R: Rng + ?Sized>(value: f64, sigma: f64, tau: f64, dt: f64, rng: &mut R) -> f64 {
    let r = (-dt / tau).exp();
    r * value + (1.0 - r * r).max(0.0).sqrt() * sigma * gauss(rng)
}

/// Turbulence statistics at height `z` for a given profile.
pub fn stats_at(z: f64, profile: &BoundaryLayerProfile) -> TurbulenceStats {
    let regime = Regime::classify(z, profile);
    boundary_layer_stats(z, regime, profile)
}

/// Initial turbulent velocity of a fresh particle, drawn from N(0, σ²).
pub fn initial_velocity<R: Rng + ?Sized>(
    z: f64,
    profile: &BoundaryLayerProfile,
    options: &TurbulenceOptions,
    rng: &mut R,
) -> Vec3 {
    if !options.enabled || Regime::classify(z, profile) == Regime::FreeTroposphere {
        return Vec3::zeros();
    }
    let stats = stats_at(z, profile);
    Vec3::new(
        stats.sigma.x * gauss(rng),
        stats.sigma.y * gauss(rng),
        stats.sigma.z * gauss(rng),
    )
}

/// Advance the turbulent velocity of a particle at height `z` over `dt`.
pub fn perturb<R: Rng + ?Sized>(
    velocity: Vec3,
    z: f64,
    profile: &BoundaryLayerProfile,
    dt: f64,
    options: &TurbulenceOptions,
    rng: &mut R,
) -> TurbulenceUpdate {
    let regime = Regime::classify(z, profile);
    if !options.enabled || dt <= 0.0 {
        return TurbulenceUpdate {
            velocity: Vec3::zeros(),
            vertical_displacement: 0.0,
            regime,
        };
    }
    if regime == Regime::FreeTroposphere {
        return free_troposphere(dt, options, rng);
    }

    let stats = boundary_layer_stats(z, regime, profile);
    let u = autoregressive(velocity.x, stats.sigma.x, stats.tau.x, dt, rng);
    let v = autoregressive(velocity.y, stats.sigma.y, stats.tau.y, dt, rng);
    let (w, z_end) = vertical_walk(velocity.z, z, profile, dt, options, rng);
    TurbulenceUpdate {
        velocity: Vec3::new(u, v, w),
        vertical_displacement: z_end - z,
        regime,
    }
}

fn free_troposphere<R: Rng + ?Sized>(dt: f64, options: &TurbulenceOptions, rng: &mut R) -> TurbulenceUpdate {
    let horizontal = (2.0 * options.free_horizontal_diffusivity / dt).sqrt();
    let vertical = (2.0 * options.free_vertical_diffusivity / dt).sqrt();
    let w = vertical * gauss(rng);
    TurbulenceUpdate {
        velocity: Vec3::new(horizontal * gauss(rng), horizontal * gauss(rng), w),
        vertical_displacement: w * dt,
        regime: Regime::FreeTroposphere,
    }
}

/// Sub-stepped vertical Langevin walk with reflection inside the mixed layer.
///
/// Returns the final vertical velocity and height.
fn vertical_walk<R: Rng + ?Sized>(
    mut w: f64,
    mut z: f64,
    profile: &BoundaryLayerProfile,
    dt: f64,
    options: &TurbulenceOptions,
    rng: &mut R,
) -> (f64, f64) {
    let h = profile.mixing_height;
    let min_step = dt / options.max_substeps as f64;
    let mut remaining = dt;
    while remaining > 0.0 {
        let regime = match Regime::classify(z, profile) {
            // reflected exactly onto h: treat as top of the mixed layer
            Regime::FreeTroposphere => Regime::classify(z.min(h * (1.0 - 1e-9)), profile),
            r => r,
        };
        let stats = boundary_layer_stats(z, regime, profile);
        let sigw = stats.sigma.z;
        let tau = stats.tau.z;
        let step = (options.substep_fraction * tau).max(min_step).min(remaining);

        let mut drift = 0.5 * stats.dsigw2_dz() * (1.0 + w * w / (sigw * sigw));
        if options.density_correction {
            drift += sigw * sigw * profile.density_log_gradient;
        }
        w = autoregressive(w, sigw, tau, step, rng) + drift * step;
        z += w * step;

        if z < 0.0 {
            z = -z;
            w = -w;
        }
        if z > h {
            z = 2.0 * h - z;
            w = -w;
        }
        // displacement larger than the layer depth: clamp inside
        z = z.clamp(0.0, h);
        remaining -= step;
    }
    (w, z)
}
