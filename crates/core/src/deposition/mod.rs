//! Mass removal: dry deposition, wet scavenging and decay
//!
//! Each process returns a fraction in [0, 1] of the remaining mass of one
//! species. [`deposit`] applies them in the order decay, wet, dry to a single
//! particle and reports the removed mass per process, so the caller can
//! credit it to the deposition grids and the mass budget.

pub mod decay;
pub mod dry;
pub mod surface;
pub mod wet;

pub use decay::decay_fraction;
pub use dry::{
    deposition_velocity, dry_fraction, settling_velocity, species_settling_velocity, DryDepositionOptions,
};
pub use surface::gas_surface_resistance;
pub use wet::{precipitating_fraction, wet_fraction, CloudPosition};

use crate::core_types::{DryDepositionParams, SpeciesProperties};
use crate::interpolation::{BoundaryLayerProfile, PrecipitationSample};
use crate::met::LandUseFractions;
use crate::particles::Particle;
use serde::{Deserialize, Serialize};

/// Switches and settings of the removal processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositionOptions {
    pub dry_enabled: bool,
    pub wet_enabled: bool,
    pub decay_enabled: bool,
    pub dry: DryDepositionOptions,
}

impl Default for DepositionOptions {
    fn default() -> Self {
        Self {
            dry_enabled: true,
            wet_enabled: true,
            decay_enabled: true,
            dry: DryDepositionOptions::default(),
        }
    }
}

impl DepositionOptions {
    /// Whether any species needs the dry deposition surface parameters.
    pub fn needs_dry(&self, species: &[SpeciesProperties]) -> bool {
        self.dry_enabled
            && species
                .iter()
                .any(|s| !matches!(s.dry_deposition, DryDepositionParams::None))
    }

    /// Whether any species needs precipitation and cloud fields.
    pub fn needs_wet(&self, species: &[SpeciesProperties]) -> bool {
        self.wet_enabled && species.iter().any(SpeciesProperties::is_wet_scavenged)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.dry.layer_depth > 0.0 && self.dry.reference_height > 0.0) {
            return Err(format!(
                "dry deposition layer depth and reference height must be positive, got {} and {}",
                self.dry.layer_depth, self.dry.reference_height
            ));
        }
        if !(self.dry.radiation.is_finite() && self.dry.radiation >= 0.0) {
            return Err(format!("global radiation must be non-negative, got {}", self.dry.radiation));
        }
        Ok(())
    }
}

/// Mass removed from one particle in one step, per species (kg).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemovedMass {
    pub dry: Vec<f64>,
    pub wet: Vec<f64>,
    pub decayed: Vec<f64>,
}

impl RemovedMass {
    pub fn zeros(species_count: usize) -> Self {
        Self {
            dry: vec![0.0; species_count],
            wet: vec![0.0; species_count],
            decayed: vec![0.0; species_count],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dry.iter().chain(&self.wet).chain(&self.decayed).all(|&m| m == 0.0)
    }

    /// Add another removal record into this one.
    pub fn merge(&mut self, other: &Self) {
        let add = |a: &mut Vec<f64>, b: &[f64]| a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
        add(&mut self.dry, &other.dry);
        add(&mut self.wet, &other.wet);
        add(&mut self.decayed, &other.decayed);
    }
}

/// Apply decay, wet and dry removal to one particle over `dt`.
///
/// `profile` and `precipitation` may be `None` when the run does not carry the
/// corresponding fields; the process is then skipped. `land_use` is the cover
/// under the particle, if the run has a land-use map.
pub fn deposit(
    particle: &mut Particle,
    species: &[SpeciesProperties],
    profile: Option<&BoundaryLayerProfile>,
    land_use: Option<&LandUseFractions>,
    precipitation: Option<&PrecipitationSample>,
    dt: f64,
    options: &DepositionOptions,
) -> RemovedMass {
    let mut removed = RemovedMass::zeros(species.len());
    let z = particle.position.z;
    for (k, props) in species.iter().enumerate() {
        if particle.mass[k] <= 0.0 {
            continue;
        }
        if options.decay_enabled {
            removed.decayed[k] = particle.remove_fraction(k, decay_fraction(props.half_life, dt));
        }
        if options.wet_enabled {
            if let (Some(params), Some(rain)) = (&props.wet_scavenging, precipitation) {
                removed.wet[k] = particle.remove_fraction(k, wet_fraction(z, rain, params, dt));
            }
        }
        if options.dry_enabled {
            if let Some(profile) = profile {
                let fraction = dry_fraction(z, &props.dry_deposition, profile, land_use, dt, &options.dry);
                removed.dry[k] = particle.remove_fraction(k, fraction);
            }
        }
    }
    removed
}
