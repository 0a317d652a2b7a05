//! Per-species physical constants
//!
//! Species tables are supplied by the configuration collaborator and are
//! read-only to the engine. Each particle carries one mass entry per species,
//! indexed by the species' position in the table.

use serde::{Deserialize, Serialize};

/// Index of a species in the run's species table.
pub type SpeciesIndex = usize;

/// Dry deposition parameterisation for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DryDepositionParams {
    /// No dry removal.
    None,
    /// Prescribed deposition velocity (m/s).
    ConstantVelocity(f64),
    /// Gas: resistance network. The surface resistance comes from the
    /// land-use classes when `reactivity` is given and the run has land use,
    /// otherwise it is the bulk `surface_resistance`.
    Gas {
        /// Ratio D(H₂O) / D(species) of molecular diffusivities.
        diffusivity_ratio: f64,
        /// Bulk surface (canopy) resistance r_c (s/m).
        surface_resistance: f64,
        #[serde(default)]
        reactivity: Option<GasReactivity>,
    },
    /// Aerosol particle: gravitational settling plus Brownian/impaction transfer.
    Particle {
        /// Particle density (kg/m³).
        density: f64,
        /// Particle diameter (m).
        diameter: f64,
    },
}

/// Solubility and reactivity of a gas, for the land-use surface resistance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasReactivity {
    /// Effective Henry's law constant H* (M/atm).
    pub henry: f64,
    /// Reactivity factor f₀ (0 inert, 1 like ozone).
    pub reactivity: f64,
}

/// Wet scavenging coefficients.
///
/// Below-cloud scavenging follows Λ = A·Pᴮ with P in mm/h, in-cloud scavenging
/// uses a scavenging ratio S_i applied to the precipitation flux through the
/// cloud depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WetScavengingParams {
    /// Below-cloud coefficient A (1/s at 1 mm/h).
    pub below_cloud_a: f64,
    /// Below-cloud exponent B.
    pub below_cloud_b: f64,
    /// In-cloud scavenging ratio S_i (dimensionless).
    pub in_cloud_ratio: f64,
}

impl Default for WetScavengingParams {
    fn default() -> Self {
        // Typical accumulation-mode aerosol values
        Self {
            below_cloud_a: 1.0e-4,
            below_cloud_b: 0.8,
            in_cloud_ratio: 2.0e5,
        }
    }
}

/// Immutable physical description of a tracer species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesProperties {
    pub name: String,
    /// Decay half-life (s); `None` for a stable tracer.
    pub half_life: Option<f64>,
    pub dry_deposition: DryDepositionParams,
    /// `None` disables wet removal for this species.
    pub wet_scavenging: Option<WetScavengingParams>,
    /// Molecular weight (g/mol), carried for output conversion.
    pub molecular_weight: f64,
}

impl SpeciesProperties {
    /// Passive tracer: no decay, no deposition.
    pub fn passive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            half_life: None,
            dry_deposition: DryDepositionParams::None,
            wet_scavenging: None,
            molecular_weight: 29.0,
        }
    }

    /// Fine aerosol with settling and default scavenging coefficients.
    pub fn aerosol(name: impl Into<String>, density: f64, diameter: f64) -> Self {
        Self {
            name: name.into(),
            half_life: None,
            dry_deposition: DryDepositionParams::Particle { density, diameter },
            wet_scavenging: Some(WetScavengingParams::default()),
            molecular_weight: 29.0,
        }
    }

    /// Whether any wet scavenging is configured.
    pub fn is_wet_scavenged(&self) -> bool {
        self.wet_scavenging.is_some()
    }

    /// Whether this species falls under gravity.
    pub fn is_particulate(&self) -> bool {
        matches!(self.dry_deposition, DryDepositionParams::Particle { .. })
    }

    /// Check that the constants are physically meaningful.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(t) = self.half_life {
            if !(t.is_finite() && t > 0.0) {
                return Err(format!("species '{}': half-life must be positive, got {t}", self.name));
            }
        }
        match &self.dry_deposition {
            DryDepositionParams::None => {}
            DryDepositionParams::ConstantVelocity(v) => {
                if !(v.is_finite() && *v >= 0.0) {
                    return Err(format!("species '{}': deposition velocity {v} invalid", self.name));
                }
            }
            DryDepositionParams::Gas {
                diffusivity_ratio,
                surface_resistance,
                reactivity,
            } => {
                let bad_reactivity = reactivity.is_some_and(|r| !(r.henry >= 0.0 && r.reactivity >= 0.0));
                if *diffusivity_ratio <= 0.0 || *surface_resistance < 0.0 || bad_reactivity {
                    return Err(format!("species '{}': gas deposition parameters invalid", self.name));
                }
            }
            DryDepositionParams::Particle { density, diameter } => {
                if *density <= 0.0 || *diameter <= 0.0 {
                    return Err(format!(
                        "species '{}': particle density and diameter must be positive",
                        self.name
                    ));
                }
            }
        }
        if let Some(wet) = &self.wet_scavenging {
            if wet.below_cloud_a < 0.0 || wet.in_cloud_ratio < 0.0 {
                return Err(format!("species '{}': negative scavenging coefficient", self.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_classify_species() {
        let tracer = SpeciesProperties::passive("SF6");
        assert!(!tracer.is_particulate());
        assert!(!tracer.is_wet_scavenged());
        assert!(tracer.validate().is_ok());

        let ash = SpeciesProperties::aerosol("ash", 2500.0, 10.0e-6);
        assert!(ash.is_particulate());
        assert!(ash.is_wet_scavenged());
        assert!(ash.validate().is_ok());
    }

    #[test]
    fn rejects_negative_gas_reactivity() {
        let mut s = SpeciesProperties::passive("O3");
        s.dry_deposition = DryDepositionParams::Gas {
            diffusivity_ratio: 1.6,
            surface_resistance: 100.0,
            reactivity: Some(GasReactivity {
                henry: 0.01,
                reactivity: 1.0,
            }),
        };
        assert!(s.validate().is_ok());
        s.dry_deposition = DryDepositionParams::Gas {
            diffusivity_ratio: 1.6,
            surface_resistance: 100.0,
            reactivity: Some(GasReactivity {
                henry: -1.0,
                reactivity: 1.0,
            }),
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_negative_half_life() {
        let mut s = SpeciesProperties::passive("Cs-137");
        s.half_life = Some(-1.0);
        assert!(s.validate().is_err());
    }
}
