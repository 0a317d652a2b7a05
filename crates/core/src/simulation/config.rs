//! Run configuration
//!
//! Everything the engine needs arrives fully resolved as plain data before
//! INIT. All structs deserialize with defaults for omitted fields, so a run
//! description only has to name what differs from the defaults.

use crate::convection::ConvectionOptions;
use crate::core_types::SpeciesProperties;
use crate::deposition::DepositionOptions;
use crate::error::{DispersionError, Result};
use crate::grid::{GridSpec, ProjectionSpec};
use crate::met::DerivedOptions;
use crate::output::{KernelBandwidth, OutputGridSpec, ReceptorSpec};
use crate::particles::{DomainFillConfig, ReleaseGroupConfig};
use crate::turbulence::TurbulenceOptions;
use serde::{Deserialize, Serialize};

/// Time integration scheme of the mean-wind displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Integrator {
    /// x₁ = x₀ + U(x₀, t₀) Δt
    Euler,
    /// Predictor-corrector: x₁ = x₀ + ½ (U(x₀, t₀) + U(x*, t₁)) Δt
    #[default]
    Petterssen,
}

/// Splitting of a step to bound the mean-wind displacement error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsteppingOptions {
    /// Largest displacement per sub-step as a fraction of the local grid spacing.
    pub max_cell_fraction: f64,
    /// Particles below this height (m AGL) use at least `near_surface_substeps`.
    pub near_surface_depth: f64,
    pub near_surface_substeps: usize,
    pub max_substeps: usize,
}

impl Default for SubsteppingOptions {
    fn default() -> Self {
        Self {
            max_cell_fraction: 0.5,
            near_surface_depth: 50.0,
            near_surface_substeps: 2,
            max_substeps: 20,
        }
    }
}

/// Output cadence and accumulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Length of an averaging window; one OUTPUT per window (s).
    pub interval: f64,
    /// Time between concentration samples inside a window (s).
    pub sample_interval: f64,
    pub bandwidth: KernelBandwidth,
    /// Upper bounds of the age classes (s); empty for a single class.
    pub age_classes: Vec<f64>,
    /// Half-width of the receptor tent (m).
    pub receptor_half_width: f64,
    /// Depth of the layer receptors sample (m).
    pub receptor_layer_depth: f64,
    /// Accumulate gross mass fluxes through output-cell faces.
    pub fluxes: bool,
    /// Dump every active particle with each output frame.
    pub particle_dump: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            interval: 3600.0,
            sample_interval: 900.0,
            bandwidth: KernelBandwidth::default(),
            age_classes: Vec::new(),
            receptor_half_width: 1000.0,
            receptor_layer_depth: 50.0,
            fluxes: false,
            particle_dump: false,
        }
    }
}

/// When particles stop being tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationOptions {
    /// Largest tracked age (s); `None` keeps particles forever.
    pub max_age: Option<f64>,
    /// Retire particles whose mass fell below this fraction of the initial mass.
    pub negligible_mass_fraction: f64,
}

impl Default for TerminationOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            negligible_mass_fraction: 1.0e-6,
        }
    }
}

/// Meteorological domain: grids (base first, then nests) and projection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub grids: Vec<GridSpec>,
    pub projection: ProjectionSpec,
}

/// Fully resolved run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Simulation start and end (s).
    pub start: f64,
    pub end: f64,
    /// Time step (s).
    pub dt: f64,
    /// Seed of every random stream in the run.
    pub seed: u64,
    pub integrator: Integrator,
    pub substepping: SubsteppingOptions,
    pub turbulence: TurbulenceOptions,
    pub convection: ConvectionOptions,
    pub deposition: DepositionOptions,
    pub derived: DerivedOptions,
    pub output: OutputOptions,
    pub termination: TerminationOptions,
    /// Largest relative mass-budget error tolerated.
    pub mass_tolerance: f64,
    /// Treat a mass imbalance as a run-fatal error instead of a warning.
    pub strict_mass_balance: bool,
    pub domain: DomainConfig,
    pub species: Vec<SpeciesProperties>,
    pub releases: Vec<ReleaseGroupConfig>,
    /// Fill the domain with air-mass particles instead of, or alongside, the releases.
    pub domain_fill: Option<DomainFillConfig>,
    pub output_grids: Vec<OutputGridSpec>,
    pub receptors: Vec<ReceptorSpec>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 3600.0,
            dt: 60.0,
            seed: 1,
            integrator: Integrator::default(),
            substepping: SubsteppingOptions::default(),
            turbulence: TurbulenceOptions::default(),
            convection: ConvectionOptions::default(),
            deposition: DepositionOptions::default(),
            derived: DerivedOptions::default(),
            output: OutputOptions::default(),
            termination: TerminationOptions::default(),
            mass_tolerance: 1.0e-6,
            strict_mass_balance: false,
            domain: DomainConfig::default(),
            species: Vec::new(),
            releases: Vec::new(),
            domain_fill: None,
            output_grids: Vec::new(),
            receptors: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(DispersionError::invalid_config(msg));
        if !(self.start.is_finite() && self.end.is_finite() && self.end > self.start) {
            return fail(format!("run window [{}, {}] is empty", self.start, self.end));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return fail(format!("time step must be positive, got {}", self.dt));
        }
        if self.domain.grids.is_empty() {
            return fail("no meteorological grids configured".into());
        }
        if self.species.is_empty() {
            return fail("species table is empty".into());
        }
        for species in &self.species {
            species.validate().map_err(DispersionError::invalid_config)?;
        }
        for release in &self.releases {
            release.validate(self.species.len())?;
        }
        if let Some(fill) = &self.domain_fill {
            fill.validate(self.species.len(), self.domain.grids[0].vertical.top_height(0.0))?;
        }
        for grid in &self.output_grids {
            grid.validate().map_err(DispersionError::invalid_config)?;
        }
        let output = &self.output;
        if !(output.interval > 0.0 && output.sample_interval > 0.0 && output.sample_interval <= output.interval) {
            return fail(format!(
                "output interval {} and sample interval {} must be positive with sample ≤ output",
                output.interval, output.sample_interval
            ));
        }
        if output.age_classes.windows(2).any(|w| w[1] <= w[0]) || output.age_classes.iter().any(|&a| a <= 0.0) {
            return fail("age classes must be positive and strictly increasing".into());
        }
        if !(output.receptor_half_width > 0.0 && output.receptor_layer_depth > 0.0) {
            return fail("receptor half-width and layer depth must be positive".into());
        }
        output.bandwidth.validate().map_err(DispersionError::invalid_config)?;
        self.turbulence.validate().map_err(DispersionError::invalid_config)?;
        if self.convection.enabled {
            self.convection.validate().map_err(DispersionError::invalid_config)?;
        }
        self.deposition.validate().map_err(DispersionError::invalid_config)?;
        if let Some(map) = &self.derived.land_use {
            map.validate().map_err(DispersionError::invalid_config)?;
        }
        let sub = &self.substepping;
        if sub.max_cell_fraction.is_nan() || sub.max_cell_fraction <= 0.0 || sub.max_substeps == 0 || sub.near_surface_substeps > sub.max_substeps {
            return fail("sub-stepping needs a positive cell fraction and 1 ≤ near-surface ≤ max sub-steps".into());
        }
        if self.mass_tolerance.is_nan() || self.mass_tolerance <= 0.0 {
            return fail(format!("mass tolerance must be positive, got {}", self.mass_tolerance));
        }
        let term = &self.termination;
        if term.max_age.is_some_and(|a| a <= 0.0) || !(0.0..1.0).contains(&term.negligible_mass_fraction) {
            return fail("termination thresholds out of range".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Vec3;

    fn valid() -> RunConfig {
        RunConfig {
            domain: DomainConfig {
                grids: vec![GridSpec::new("base", (0.0, 0.0), (1000.0, 1000.0), (10, 10), vec![10.0, 500.0])],
                projection: ProjectionSpec::default(),
            },
            species: vec![SpeciesProperties::passive("tracer")],
            releases: vec![ReleaseGroupConfig::point("stack", 0.0, Vec3::new(500.0, 500.0, 50.0), 1.0, 10)],
            ..RunConfig::default()
        }
    }

    #[test]
    fn defaults_with_domain_are_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_bad_windows_and_steps() {
        let mut c = valid();
        c.end = c.start;
        assert!(matches!(c.validate(), Err(DispersionError::InvalidConfig(_))));
        let mut c = valid();
        c.dt = 0.0;
        assert!(c.validate().is_err());
        let mut c = valid();
        c.output.sample_interval = 2.0 * c.output.interval;
        assert!(c.validate().is_err());
        let mut c = valid();
        c.species.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn validates_land_use_and_domain_fill() {
        use crate::met::{LandUseClass, LandUseFractions, LandUseMap};
        let mut c = valid();
        c.derived.land_use = Some(LandUseMap::uniform(LandUseFractions::pure(LandUseClass::Water)));
        assert!(c.validate().is_ok());
        c.derived.land_use = Some(LandUseMap::uniform(LandUseFractions::mixed(&[(LandUseClass::Water, 0.4)])));
        assert!(c.validate().is_err());

        let mut c = valid();
        c.domain_fill = Some(DomainFillConfig {
            top: 400.0,
            mixing_ratio: vec![1.0e-9],
            ..DomainFillConfig::default()
        });
        assert!(c.validate().is_ok());
        // above the 500 m model top
        c.domain_fill = Some(DomainFillConfig {
            top: 800.0,
            mixing_ratio: vec![1.0e-9],
            ..DomainFillConfig::default()
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_release_with_wrong_species_count() {
        let mut c = valid();
        c.species.push(SpeciesProperties::passive("second"));
        assert!(c.validate().is_err());
    }
}
