//! Shared fixtures for the integration tests
#![allow(dead_code)]

use plume_core::simulation::DomainConfig;
use plume_core::turbulence::TurbulenceOptions;
use plume_core::{GridSpec, MetReader, RunConfig, SyntheticReader, UniformAtmosphere};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Met levels (m AGL) dense near the ground, reaching 14 km.
pub fn levels() -> Vec<f64> {
    vec![
        0.0, 50.0, 150.0, 300.0, 500.0, 800.0, 1200.0, 1700.0, 2300.0, 3000.0, 4000.0, 5000.0, 6500.0, 8000.0,
        10_000.0, 12_000.0, 14_000.0,
    ]
}

/// Square base grid of `n` points per side at `spacing` metres.
pub fn base_grid(n: usize, spacing: f64) -> GridSpec {
    GridSpec::new("base", (0.0, 0.0), (spacing, spacing), (n, n), levels())
}

/// Reader serving a steady atmosphere hourly over `hours`.
pub fn steady_reader(grids: Vec<GridSpec>, hours: u32, atmosphere: UniformAtmosphere) -> Box<dyn MetReader> {
    let times = (0..=hours).map(|h| 3600.0 * f64::from(h)).collect();
    Box::new(SyntheticReader::uniform(grids, times, atmosphere))
}

/// Run configuration on one base grid with every optional process off.
pub fn quiet_config(grid: GridSpec, end: f64) -> RunConfig {
    let mut config = RunConfig {
        end,
        turbulence: TurbulenceOptions::disabled(),
        domain: DomainConfig {
            grids: vec![grid],
            ..DomainConfig::default()
        },
        strict_mass_balance: true,
        ..RunConfig::default()
    };
    config.convection.enabled = false;
    config.deposition.dry_enabled = false;
    config.deposition.wet_enabled = false;
    config.deposition.decay_enabled = false;
    config
}

/// Moist, unstable tropical atmosphere with steady rain.
pub fn rainy_tropics() -> UniformAtmosphere {
    UniformAtmosphere {
        wind: plume_core::Vec3::new(2.0, 1.0, 0.0),
        surface_temperature: 302.0,
        relative_humidity: 0.85,
        heat_flux: 200.0,
        friction_velocity: Some(0.4),
        mixing_height: Some(1200.0),
        large_scale_precipitation: 2.0,
        convective_precipitation: 1.0,
        ..UniformAtmosphere::default()
    }
}
