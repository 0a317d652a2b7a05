//! Global mass budget over a run with every removal process active
mod common;

use approx::assert_relative_eq;
use plume_core::output::DepositionKind;
use plume_core::particles::ReleaseRegion;
use plume_core::turbulence::TurbulenceOptions;
use plume_core::{DryDepositionParams, MemoryWriter, OutputGridSpec, ReleaseGroupConfig, SpeciesProperties, TimeManager};

fn config() -> plume_core::RunConfig {
    let grid = common::base_grid(41, 1000.0);
    let mut config = common::quiet_config(grid, 3.0 * 3600.0);
    config.dt = 120.0;
    config.turbulence = TurbulenceOptions {
        density_correction: true,
        ..TurbulenceOptions::default()
    };
    config.convection.enabled = true;
    config.deposition.dry_enabled = true;
    config.deposition.wet_enabled = true;
    config.deposition.decay_enabled = true;
    config.termination.max_age = Some(2.5 * 3600.0);

    let ash = SpeciesProperties::aerosol("ash", 2500.0, 1.0e-5);
    let gas = SpeciesProperties {
        half_life: Some(4.0 * 3600.0),
        dry_deposition: DryDepositionParams::Gas {
            diffusivity_ratio: 1.9,
            surface_resistance: 100.0,
            reactivity: None,
        },
        ..SpeciesProperties::aerosol("iodine", 1.0, 1.0)
    };
    config.species = vec![ash, gas];
    config.releases = vec![ReleaseGroupConfig {
        name: "vent".into(),
        start: 0.0,
        end: 3600.0,
        region: ReleaseRegion::Box {
            x: (8000.0, 10_000.0),
            y: (8000.0, 10_000.0),
            z: (10.0, 800.0),
        },
        species_mass: vec![100.0, 50.0],
        particle_count: 2000,
    }];
    config.output_grids = vec![OutputGridSpec::new(
        "domain",
        (0.0, 0.0),
        (1000.0, 1000.0),
        (40, 40),
        vec![100.0, 500.0, 2000.0, 14_000.0],
    )];
    config
}

#[test]
fn budget_closes_with_deposition_decay_and_convection() {
    let mut tm = TimeManager::new(config(), common::steady_reader(vec![common::base_grid(41, 1000.0)], 4, common::rainy_tropics()))
        .unwrap();
    // strict mode turns any imbalance into an error
    let summary = tm.run(&mut MemoryWriter::new()).unwrap();
    assert!(summary.relative_mass_error < 1.0e-9, "{}", summary.relative_mass_error);

    let budget = &summary.budget;
    assert_relative_eq!(budget.released[0], 100.0, max_relative = 1e-12);
    assert_relative_eq!(budget.released[1], 50.0, max_relative = 1e-12);
    assert!(budget.dry[0] > 0.0 && budget.wet[0] > 0.0);
    assert!(budget.decayed[1] > 0.0);
    assert_eq!(budget.decayed[0], 0.0);
    assert!(summary.convection_events > 0);

    let airborne = tm.ensemble().airborne_mass();
    for s in 0..2 {
        assert_relative_eq!(budget.accounted(s, airborne[s]), budget.released[s], max_relative = 1e-9);
    }
}

#[test]
fn deposition_grids_receive_every_deposited_kilogram() {
    let mut tm = TimeManager::new(config(), common::steady_reader(vec![common::base_grid(41, 1000.0)], 4, common::rainy_tropics()))
        .unwrap();
    let summary = tm.run(&mut MemoryWriter::new()).unwrap();
    let grid = &tm.concentration_grids()[0];
    for s in 0..2 {
        assert_relative_eq!(grid.deposited_mass(DepositionKind::Dry, s), summary.budget.dry[s], max_relative = 1e-9);
        assert_relative_eq!(grid.deposited_mass(DepositionKind::Wet, s), summary.budget.wet[s], max_relative = 1e-9);
    }
}

#[test]
fn output_frames_hold_sampled_mass() {
    let mut config = config();
    config.output.interval = 3600.0;
    config.output.sample_interval = 3600.0;
    let mut tm = TimeManager::new(config, common::steady_reader(vec![common::base_grid(41, 1000.0)], 4, common::rainy_tropics()))
        .unwrap();
    let mut writer = MemoryWriter::new();
    tm.run(&mut writer).unwrap();
    assert_eq!(writer.frames.len(), 3);
    let last = writer.last().unwrap();
    let frame = &last.grids[0];
    assert_eq!(frame.samples, 1);
    // one sample per window: the frame integrates to the airborne mass inside the grid
    let spec = &tm.config().output_grids[0];
    let airborne = tm.ensemble().airborne_mass();
    for s in 0..2 {
        let in_grid = frame.total_mass(spec, 0, s);
        assert!(in_grid <= airborne[s] * (1.0 + 1e-9));
    }
}
