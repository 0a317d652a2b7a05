//! Instantaneous point release in a uniform 5 m/s eastward wind, no turbulence
mod common;

use approx::assert_relative_eq;
use plume_core::simulation::PlumeStatistics;
use plume_core::{MemoryWriter, OutputGridSpec, ReleaseGroupConfig, SpeciesProperties, TimeManager, UniformAtmosphere, Vec3};

const RELEASE: (f64, f64, f64) = (5500.0, 20_500.0, 500.0);
const HOURS: f64 = 1.0;

fn run() -> (TimeManager, MemoryWriter) {
    let grid = common::base_grid(51, 1000.0);
    let mut config = common::quiet_config(grid.clone(), HOURS * 3600.0);
    config.species = vec![SpeciesProperties::passive("tracer")];
    config.releases = vec![ReleaseGroupConfig::point(
        "stack",
        0.0,
        Vec3::new(RELEASE.0, RELEASE.1, RELEASE.2),
        1000.0,
        1000,
    )];
    config.output_grids = vec![OutputGridSpec::new("plume", (0.0, 0.0), (1000.0, 1000.0), (50, 50), vec![1000.0])];
    config.output.interval = 3600.0;
    config.output.sample_interval = 3600.0;

    let atmosphere = UniformAtmosphere::default();
    assert_eq!(atmosphere.wind, Vec3::new(5.0, 0.0, 0.0));
    let mut tm = TimeManager::new(config, common::steady_reader(vec![grid], 1, atmosphere)).unwrap();
    let mut writer = MemoryWriter::new();
    tm.run(&mut writer).unwrap();
    (tm, writer)
}

#[test]
fn centroid_moves_five_metres_per_second_east() {
    let (tm, _) = run();
    let stats: Vec<PlumeStatistics> = tm.plume_statistics();
    let plume = &stats[0];
    let t = HOURS * 3600.0;
    assert_eq!(plume.particles, 1000);
    assert_relative_eq!(plume.centroid.x, RELEASE.0 + 5.0 * t, epsilon = 1e-6);
    assert_relative_eq!(plume.centroid.y, RELEASE.1, epsilon = 1e-6);
    assert_relative_eq!(plume.centroid.z, RELEASE.2, epsilon = 1e-6);
    assert!(plume.horizontal_spread < 1e-6);
    assert!(plume.vertical_spread < 1e-6);
}

#[test]
fn concentration_shows_a_compact_plume_at_the_offset() {
    let (tm, writer) = run();
    let frame = &writer.last().unwrap().grids[0];
    let spec = &tm.config().output_grids[0];
    let (ix, iy) = spec.cell_of(RELEASE.0 + 5.0 * 3600.0, RELEASE.1).unwrap();
    assert_eq!((ix, iy), (23, 20));

    let peak = frame.concentration[frame.index(0, 0, 0, ix, iy)];
    assert_relative_eq!(peak, 1000.0 / spec.cell_volume(0), max_relative = 1e-9);
    let elsewhere: f64 = frame
        .concentration
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != frame.index(0, 0, 0, ix, iy))
        .map(|(_, c)| c)
        .sum();
    assert_eq!(elsewhere, 0.0);
    assert_relative_eq!(frame.total_mass(spec, 0, 0), 1000.0, max_relative = 1e-9);
}
