//! Sampling across the edge of a nested grid
mod common;

use plume_core::grid::PlaneProjection;
use plume_core::interpolation::FieldInterpolator;
use plume_core::met::{field_from_fn, DerivedOptions, FieldId, FieldRequirements, FieldStore};
use plume_core::{GridHierarchy, GridId, GridSpec, MetError, SyntheticReader, UniformAtmosphere, Vec3};
use std::sync::Arc;

const AMPLITUDE: f64 = 10.0;
const WAVELENGTH: f64 = 3000.0;

/// Smooth analytic wind shared by both grids.
fn wave(x: f64, y: f64, z: f64) -> f64 {
    AMPLITUDE * (x / WAVELENGTH).sin() * (y / WAVELENGTH).cos() + z / 1000.0
}

fn grids() -> Vec<GridSpec> {
    let base = common::base_grid(21, 1000.0);
    let nest = GridSpec::new("nest", (5000.0, 5000.0), (250.0, 250.0), (17, 17), common::levels()).nested_in(GridId::BASE);
    vec![base, nest]
}

fn store() -> (GridHierarchy, FieldStore) {
    let hierarchy = GridHierarchy::new(grids(), Arc::new(PlaneProjection::new(10.0, 50.0))).unwrap();
    let mut reader = SyntheticReader::new(grids(), vec![0.0, 3600.0], |grid, spec, time| {
        let mut snapshot = UniformAtmosphere::default().snapshot(grid, spec, time)?;
        snapshot
            .insert(FieldId::U, field_from_fn(spec, FieldId::U, None, wave))
            .map_err(|e| MetError::IoFailure(e.to_string()))?;
        Ok(snapshot)
    });
    let store = FieldStore::load(
        &hierarchy,
        &mut reader,
        0.0,
        FieldRequirements::transport(),
        DerivedOptions::default(),
    )
    .unwrap();
    (hierarchy, store)
}

#[test]
fn point_on_the_edge_uses_the_nest() {
    let (hierarchy, store) = store();
    let interp = FieldInterpolator::new(&hierarchy, &store);
    for p in [Vec3::new(5000.0, 6300.0, 120.0), Vec3::new(6100.0, 5000.0, 120.0), Vec3::new(9000.0, 9000.0, 120.0)] {
        assert_eq!(interp.locate(&p).unwrap().grid, GridId(1), "{p:?}");
    }
    assert_eq!(interp.locate(&Vec3::new(4999.0, 6300.0, 120.0)).unwrap().grid, GridId::BASE);
}

#[test]
fn values_are_continuous_across_the_edge() {
    let (hierarchy, store) = store();
    let interp = FieldInterpolator::new(&hierarchy, &store);
    // bilinear error bound of the coarse grid for this wave
    let bound = 2.0 * AMPLITUDE * (1000.0f64 / WAVELENGTH).powi(2) / 8.0;
    let eps = 1.0e-6;
    for k in 0..=40 {
        let y = 5000.0 + 100.0 * f64::from(k);
        for z in [10.0, 250.0, 900.0] {
            let inside = interp.sample(&Vec3::new(5000.0, y, z), 0.0, FieldId::U).unwrap().value;
            let outside = interp.sample(&Vec3::new(5000.0 - eps, y, z), 0.0, FieldId::U).unwrap().value;
            assert!((inside - outside).abs() <= bound, "jump {} at y={y}, z={z}", inside - outside);
            let exact = wave(5000.0, y, z);
            assert!((inside - exact).abs() <= bound / 4.0 + 1e-9);
        }
    }
}
