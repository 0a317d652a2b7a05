//! Convective redistribution of particles within met-grid columns
//!
//! Every `interval` seconds each column holding particles is diagnosed with a
//! bulk mass-flux scheme on the time-interpolated sounding. Convective columns
//! move their particles between layers according to a column-stochastic
//! matrix; the horizontal position and mass of a particle never change, so
//! particle count and per-species mass in every column are conserved exactly.
//!
//! Columns are independent and processed in parallel. Each column event draws
//! from its own stream seeded by (run seed, step, grid, column), so results do
//! not depend on the thread count.

pub mod mass_flux;
pub mod parcel;
pub mod redistribute;

pub use mass_flux::{ConvectionOptions, MassFluxProfile};
pub use parcel::{lift_parcel, ParcelAscent, Sounding};
pub use redistribute::{redistribute_column, ColumnLayers, RedistributionMatrix};

use crate::error::Result;
use crate::grid::{GridHierarchy, GridId};
use crate::met::derived::ColumnProfile;
use crate::met::{FieldId, FieldStore};
use crate::particles::ParticleEnsemble;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Column of a met grid: (grid, ix, iy).
type ColumnKey = (usize, usize, usize);

/// Outcome of one redistribution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvectionSummary {
    /// Columns that held at least one active particle.
    pub columns_examined: usize,
    /// Columns diagnosed as convective.
    pub active_columns: usize,
    /// Particles that changed layer.
    pub particles_moved: usize,
}

/// Drives redistribution events at the configured cadence.
#[derive(Debug, Clone)]
pub struct ConvectiveRedistributor {
    options: ConvectionOptions,
    seed: u64,
    next_event: Option<f64>,
    events: u64,
}

impl ConvectiveRedistributor {
    pub fn new(options: ConvectionOptions, seed: u64) -> Self {
        Self {
            options,
            seed,
            next_event: None,
            events: 0,
        }
    }

    pub fn options(&self) -> &ConvectionOptions {
        &self.options
    }

    /// Events run so far.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Whether an event is due at `time`. The first call after INIT is
    /// always due when convection is enabled.
    pub fn is_due(&self, time: f64) -> bool {
        self.options.enabled && self.next_event.is_none_or(|next| time >= next - 1e-9)
    }

    /// Run one event at `time` if due. `step` identifies the time step and
    /// feeds the per-column random streams.
    pub fn maybe_run(
        &mut self,
        ensemble: &mut ParticleEnsemble,
        hierarchy: &GridHierarchy,
        store: &FieldStore,
        time: f64,
        step: u64,
    ) -> Result<Option<ConvectionSummary>> {
        if !self.is_due(time) {
            return Ok(None);
        }
        let summary = self.run(ensemble, hierarchy, store, time, step)?;
        self.next_event = Some(time + self.options.interval);
        Ok(Some(summary))
    }

    /// Redistribute every convective column once, covering `interval` seconds.
    pub fn run(
        &mut self,
        ensemble: &mut ParticleEnsemble,
        hierarchy: &GridHierarchy,
        store: &FieldStore,
        time: f64,
        step: u64,
    ) -> Result<ConvectionSummary> {
        let mut columns: FxHashMap<ColumnKey, Vec<(usize, f64)>> = FxHashMap::default();
        for (index, particle) in ensemble.particles().iter().enumerate() {
            if !particle.is_active() {
                continue;
            }
            let p = particle.position;
            let Some(grid) = hierarchy.containing(p.x, p.y) else {
                continue;
            };
            let (ix, iy) = hierarchy.get(grid).nearest_column(p.x, p.y);
            columns.entry((grid.index(), ix, iy)).or_default().push((index, p.z));
        }
        let mut keys: Vec<ColumnKey> = columns.keys().copied().collect();
        keys.sort_unstable();

        let options = &self.options;
        let seed = self.seed;
        let outcomes: Vec<Option<Vec<(usize, f64)>>> = keys
            .par_iter()
            .map(|key| {
                let members = columns.get(key).map_or(&[][..], Vec::as_slice);
                column_event(hierarchy, store, *key, members, time, options, event_seed(seed, step, *key))
            })
            .collect::<Result<_>>()?;

        let mut summary = ConvectionSummary {
            columns_examined: keys.len(),
            ..ConvectionSummary::default()
        };
        let particles = ensemble.particles_mut();
        for moves in outcomes.into_iter().flatten() {
            summary.active_columns += 1;
            summary.particles_moved += moves.len();
            for (index, z) in moves {
                let particle = &mut particles[index];
                particle.position.z = z;
                // turbulence memory does not survive a convective jump
                particle.fresh = true;
            }
        }
        self.events += 1;
        info!(
            "Convection at t={}s: {} of {} columns active, {} particles moved",
            time, summary.active_columns, summary.columns_examined, summary.particles_moved
        );
        Ok(summary)
    }
}

/// Mix run seed, step and column into one stream seed (splitmix64 finaliser).
fn event_seed(seed: u64, step: u64, key: ColumnKey) -> u64 {
    let mut h = seed ^ step.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for v in [key.0, key.1, key.2] {
        h = (h ^ v as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 31;
        h = h.wrapping_mul(0x94D0_49BB_1331_11EB);
        h ^= h >> 29;
    }
    h
}

/// Time-interpolated sounding and convective velocity of one column.
pub fn column_sounding(
    hierarchy: &GridHierarchy,
    store: &FieldStore,
    grid: GridId,
    ix: usize,
    iy: usize,
    time: f64,
) -> Result<(Sounding, f64)> {
    let spec = hierarchy.get(grid);
    let (earlier, later) = store.bracket(grid);
    let w = store.time_weight(grid, time);
    let a = Sounding::from_profile(&ColumnProfile::extract(earlier, spec, ix, iy)?);
    let b = Sounding::from_profile(&ColumnProfile::extract(later, spec, ix, iy)?);
    let w_star = (1.0 - w) * earlier.surface_or(FieldId::ConvectiveVelocity, ix, iy, 0.0)
        + w * later.surface_or(FieldId::ConvectiveVelocity, ix, iy, 0.0);
    Ok((a.blend(&b, w), w_star))
}

/// Moves for one column, or `None` when the column is not convective.
fn column_event(
    hierarchy: &GridHierarchy,
    store: &FieldStore,
    key: ColumnKey,
    members: &[(usize, f64)],
    time: f64,
    options: &ConvectionOptions,
    seed: u64,
) -> Result<Option<Vec<(usize, f64)>>> {
    let (sounding, w_star) = column_sounding(hierarchy, store, GridId(key.0), key.1, key.2, time)?;
    if sounding.len() < 2 {
        return Ok(None);
    }
    let Some(profile) = MassFluxProfile::diagnose(&sounding, w_star, options) else {
        return Ok(None);
    };
    let layers = ColumnLayers::from_levels(&sounding.heights);
    let densities: Vec<f64> = (0..sounding.len()).map(|k| sounding.density(k)).collect();
    let air_mass: Vec<f64> = (0..layers.len())
        .map(|k| sounding.interpolate(&densities, layers.midpoint(k)) * layers.thickness(k))
        .collect();
    let matrix = RedistributionMatrix::build(&layers, &air_mass, &profile, options.interval, options.max_outflow);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let moves = redistribute_column(members, &layers, &matrix, &mut rng);
    debug!(
        "Column {:?}: base {:.0} m, top {:.0} m, M_b {:.3e}, {} of {} particles moved",
        key,
        profile.cloud_base,
        profile.cloud_top,
        profile.base_mass_flux,
        moves.len(),
        members.len()
    );
    Ok(Some(moves))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Vec3;
    use crate::grid::{GridSpec, PlaneProjection};
    use crate::met::{DerivedOptions, FieldRequirements, SyntheticReader, UniformAtmosphere};
    use std::sync::Arc;

    fn setup(atmosphere: UniformAtmosphere) -> (GridHierarchy, FieldStore) {
        let levels: Vec<f64> = (0..30u32).map(|k| 10.0 + 500.0 * f64::from(k)).collect();
        let spec = GridSpec::new("base", (0.0, 0.0), (10_000.0, 10_000.0), (4, 4), levels);
        let hierarchy =
            GridHierarchy::new(vec![spec.clone()], Arc::new(PlaneProjection::new(0.0, 10.0))).unwrap();
        let mut reader = SyntheticReader::uniform(vec![spec], vec![0.0, 3600.0], atmosphere);
        let store = FieldStore::load(
            &hierarchy,
            &mut reader,
            0.0,
            FieldRequirements::transport().with_convection(),
            DerivedOptions::default(),
        )
        .unwrap();
        (hierarchy, store)
    }

    fn tropical() -> UniformAtmosphere {
        UniformAtmosphere {
            surface_temperature: 302.0,
            relative_humidity: 0.85,
            heat_flux: 200.0,
            ..UniformAtmosphere::calm()
        }
    }

    fn ensemble() -> ParticleEnsemble {
        let mut ensemble = ParticleEnsemble::new(2, 17);
        for i in 0..600u32 {
            let x = 5000.0 + 10_000.0 * f64::from(i % 3);
            let z = 20.0 + f64::from(i % 60) * 15.0;
            ensemble.spawn(Vec3::new(x, 5000.0, z), vec![1.0, 0.5], 0);
        }
        ensemble
    }

    fn column_counts(ensemble: &ParticleEnsemble, hierarchy: &GridHierarchy) -> FxHashMap<(usize, usize), (usize, f64)> {
        let mut counts: FxHashMap<(usize, usize), (usize, f64)> = FxHashMap::default();
        for p in ensemble.particles() {
            let key = hierarchy.base().nearest_column(p.position.x, p.position.y);
            let entry = counts.entry(key).or_default();
            entry.0 += 1;
            entry.1 += p.total_mass();
        }
        counts
    }

    #[test]
    fn convective_columns_conserve_count_and_mass() {
        let (hierarchy, store) = setup(tropical());
        let mut ensemble = ensemble();
        let before = column_counts(&ensemble, &hierarchy);
        let mut redistributor = ConvectiveRedistributor::new(ConvectionOptions::default(), 3);
        let summary = redistributor.run(&mut ensemble, &hierarchy, &store, 0.0, 0).unwrap();
        assert_eq!(summary.columns_examined, 3);
        assert_eq!(summary.active_columns, 3);
        assert!(summary.particles_moved > 0);
        assert_eq!(before, column_counts(&ensemble, &hierarchy));
        assert!(ensemble.particles().iter().any(|p| p.position.z > 2000.0));
    }

    #[test]
    fn weak_thermals_still_trigger_moist_columns() {
        let weak = UniformAtmosphere {
            heat_flux: 15.0,
            mixing_height: Some(800.0),
            ..tropical()
        };
        let (hierarchy, store) = setup(weak);
        let (_, w_star) = column_sounding(&hierarchy, &store, GridId::BASE, 1, 1, 0.0).unwrap();
        assert!(w_star > 0.0 && w_star < 1.0, "w* = {w_star}");
        let mut ensemble = ensemble();
        let before = column_counts(&ensemble, &hierarchy);
        let mut redistributor = ConvectiveRedistributor::new(ConvectionOptions::default(), 3);
        let summary = redistributor.run(&mut ensemble, &hierarchy, &store, 0.0, 0).unwrap();
        assert_eq!(summary.active_columns, 3);
        assert!(summary.particles_moved > 0);
        assert_eq!(before, column_counts(&ensemble, &hierarchy));
    }

    #[test]
    fn stable_columns_are_untouched() {
        let stable = UniformAtmosphere {
            lapse_rate: -0.003,
            relative_humidity: 0.1,
            ..UniformAtmosphere::calm()
        };
        let (hierarchy, store) = setup(stable);
        let mut ensemble = ensemble();
        let heights: Vec<f64> = ensemble.particles().iter().map(|p| p.position.z).collect();
        let mut redistributor = ConvectiveRedistributor::new(ConvectionOptions::default(), 3);
        let summary = redistributor.run(&mut ensemble, &hierarchy, &store, 0.0, 0).unwrap();
        assert_eq!(summary.active_columns, 0);
        let after: Vec<f64> = ensemble.particles().iter().map(|p| p.position.z).collect();
        assert_eq!(heights, after);
    }

    #[test]
    fn events_follow_interval_and_repeat_with_seed() {
        let (hierarchy, store) = setup(tropical());
        let mut a = ensemble();
        let mut b = ensemble();
        let mut first = ConvectiveRedistributor::new(ConvectionOptions::default(), 11);
        let mut second = ConvectiveRedistributor::new(ConvectionOptions::default(), 11);
        assert!(first.maybe_run(&mut a, &hierarchy, &store, 0.0, 0).unwrap().is_some());
        assert!(first.maybe_run(&mut a, &hierarchy, &store, 600.0, 1).unwrap().is_none());
        assert!(first.is_due(900.0));
        second.maybe_run(&mut b, &hierarchy, &store, 0.0, 0).unwrap();
        let za: Vec<f64> = a.particles().iter().map(|p| p.position.z).collect();
        let zb: Vec<f64> = b.particles().iter().map(|p| p.position.z).collect();
        assert_eq!(za, zb);
        assert!(!ConvectiveRedistributor::new(ConvectionOptions::disabled(), 1).is_due(0.0));
    }
}
