//! Field store: the two bracketing snapshots of every grid
//!
//! The store is the single owner of meteorological arrays. Particle workers
//! only ever see it through shared references; a refresh needs `&mut self`,
//! so the borrow checker serialises refreshes against particle sampling.

use super::{derive_surface_parameters, DerivedOptions, FieldId, FieldSnapshot, MetReader};
use crate::error::{DispersionError, Result};
use crate::grid::{GridHierarchy, GridId};
use tracing::{debug, info};

/// Fields a run cannot proceed without.
///
/// Each entry is a set of alternatives; at least one member must be present
/// after the derived-parameter pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRequirements {
    groups: Vec<Vec<FieldId>>,
}

impl FieldRequirements {
    /// Mean-flow transport: the three wind components.
    pub fn transport() -> Self {
        Self::default()
            .require(FieldId::U)
            .require(FieldId::V)
            .require(FieldId::W)
    }

    pub fn require(mut self, field: FieldId) -> Self {
        if !self.groups.iter().any(|g| g.len() == 1 && g[0] == field) {
            self.groups.push(vec![field]);
        }
        self
    }

    pub fn require_any(mut self, fields: &[FieldId]) -> Self {
        self.groups.push(fields.to_vec());
        self
    }

    /// Fields needed by the boundary-layer turbulence scheme.
    pub fn with_turbulence(self) -> Self {
        self.require(FieldId::FrictionVelocity)
            .require(FieldId::InverseObukhovLength)
            .require(FieldId::ConvectiveVelocity)
            .require(FieldId::MixingHeight)
    }

    /// Fields needed by the convective mass-flux diagnosis.
    pub fn with_convection(self) -> Self {
        self.require(FieldId::Temperature)
            .require(FieldId::SpecificHumidity)
            .require(FieldId::ConvectiveVelocity)
    }

    /// Fields needed by wet scavenging.
    pub fn with_wet_deposition(self) -> Self {
        self.require(FieldId::LargeScalePrecipitation)
            .require(FieldId::ConvectivePrecipitation)
            .require(FieldId::CloudBottom)
            .require(FieldId::CloudTop)
    }

    /// Fields needed by dry deposition.
    pub fn with_dry_deposition(self) -> Self {
        self.require(FieldId::FrictionVelocity)
            .require(FieldId::InverseObukhovLength)
    }

    /// Fail with `MissingField` on the first unmet requirement.
    pub fn check(&self, snapshot: &FieldSnapshot) -> Result<()> {
        for group in &self.groups {
            if !group.iter().any(|&f| snapshot.has(f)) {
                let field = group
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("|");
                return Err(DispersionError::MissingField {
                    field,
                    grid: snapshot.grid_name().to_string(),
                    time: snapshot.time(),
                });
            }
        }
        Ok(())
    }
}

/// Earlier and later snapshot of one grid.
#[derive(Debug, Clone)]
struct SnapshotPair {
    earlier: FieldSnapshot,
    later: FieldSnapshot,
}

/// Bracketing snapshots for every grid of a hierarchy.
#[derive(Debug, Clone)]
pub struct FieldStore {
    pairs: Vec<SnapshotPair>,
    requirements: FieldRequirements,
    options: DerivedOptions,
    refresh_count: usize,
}

/// Indices of the two available times bracketing `time`.
fn bracket_times(times: &[f64], time: f64, grid: &str) -> Result<(f64, f64)> {
    let not_found = || DispersionError::TimeNotFound {
        grid: grid.to_string(),
        time,
    };
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(DispersionError::IoFailure(format!(
            "snapshot times for grid '{grid}' are not strictly increasing"
        )));
    }
    if times.len() < 2 || time < times[0] || time > times[times.len() - 1] {
        return Err(not_found());
    }
    let upper = times.partition_point(|&t| t <= time).min(times.len() - 1);
    let upper = upper.max(1);
    Ok((times[upper - 1], times[upper]))
}

impl FieldStore {
    /// INIT: load the snapshots bracketing `time` on every grid.
    pub fn load(
        hierarchy: &GridHierarchy,
        reader: &mut dyn MetReader,
        time: f64,
        requirements: FieldRequirements,
        options: DerivedOptions,
    ) -> Result<Self> {
        let mut store = Self {
            pairs: Vec::with_capacity(hierarchy.len()),
            requirements,
            options,
            refresh_count: 0,
        };
        for (id, spec) in hierarchy.iter() {
            let times = reader.available_times(id)?;
            let (t0, t1) = bracket_times(&times, time, &spec.name)?;
            let earlier = store.fetch(hierarchy, reader, id, t0)?;
            let later = store.fetch(hierarchy, reader, id, t1)?;
            store.pairs.push(SnapshotPair { earlier, later });
        }
        info!(
            "Loaded meteorology for {} grid(s), window [{}, {}]s",
            hierarchy.len(),
            store.pairs[0].earlier.time(),
            store.pairs[0].later.time()
        );
        Ok(store)
    }

    fn fetch(
        &self,
        hierarchy: &GridHierarchy,
        reader: &mut dyn MetReader,
        grid: GridId,
        time: f64,
    ) -> Result<FieldSnapshot> {
        let spec = hierarchy.get(grid);
        let mut snapshot = reader.load_snapshot(grid, time)?;
        if snapshot.grid() != grid || snapshot.time() != time {
            return Err(DispersionError::IoFailure(format!(
                "reader returned grid {} at t={}s, requested grid '{}' at t={time}s",
                snapshot.grid().index(),
                snapshot.time(),
                spec.name
            )));
        }
        derive_surface_parameters(&mut snapshot, spec, &self.options)?;
        if spec.vertical.needs_terrain() {
            snapshot.require(FieldId::Terrain)?;
        }
        self.requirements.check(&snapshot)?;
        Ok(snapshot)
    }

    /// Whether every grid's bracket contains `time` in `[earlier, later)`.
    pub fn covers(&self, time: f64) -> bool {
        self.pairs
            .iter()
            .all(|p| p.earlier.time() <= time && time < p.later.time())
    }

    /// Earliest later-snapshot time strictly after `time` over all grids.
    /// Transport must not integrate across it without a refresh.
    pub fn next_boundary(&self, time: f64) -> Option<f64> {
        self.pairs
            .iter()
            .map(|p| p.later.time())
            .filter(|&t| t > time)
            .reduce(f64::min)
    }

    /// Advance the brackets so they contain `time`. Returns whether anything
    /// was loaded.
    pub fn refresh(
        &mut self,
        hierarchy: &GridHierarchy,
        reader: &mut dyn MetReader,
        time: f64,
    ) -> Result<bool> {
        if self.covers(time) {
            return Ok(false);
        }
        let mut loaded = false;
        for (id, spec) in hierarchy.iter() {
            let pair = &self.pairs[id.index()];
            if pair.earlier.time() <= time && time < pair.later.time() {
                continue;
            }
            let times = reader.available_times(id)?;
            let (t0, t1) = bracket_times(&times, time, &spec.name)?;
            if pair.earlier.time() == t0 && pair.later.time() == t1 {
                // final snapshot of the record: the bracket is already the last one
                continue;
            }
            loaded = true;
            let later = self.fetch(hierarchy, reader, id, t1)?;
            let pair = &mut self.pairs[id.index()];
            if pair.later.time() == t0 {
                // shift: the old later snapshot becomes the new earlier one
                let old_later = std::mem::replace(&mut pair.later, later);
                pair.earlier = old_later;
            } else {
                let earlier = self.fetch(hierarchy, reader, id, t0)?;
                let pair = &mut self.pairs[id.index()];
                pair.earlier = earlier;
                pair.later = later;
            }
            debug!("Grid '{}' now bracketed by [{t0}, {t1}]s", spec.name);
        }
        if !loaded {
            return Ok(false);
        }
        self.refresh_count += 1;
        info!(
            "Meteorology refreshed for t={}s, window [{}, {}]s",
            time,
            self.pairs[0].earlier.time(),
            self.pairs[0].later.time()
        );
        Ok(true)
    }

    /// Earlier and later snapshot of a grid.
    #[inline]
    pub fn bracket(&self, grid: GridId) -> (&FieldSnapshot, &FieldSnapshot) {
        let pair = &self.pairs[grid.index()];
        (&pair.earlier, &pair.later)
    }

    /// Linear time weight of the later snapshot at `time`, clamped to [0, 1].
    #[inline]
    pub fn time_weight(&self, grid: GridId, time: f64) -> f64 {
        let (a, b) = self.bracket(grid);
        let span = b.time() - a.time();
        if span <= 0.0 {
            return 0.0;
        }
        ((time - a.time()) / span).clamp(0.0, 1.0)
    }

    /// Time window of the base grid.
    pub fn window(&self) -> (f64, f64) {
        let (a, b) = self.bracket(GridId::BASE);
        (a.time(), b.time())
    }

    /// Number of refreshes that loaded data since INIT.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count
    }

    pub fn requirements(&self) -> &FieldRequirements {
        &self.requirements
    }
}
