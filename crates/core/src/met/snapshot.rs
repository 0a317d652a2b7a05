//! Dense field arrays for one grid at one model time

use super::FieldId;
use crate::error::{DispersionError, Result};
use crate::grid::{GridId, GridSpec};
use rustc_hash::FxHashMap;

/// All decoded variables of one grid at one model time.
///
/// Arrays are flattened exactly like [`GridSpec::index_3d`] / [`GridSpec::index_2d`].
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    grid: GridId,
    grid_name: String,
    time: f64,
    nx: usize,
    ny: usize,
    nz: usize,
    fields: FxHashMap<FieldId, Vec<f64>>,
}

impl FieldSnapshot {
    /// Empty snapshot sized for `spec`.
    pub fn new(grid: GridId, spec: &GridSpec, time: f64) -> Self {
        Self {
            grid,
            grid_name: spec.name.clone(),
            time,
            nx: spec.nx,
            ny: spec.ny,
            nz: spec.nz(),
            fields: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn grid(&self) -> GridId {
        self.grid
    }

    #[inline]
    pub fn grid_name(&self) -> &str {
        &self.grid_name
    }

    /// Model time of the snapshot (s since run reference).
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    fn expected_len(&self, field: FieldId) -> usize {
        if field.is_3d() {
            self.nx * self.ny * self.nz
        } else {
            self.nx * self.ny
        }
    }

    /// Insert or replace a field, checking its length against the grid.
    pub fn insert(&mut self, field: FieldId, data: Vec<f64>) -> Result<()> {
        let expected = self.expected_len(field);
        if data.len() != expected {
            return Err(DispersionError::IoFailure(format!(
                "field {field} on grid '{}' has {} values, expected {expected}",
                self.grid_name,
                data.len()
            )));
        }
        self.fields.insert(field, data);
        Ok(())
    }

    /// Builder-style insert for readers and tests.
    pub fn with(mut self, field: FieldId, data: Vec<f64>) -> Result<Self> {
        self.insert(field, data)?;
        Ok(self)
    }

    pub fn has(&self, field: FieldId) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn get(&self, field: FieldId) -> Option<&[f64]> {
        self.fields.get(&field).map(Vec::as_slice)
    }

    /// Field data or a run-fatal `MissingField`.
    pub fn require(&self, field: FieldId) -> Result<&[f64]> {
        self.get(field).ok_or_else(|| DispersionError::MissingField {
            field: field.to_string(),
            grid: self.grid_name.clone(),
            time: self.time,
        })
    }

    /// Value of a 2D field at a grid point; `default` when absent.
    #[inline]
    pub fn surface_or(&self, field: FieldId, ix: usize, iy: usize, default: f64) -> f64 {
        self.get(field)
            .map_or(default, |data| data[iy * self.nx + ix])
    }

    /// Column of a 3D field at (ix, iy), bottom to top.
    pub fn column(&self, field: FieldId, ix: usize, iy: usize) -> Result<Vec<f64>> {
        let data = self.require(field)?;
        let stride = self.nx * self.ny;
        let base = iy * self.nx + ix;
        Ok((0..self.nz).map(|k| data[k * stride + base]).collect())
    }

    /// Fields present in the snapshot.
    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields.keys().copied()
    }
}
