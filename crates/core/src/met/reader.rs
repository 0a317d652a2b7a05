//! Meteorological reader seam
//!
//! Reading and decoding model output is an external collaborator. The engine
//! sees it only through [`MetReader`], called synchronously by the field store
//! during the exclusive refresh phase of a step.

use super::FieldSnapshot;
use crate::error::MetError;
use crate::grid::GridId;

/// Source of decoded meteorological snapshots.
pub trait MetReader: Send {
    /// Model times available for a grid (s since run reference), ascending.
    fn available_times(&self, grid: GridId) -> Result<Vec<f64>, MetError>;

    /// Read and decode every variable of `grid` at exactly `time`.
    fn load_snapshot(&mut self, grid: GridId, time: f64) -> Result<FieldSnapshot, MetError>;
}
