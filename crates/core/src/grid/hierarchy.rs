//! Nested grid hierarchy with finest-grid resolution
//!
//! Nests form a tree rooted at the base grid. A horizontal point may fall in
//! several nests at once; the nest with the finest spacing wins, so every
//! physics routine asks the hierarchy once and never branches on nest numbers.

use super::{GridId, GridSpec, MapProjection};
use crate::core_types::constants::coriolis_parameter;
use crate::error::{DispersionError, Result};
use std::sync::Arc;

/// Smallest Coriolis magnitude used by boundary-layer scaling (1/s).
const MIN_CORIOLIS: f64 = 5.0e-5;

/// Base grid plus nests, and the projection shared by all of them.
#[derive(Debug, Clone)]
pub struct GridHierarchy {
    grids: Vec<GridSpec>,
    projection: Arc<dyn MapProjection>,
}

impl GridHierarchy {
    /// Build and validate a hierarchy. `grids[0]` is the base grid.
    pub fn new(grids: Vec<GridSpec>, projection: Arc<dyn MapProjection>) -> Result<Self> {
        if grids.is_empty() {
            return Err(DispersionError::invalid_config("no meteorological grid defined"));
        }
        for (i, grid) in grids.iter().enumerate() {
            grid.validate().map_err(DispersionError::InvalidConfig)?;
            match (i, grid.parent) {
                (0, None) => {}
                (0, Some(_)) => {
                    return Err(DispersionError::invalid_config(format!(
                        "base grid '{}' cannot have a parent",
                        grid.name
                    )))
                }
                (_, None) => {
                    return Err(DispersionError::invalid_config(format!(
                        "nest '{}' has no parent grid",
                        grid.name
                    )))
                }
                (_, Some(parent)) => {
                    if parent.index() >= i {
                        return Err(DispersionError::invalid_config(format!(
                            "nest '{}' must be listed after its parent",
                            grid.name
                        )));
                    }
                    let p = &grids[parent.index()];
                    if grid.dx > p.dx || grid.dy > p.dy {
                        return Err(DispersionError::invalid_config(format!(
                            "nest '{}' is coarser than its parent '{}'",
                            grid.name, p.name
                        )));
                    }
                    let inside = p.contains(grid.origin_x, grid.origin_y)
                        && p.contains(grid.max_x(), grid.max_y());
                    if !inside {
                        return Err(DispersionError::invalid_config(format!(
                            "nest '{}' extends beyond parent '{}'",
                            grid.name, p.name
                        )));
                    }
                }
            }
        }
        Ok(Self { grids, projection })
    }

    pub fn base(&self) -> &GridSpec {
        &self.grids[0]
    }

    pub fn get(&self, id: GridId) -> &GridSpec {
        &self.grids[id.index()]
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GridId, &GridSpec)> + '_ {
        self.grids.iter().enumerate().map(|(i, g)| (GridId(i), g))
    }

    pub fn projection(&self) -> &Arc<dyn MapProjection> {
        &self.projection
    }

    /// Finest grid containing the horizontal point, or `None` outside the base grid.
    pub fn containing(&self, x: f64, y: f64) -> Option<GridId> {
        if !self.base().contains(x, y) {
            return None;
        }
        let mut best = GridId::BASE;
        let mut best_area = self.base().cell_area();
        for (i, grid) in self.grids.iter().enumerate().skip(1) {
            if grid.cell_area() <= best_area && grid.contains(x, y) {
                best = GridId(i);
                best_area = grid.cell_area();
            }
        }
        Some(best)
    }

    /// Coriolis parameter magnitude at a projected point, floored for
    /// boundary-layer similarity formulas near the equator.
    pub fn coriolis_at(&self, x: f64, y: f64) -> f64 {
        let (_, lat) = self.projection.to_geographic(x, y);
        coriolis_parameter(lat).abs().max(MIN_CORIOLIS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::PlaneProjection;

    fn levels() -> Vec<f64> {
        vec![10.0, 100.0, 1000.0]
    }

    fn hierarchy() -> GridHierarchy {
        let base = GridSpec::new("base", (0.0, 0.0), (10_000.0, 10_000.0), (11, 11), levels());
        let nest = GridSpec::new("nest", (20_000.0, 20_000.0), (2_000.0, 2_000.0), (11, 11), levels())
            .nested_in(GridId::BASE);
        let inner = GridSpec::new("inner", (24_000.0, 24_000.0), (500.0, 500.0), (9, 9), levels())
            .nested_in(GridId(1));
        GridHierarchy::new(
            vec![base, nest, inner],
            Arc::new(PlaneProjection::new(0.0, 45.0)),
        )
        .unwrap()
    }

    #[test]
    fn finest_nest_wins() {
        let h = hierarchy();
        assert_eq!(h.containing(5_000.0, 5_000.0), Some(GridId(0)));
        assert_eq!(h.containing(21_000.0, 21_000.0), Some(GridId(1)));
        assert_eq!(h.containing(25_000.0, 25_000.0), Some(GridId(2)));
        assert_eq!(h.containing(-1.0, 5_000.0), None);
    }

    #[test]
    fn nest_edge_belongs_to_nest() {
        let h = hierarchy();
        assert_eq!(h.containing(20_000.0, 30_000.0), Some(GridId(1)));
    }

    #[test]
    fn rejects_nest_outside_parent() {
        let base = GridSpec::new("base", (0.0, 0.0), (10_000.0, 10_000.0), (5, 5), levels());
        let nest = GridSpec::new("nest", (35_000.0, 0.0), (1_000.0, 1_000.0), (11, 11), levels())
            .nested_in(GridId::BASE);
        let err = GridHierarchy::new(vec![base, nest], Arc::new(PlaneProjection::new(0.0, 45.0)));
        assert!(matches!(err, Err(DispersionError::InvalidConfig(_))));
    }

    #[test]
    fn coriolis_is_floored() {
        let base = GridSpec::new("base", (0.0, 0.0), (10_000.0, 10_000.0), (5, 5), levels());
        let h = GridHierarchy::new(vec![base], Arc::new(PlaneProjection::new(0.0, 0.0))).unwrap();
        assert!(h.coriolis_at(0.0, 0.0) >= MIN_CORIOLIS);
    }
}
