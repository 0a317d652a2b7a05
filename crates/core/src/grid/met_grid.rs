//! Rectangular meteorological lattice description
//!
//! A `GridSpec` is immutable for the lifetime of a run. Horizontal positions
//! are metres in the base grid's projected plane; vertical positions are metres
//! above ground level (AGL). Field arrays on the grid are flattened with
//! index = iz * (ny * nx) + iy * nx + ix, the same layout as the 2D arrays
//! with iz omitted.

use serde::{Deserialize, Serialize};

/// Stable handle of a grid inside a [`GridHierarchy`](super::GridHierarchy).
///
/// `GridId(0)` is always the base grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridId(pub usize);

impl GridId {
    pub const BASE: GridId = GridId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Native vertical coordinate of the meteorological model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VerticalCoordinate {
    /// Fixed heights above ground, identical in every column (m AGL, ascending).
    Height { levels: Vec<f64> },
    /// Terrain-following levels: height AGL = eta · (`model_top` − terrain).
    TerrainFollowing {
        /// Ascending level values in [0, 1].
        eta: Vec<f64>,
        /// Model top above sea level (m).
        model_top: f64,
    },
}

/// Position of a height inside a column's level structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelBracket {
    /// Index of the level at or below the height.
    pub lower: usize,
    /// Interpolation weight of level `lower + 1`.
    pub weight: f64,
    /// Distance between the bracketing levels (m); zero when values are held
    /// constant below the lowest level.
    pub thickness: f64,
}

impl VerticalCoordinate {
    /// Number of levels.
    pub fn nz(&self) -> usize {
        match self {
            Self::Height { levels } => levels.len(),
            Self::TerrainFollowing { eta, .. } => eta.len(),
        }
    }

    /// Whether level heights depend on the terrain field.
    pub fn needs_terrain(&self) -> bool {
        matches!(self, Self::TerrainFollowing { .. })
    }

    /// Height AGL of level `k` in a column whose surface elevation is `terrain`.
    #[inline]
    pub fn level_height(&self, k: usize, terrain: f64) -> f64 {
        match self {
            Self::Height { levels } => levels[k],
            Self::TerrainFollowing { eta, model_top } => eta[k] * (model_top - terrain).max(0.0),
        }
    }

    /// Height AGL of the uppermost level in a column.
    #[inline]
    pub fn top_height(&self, terrain: f64) -> f64 {
        self.level_height(self.nz() - 1, terrain)
    }

    /// Locate height `z` (m AGL) in a column.
    ///
    /// Below the lowest level values are held (`thickness == 0`). Returns `None`
    /// above the top level.
    pub fn bracket(&self, z: f64, terrain: f64) -> Option<LevelBracket> {
        let nz = self.nz();
        let top = self.top_height(terrain);
        if z > top || !z.is_finite() {
            return None;
        }
        let lowest = self.level_height(0, terrain);
        if z <= lowest {
            return Some(LevelBracket {
                lower: 0,
                weight: 0.0,
                thickness: 0.0,
            });
        }
        // Native coordinate: for terrain-following grids work in eta so the
        // search never materialises the column's heights.
        let k = match self {
            Self::Height { levels } => levels.partition_point(|&h| h <= z),
            Self::TerrainFollowing { eta, model_top } => {
                let depth = (model_top - terrain).max(f64::EPSILON);
                let e = z / depth;
                eta.partition_point(|&v| v <= e)
            }
        };
        let lower = k.saturating_sub(1).min(nz - 2);
        let h0 = self.level_height(lower, terrain);
        let h1 = self.level_height(lower + 1, terrain);
        let thickness = h1 - h0;
        let weight = if thickness > 0.0 {
            ((z - h0) / thickness).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(LevelBracket {
            lower,
            weight,
            thickness,
        })
    }

    fn validate(&self) -> Result<(), String> {
        let values: &[f64] = match self {
            Self::Height { levels } => levels,
            Self::TerrainFollowing { eta, model_top } => {
                if !(model_top.is_finite() && *model_top > 0.0) {
                    return Err(format!("model top must be positive, got {model_top}"));
                }
                if eta.iter().any(|e| !(0.0..=1.0).contains(e)) {
                    return Err("eta levels must lie in [0, 1]".into());
                }
                eta
            }
        };
        if values.len() < 2 {
            return Err("at least two vertical levels are required".into());
        }
        if values[0] < 0.0 {
            return Err("vertical levels must be at or above the ground".into());
        }
        if values.windows(2).any(|w| w[1] <= w[0]) {
            return Err("vertical levels must be strictly ascending".into());
        }
        Ok(())
    }
}

/// Description of one meteorological grid (base or nest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub name: String,
    /// Projected x of grid point (0, 0) (m).
    pub origin_x: f64,
    /// Projected y of grid point (0, 0) (m).
    pub origin_y: f64,
    /// Grid spacing in x (m).
    pub dx: f64,
    /// Grid spacing in y (m).
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    pub vertical: VerticalCoordinate,
    /// Enclosing grid for nests; `None` for the base grid.
    pub parent: Option<GridId>,
}

impl GridSpec {
    /// Base grid with fixed AGL levels.
    pub fn new(
        name: impl Into<String>,
        origin: (f64, f64),
        spacing: (f64, f64),
        size: (usize, usize),
        levels: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            origin_x: origin.0,
            origin_y: origin.1,
            dx: spacing.0,
            dy: spacing.1,
            nx: size.0,
            ny: size.1,
            vertical: VerticalCoordinate::Height { levels },
            parent: None,
        }
    }

    /// Make this grid a nest of `parent`.
    pub fn nested_in(mut self, parent: GridId) -> Self {
        self.parent = Some(parent);
        self
    }

    #[inline]
    pub fn nz(&self) -> usize {
        self.vertical.nz()
    }

    /// Number of horizontal points.
    #[inline]
    pub fn horizontal_len(&self) -> usize {
        self.nx * self.ny
    }

    /// Number of 3D points.
    #[inline]
    pub fn volume_len(&self) -> usize {
        self.nx * self.ny * self.nz()
    }

    /// Largest projected x covered by the lattice.
    #[inline]
    pub fn max_x(&self) -> f64 {
        self.origin_x + (self.nx - 1) as f64 * self.dx
    }

    /// Largest projected y covered by the lattice.
    #[inline]
    pub fn max_y(&self) -> f64 {
        self.origin_y + (self.ny - 1) as f64 * self.dy
    }

    /// Whether the horizontal point lies inside the interpolation stencil area.
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.origin_x && x <= self.max_x() && y >= self.origin_y && y <= self.max_y()
    }

    /// Fractional grid index of a horizontal point.
    #[inline]
    pub fn fractional_index(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.origin_x) / self.dx, (y - self.origin_y) / self.dy)
    }

    /// Projected coordinates of grid point (ix, iy).
    #[inline]
    pub fn point(&self, ix: usize, iy: usize) -> (f64, f64) {
        (
            self.origin_x + ix as f64 * self.dx,
            self.origin_y + iy as f64 * self.dy,
        )
    }

    /// Nearest grid column of a horizontal point (clamped to the lattice).
    pub fn nearest_column(&self, x: f64, y: f64) -> (usize, usize) {
        let (gx, gy) = self.fractional_index(x, y);
        let ix = gx.round().clamp(0.0, (self.nx - 1) as f64) as usize;
        let iy = gy.round().clamp(0.0, (self.ny - 1) as f64) as usize;
        (ix, iy)
    }

    #[inline]
    pub fn index_2d(&self, ix: usize, iy: usize) -> usize {
        iy * self.nx + ix
    }

    #[inline]
    pub fn index_3d(&self, ix: usize, iy: usize, iz: usize) -> usize {
        iz * (self.ny * self.nx) + iy * self.nx + ix
    }

    /// Horizontal cell area (m²).
    #[inline]
    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.nx < 2 || self.ny < 2 {
            return Err(format!("grid '{}' needs at least 2x2 points", self.name));
        }
        if !(self.dx.is_finite() && self.dx > 0.0 && self.dy.is_finite() && self.dy > 0.0) {
            return Err(format!("grid '{}' spacing must be positive", self.name));
        }
        self.vertical
            .validate()
            .map_err(|e| format!("grid '{}': {e}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> GridSpec {
        GridSpec::new("g", (0.0, 0.0), (1000.0, 1000.0), (11, 6), vec![10.0, 100.0, 500.0])
    }

    #[test]
    fn indexing_matches_flattened_layout() {
        let g = grid();
        assert_eq!(g.index_3d(3, 2, 1), 66 + 2 * 11 + 3);
        assert_eq!(g.index_2d(10, 5), 65);
        assert_eq!(g.volume_len(), 11 * 6 * 3);
    }

    #[test]
    fn contains_uses_outer_grid_points() {
        let g = grid();
        assert!(g.contains(0.0, 0.0));
        assert!(g.contains(10_000.0, 5000.0));
        assert!(!g.contains(10_000.1, 0.0));
        assert!(!g.contains(-1.0, 10.0));
    }

    #[test]
    fn bracket_holds_below_lowest_and_rejects_above_top() {
        let g = grid();
        let below = g.vertical.bracket(2.0, 0.0).unwrap();
        assert_eq!(below.lower, 0);
        assert_eq!(below.thickness, 0.0);

        let mid = g.vertical.bracket(300.0, 0.0).unwrap();
        assert_eq!(mid.lower, 1);
        assert_relative_eq!(mid.weight, 0.5);
        assert_relative_eq!(mid.thickness, 400.0);

        let top = g.vertical.bracket(500.0, 0.0).unwrap();
        assert_eq!(top.lower, 1);
        assert_relative_eq!(top.weight, 1.0);

        assert!(g.vertical.bracket(500.5, 0.0).is_none());
    }

    #[test]
    fn terrain_following_levels_compress_over_mountains() {
        let v = VerticalCoordinate::TerrainFollowing {
            eta: vec![0.0, 0.1, 0.5, 1.0],
            model_top: 10_000.0,
        };
        assert_relative_eq!(v.level_height(1, 0.0), 1000.0);
        assert_relative_eq!(v.level_height(1, 2000.0), 800.0);
        let b = v.bracket(400.0, 2000.0).unwrap();
        assert_eq!(b.lower, 0);
        assert_relative_eq!(b.weight, 0.5);
    }

    #[test]
    fn validation_rejects_descending_levels() {
        let mut g = grid();
        g.vertical = VerticalCoordinate::Height {
            levels: vec![100.0, 50.0],
        };
        assert!(g.validate().is_err());
    }
}
