//! Output grid geometry
//!
//! Unlike meteorological grids, output grids are cell-centred: cell (ix, iy)
//! spans `[origin + ix·dx, origin + (ix+1)·dx)` horizontally. Levels are given
//! by their upper bounds in metres above ground; level 0 starts at the ground.

use crate::core_types::Vec3;
use serde::{Deserialize, Serialize};

/// Definition of one concentration output domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputGridSpec {
    pub name: String,
    /// Projected x of the grid's lower-left corner (m).
    pub origin_x: f64,
    /// Projected y of the grid's lower-left corner (m).
    pub origin_y: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    /// Upper bounds of the output levels (m AGL), strictly increasing.
    pub heights: Vec<f64>,
}

impl OutputGridSpec {
    pub fn new(
        name: impl Into<String>,
        origin: (f64, f64),
        spacing: (f64, f64),
        size: (usize, usize),
        heights: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            origin_x: origin.0,
            origin_y: origin.1,
            dx: spacing.0,
            dy: spacing.1,
            nx: size.0,
            ny: size.1,
            heights,
        }
    }

    #[inline]
    pub fn nz(&self) -> usize {
        self.heights.len()
    }

    #[inline]
    pub fn horizontal_len(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn volume_len(&self) -> usize {
        self.nx * self.ny * self.nz()
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.origin_x + self.nx as f64 * self.dx
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.origin_y + self.ny as f64 * self.dy
    }

    #[inline]
    pub fn top(&self) -> f64 {
        self.heights.last().copied().unwrap_or(0.0)
    }

    /// Whether the horizontal point lies in a cell.
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.origin_x && x < self.max_x() && y >= self.origin_y && y < self.max_y()
    }

    /// Cell of a horizontal point, if inside.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !self.contains(x, y) {
            return None;
        }
        let ix = ((x - self.origin_x) / self.dx) as usize;
        let iy = ((y - self.origin_y) / self.dy) as usize;
        Some((ix.min(self.nx - 1), iy.min(self.ny - 1)))
    }

    /// Output level of height `z`; `None` below ground or above the top.
    pub fn level_of(&self, z: f64) -> Option<usize> {
        if z < 0.0 || z > self.top() {
            return None;
        }
        Some(self.heights.partition_point(|&h| h < z).min(self.nz() - 1))
    }

    /// Bottom of level `iz` (m AGL).
    #[inline]
    pub fn level_bottom(&self, iz: usize) -> f64 {
        if iz == 0 {
            0.0
        } else {
            self.heights[iz - 1]
        }
    }

    /// Volume of a cell at level `iz` (m³).
    #[inline]
    pub fn cell_volume(&self, iz: usize) -> f64 {
        self.cell_area() * (self.heights[iz] - self.level_bottom(iz))
    }

    #[inline]
    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }

    /// Centre of cell (ix, iy) at level `iz`.
    pub fn cell_centre(&self, ix: usize, iy: usize, iz: usize) -> Vec3 {
        Vec3::new(
            self.origin_x + (ix as f64 + 0.5) * self.dx,
            self.origin_y + (iy as f64 + 0.5) * self.dy,
            0.5 * (self.level_bottom(iz) + self.heights[iz]),
        )
    }

    #[inline]
    pub fn index_2d(&self, ix: usize, iy: usize) -> usize {
        iy * self.nx + ix
    }

    #[inline]
    pub fn index_3d(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (iz * self.ny + iy) * self.nx + ix
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.nx == 0 || self.ny == 0 || self.heights.is_empty() {
            return Err(format!("output grid '{}' is empty", self.name));
        }
        if !(self.dx.is_finite() && self.dx > 0.0 && self.dy.is_finite() && self.dy > 0.0) {
            return Err(format!("output grid '{}' spacing must be positive", self.name));
        }
        let increasing = self.heights[0] > 0.0 && self.heights.windows(2).all(|w| w[1] > w[0]);
        if !increasing {
            return Err(format!(
                "output grid '{}' level heights must be positive and strictly increasing",
                self.name
            ));
        }
        Ok(())
    }
}
