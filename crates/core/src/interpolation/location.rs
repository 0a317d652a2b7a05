//! Resolution of a particle position to a stencil on the finest covering grid

use crate::grid::{GridId, LevelBracket};

/// Horizontal corner order used by every stencil: (0,0), (1,0), (0,1), (1,1).
pub(crate) const CORNERS: [(usize, usize); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// Interpolation stencil of one point, valid for one step.
///
/// Built once per particle per step by
/// [`FieldInterpolator::locate`](super::FieldInterpolator::locate) and reused
/// for every field sampled at that position.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Finest grid containing the point.
    pub grid: GridId,
    /// Lower-left grid column of the horizontal cell.
    pub ix0: usize,
    pub iy0: usize,
    /// Fractional position inside the cell, in [0, 1].
    pub fx: f64,
    pub fy: f64,
    /// Height above ground (m).
    pub z: f64,
    /// Bilinear terrain elevation under the point (m).
    pub terrain: f64,
    /// Vertical bracket in each corner column, in [`CORNERS`] order.
    pub(crate) brackets: [LevelBracket; 4],
}

impl Location {
    /// Bilinear weights of the four corners, in [`CORNERS`] order.
    #[inline]
    pub fn weights(&self) -> [f64; 4] {
        let (fx, fy) = (self.fx, self.fy);
        [
            (1.0 - fx) * (1.0 - fy),
            fx * (1.0 - fy),
            (1.0 - fx) * fy,
            fx * fy,
        ]
    }

    /// Grid column of corner `c`.
    #[inline]
    pub fn corner(&self, c: usize) -> (usize, usize) {
        let (dx, dy) = CORNERS[c];
        (self.ix0 + dx, self.iy0 + dy)
    }

    /// Grid column closest to the point.
    pub fn nearest_column(&self) -> (usize, usize) {
        (
            self.ix0 + usize::from(self.fx >= 0.5),
            self.iy0 + usize::from(self.fy >= 0.5),
        )
    }

    /// Whether the point lies below the lowest model level in every corner.
    pub fn below_lowest_level(&self) -> bool {
        self.brackets.iter().all(|b| b.thickness == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(fx: f64, fy: f64) -> Location {
        let b = LevelBracket {
            lower: 0,
            weight: 0.0,
            thickness: 0.0,
        };
        Location {
            grid: GridId::BASE,
            ix0: 3,
            iy0: 7,
            fx,
            fy,
            z: 0.0,
            terrain: 0.0,
            brackets: [b; 4],
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let w = location(0.3, 0.8).weights();
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-15);
        assert!((w[3] - 0.24).abs() < 1e-15);
    }

    #[test]
    fn corners_and_nearest_column() {
        let loc = location(0.6, 0.2);
        assert_eq!(loc.corner(3), (4, 8));
        assert_eq!(loc.nearest_column(), (4, 7));
        assert!(loc.below_lowest_level());
    }
}
