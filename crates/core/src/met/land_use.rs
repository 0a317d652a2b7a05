//! Land-use cover of the domain
//!
//! Cover is the fraction of each of the eleven Wesely (1989) classes in the
//! cells of a regular map in projected coordinates. It sets the roughness
//! length of met grids that carry no `Roughness` field and selects the
//! per-class surface resistances of dry deposition.
//!
//! The effective roughness of mixed cover averages ln z₀ over the class
//! fractions.

use crate::grid::GridSpec;
use serde::{Deserialize, Serialize};

/// Number of land-use classes.
pub const LAND_USE_CLASSES: usize = 11;

/// Fractions must sum to one within this tolerance.
const FRACTION_TOLERANCE: f64 = 1.0e-3;

/// Wesely (1989) land-use categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandUseClass {
    Urban,
    Agricultural,
    Range,
    DeciduousForest,
    ConiferousForest,
    MixedForest,
    Water,
    Barren,
    Wetland,
    AgriculturalRange,
    RockyShrubland,
}

impl LandUseClass {
    pub const ALL: [LandUseClass; LAND_USE_CLASSES] = [
        LandUseClass::Urban,
        LandUseClass::Agricultural,
        LandUseClass::Range,
        LandUseClass::DeciduousForest,
        LandUseClass::ConiferousForest,
        LandUseClass::MixedForest,
        LandUseClass::Water,
        LandUseClass::Barren,
        LandUseClass::Wetland,
        LandUseClass::AgriculturalRange,
        LandUseClass::RockyShrubland,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Roughness length z₀ (m).
    pub const fn roughness(self) -> f64 {
        match self {
            LandUseClass::Urban => 0.7,
            LandUseClass::Agricultural => 0.1,
            LandUseClass::Range => 0.05,
            LandUseClass::DeciduousForest => 1.0,
            LandUseClass::ConiferousForest => 1.2,
            LandUseClass::MixedForest => 0.8,
            LandUseClass::Water => 2.0e-4,
            LandUseClass::Barren => 0.01,
            LandUseClass::Wetland => 0.05,
            LandUseClass::AgriculturalRange => 0.08,
            LandUseClass::RockyShrubland => 0.1,
        }
    }
}

/// Fraction of each class in one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandUseFractions(pub [f64; LAND_USE_CLASSES]);

impl LandUseFractions {
    /// Cover of a single class.
    pub fn pure(class: LandUseClass) -> Self {
        let mut fractions = [0.0; LAND_USE_CLASSES];
        fractions[class.index()] = 1.0;
        Self(fractions)
    }

    /// Cover from (class, fraction) pairs; unlisted classes are zero.
    pub fn mixed(parts: &[(LandUseClass, f64)]) -> Self {
        let mut fractions = [0.0; LAND_USE_CLASSES];
        for &(class, fraction) in parts {
            fractions[class.index()] += fraction;
        }
        Self(fractions)
    }

    #[inline]
    pub fn get(&self, class: LandUseClass) -> f64 {
        self.0[class.index()]
    }

    /// Classes with non-zero cover.
    pub fn iter(&self) -> impl Iterator<Item = (LandUseClass, f64)> + '_ {
        LandUseClass::ALL
            .iter()
            .map(|&class| (class, self.get(class)))
            .filter(|&(_, f)| f > 0.0)
    }

    /// Effective roughness length (m).
    pub fn roughness(&self) -> f64 {
        let (weight, log_sum) = self
            .iter()
            .fold((0.0, 0.0), |(w, s), (class, f)| (w + f, s + f * class.roughness().ln()));
        if weight > 0.0 {
            (log_sum / weight).exp()
        } else {
            LandUseClass::Range.roughness()
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.0.iter().any(|f| !(f.is_finite() && (0.0..=1.0).contains(f))) {
            return Err(format!("land-use fractions {:?} must lie in [0, 1]", self.0));
        }
        let sum: f64 = self.0.iter().sum();
        if (sum - 1.0).abs() > FRACTION_TOLERANCE {
            return Err(format!("land-use fractions sum to {sum}, expected 1"));
        }
        Ok(())
    }
}

/// Cell-centred land-use map in projected coordinates. Points outside the
/// map take the nearest edge cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandUseMap {
    /// Lower-left corner of cell (0, 0) (m).
    pub origin_x: f64,
    pub origin_y: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    /// Cover per cell, row-major (`iy * nx + ix`).
    pub cells: Vec<LandUseFractions>,
}

impl LandUseMap {
    /// The same cover everywhere.
    pub fn uniform(fractions: LandUseFractions) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            dx: 1.0,
            dy: 1.0,
            nx: 1,
            ny: 1,
            cells: vec![fractions],
        }
    }

    /// Cover at a horizontal point.
    pub fn fractions_at(&self, x: f64, y: f64) -> &LandUseFractions {
        let clamp = |v: f64, n: usize| v.floor().clamp(0.0, (n - 1) as f64) as usize;
        let ix = clamp((x - self.origin_x) / self.dx, self.nx);
        let iy = clamp((y - self.origin_y) / self.dy, self.ny);
        &self.cells[iy * self.nx + ix]
    }

    /// Effective roughness at every point of a met grid.
    pub fn roughness_field(&self, spec: &GridSpec) -> Vec<f64> {
        let mut out = Vec::with_capacity(spec.horizontal_len());
        for iy in 0..spec.ny {
            for ix in 0..spec.nx {
                let (x, y) = spec.point(ix, iy);
                out.push(self.fractions_at(x, y).roughness());
            }
        }
        out
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.nx == 0 || self.ny == 0 || self.cells.len() != self.nx * self.ny {
            return Err(format!(
                "land-use map has {} cells for a {}x{} lattice",
                self.cells.len(),
                self.nx,
                self.ny
            ));
        }
        if !(self.dx.is_finite() && self.dx > 0.0 && self.dy.is_finite() && self.dy > 0.0) {
            return Err("land-use map spacing must be positive".into());
        }
        self.cells.iter().try_for_each(LandUseFractions::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mixed_cover_averages_log_roughness() {
        let pure = LandUseFractions::pure(LandUseClass::DeciduousForest);
        assert_relative_eq!(pure.roughness(), 1.0, epsilon = 1e-12);
        let half = LandUseFractions::mixed(&[(LandUseClass::Agricultural, 0.5), (LandUseClass::DeciduousForest, 0.5)]);
        assert_relative_eq!(half.roughness(), (0.1f64 * 1.0).sqrt(), epsilon = 1e-12);
        assert_eq!(half.iter().count(), 2);
        assert!(half.validate().is_ok());
    }

    #[test]
    fn lookup_clamps_to_the_map() {
        let map = LandUseMap {
            origin_x: 0.0,
            origin_y: 0.0,
            dx: 1000.0,
            dy: 1000.0,
            nx: 2,
            ny: 1,
            cells: vec![
                LandUseFractions::pure(LandUseClass::Water),
                LandUseFractions::pure(LandUseClass::Urban),
            ],
        };
        assert!(map.validate().is_ok());
        assert_eq!(map.fractions_at(500.0, 0.0).get(LandUseClass::Water), 1.0);
        assert_eq!(map.fractions_at(1500.0, 0.0).get(LandUseClass::Urban), 1.0);
        assert_eq!(map.fractions_at(-9000.0, 9000.0).get(LandUseClass::Water), 1.0);
        assert_eq!(map.fractions_at(9000.0, -9000.0).get(LandUseClass::Urban), 1.0);

        let spec = GridSpec::new("g", (0.0, 0.0), (1000.0, 1000.0), (3, 2), vec![10.0, 100.0]);
        let z0 = map.roughness_field(&spec);
        assert_eq!(z0.len(), 6);
        assert_relative_eq!(z0[0], LandUseClass::Water.roughness(), epsilon = 1e-15);
        assert_relative_eq!(z0[2], LandUseClass::Urban.roughness(), epsilon = 1e-12);
    }

    #[test]
    fn invalid_maps_are_rejected() {
        let mut bad = LandUseMap::uniform(LandUseFractions::mixed(&[(LandUseClass::Range, 0.6)]));
        assert!(bad.validate().is_err());
        bad.cells[0] = LandUseFractions::pure(LandUseClass::Range);
        assert!(bad.validate().is_ok());
        bad.nx = 2;
        assert!(bad.validate().is_err());
    }
}
