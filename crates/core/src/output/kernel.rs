//! Horizontal box smoothing kernel
//!
//! A particle's mass is spread uniformly over a rectangle of half-widths
//! (h_x, h_y) centred on the particle. The weight of a cell is the area of
//! its overlap with the rectangle divided by the overlap with the whole grid,
//! so weights over in-grid cells always sum to one. With h = 0 the kernel
//! degenerates to nearest-cell assignment.

use super::OutputGridSpec;
use serde::{Deserialize, Serialize};

/// How wide the smoothing box is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelBandwidth {
    /// Half-width as a fraction of the cell size.
    Fixed { cells: f64 },
    /// Half-width `cells · √(reference_count / n)` where `n` is the number of
    /// particles in the particle's cell, clamped to `[cells, max_cells]`.
    Adaptive {
        cells: f64,
        reference_count: f64,
        max_cells: f64,
    },
}

impl Default for KernelBandwidth {
    fn default() -> Self {
        KernelBandwidth::Fixed { cells: 0.5 }
    }
}

impl KernelBandwidth {
    /// Half-width in cells for a particle sharing its cell with `local_count`
    /// particles (itself included).
    pub fn half_width(&self, local_count: usize) -> f64 {
        match *self {
            KernelBandwidth::Fixed { cells } => cells,
            KernelBandwidth::Adaptive {
                cells,
                reference_count,
                max_cells,
            } => {
                let n = local_count.max(1) as f64;
                (cells * (reference_count / n).sqrt()).clamp(cells, max_cells.max(cells))
            }
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, KernelBandwidth::Adaptive { .. })
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let ok = match *self {
            KernelBandwidth::Fixed { cells } => cells >= 0.0,
            KernelBandwidth::Adaptive {
                cells,
                reference_count,
                max_cells,
            } => cells >= 0.0 && reference_count > 0.0 && max_cells >= cells,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("invalid kernel bandwidth {self:?}"))
        }
    }
}

/// Fill `out` with `(ix, iy, weight)` for a particle at (x, y) with half-widths
/// `hx`, `hy` in metres. Returns `false` (and leaves `out` empty) when the
/// particle's centre is outside the grid.
pub fn box_weights(spec: &OutputGridSpec, x: f64, y: f64, hx: f64, hy: f64, out: &mut Vec<(usize, usize, f64)>) -> bool {
    out.clear();
    let Some((cx, cy)) = spec.cell_of(x, y) else {
        return false;
    };
    if hx <= 0.0 || hy <= 0.0 {
        out.push((cx, cy, 1.0));
        return true;
    }
    let span = |lo: f64, hi: f64, origin: f64, d: f64, n: usize| {
        let first = ((lo - origin) / d).floor().max(0.0) as usize;
        let last = (((hi - origin) / d).floor().max(0.0) as usize).min(n - 1);
        (first.min(n - 1), last)
    };
    let (x0, x1) = span(x - hx, x + hx, spec.origin_x, spec.dx, spec.nx);
    let (y0, y1) = span(y - hy, y + hy, spec.origin_y, spec.dy, spec.ny);
    let overlap = |lo: f64, hi: f64, cell_lo: f64, d: f64| (hi.min(cell_lo + d) - lo.max(cell_lo)).max(0.0);

    let mut total = 0.0;
    for iy in y0..=y1 {
        let wy = overlap(y - hy, y + hy, spec.origin_y + iy as f64 * spec.dy, spec.dy);
        if wy <= 0.0 {
            continue;
        }
        for ix in x0..=x1 {
            let wx = overlap(x - hx, x + hx, spec.origin_x + ix as f64 * spec.dx, spec.dx);
            if wx > 0.0 {
                out.push((ix, iy, wx * wy));
                total += wx * wy;
            }
        }
    }
    if total <= 0.0 {
        out.clear();
        out.push((cx, cy, 1.0));
        return true;
    }
    for entry in out.iter_mut() {
        entry.2 /= total;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spec() -> OutputGridSpec {
        OutputGridSpec::new("out", (0.0, 0.0), (100.0, 100.0), (10, 10), vec![100.0])
    }

    #[test]
    fn weights_sum_to_one_everywhere() {
        let spec = spec();
        let mut out = Vec::new();
        for (x, y, h) in [(550.0, 550.0, 50.0), (510.0, 590.0, 130.0), (5.0, 995.0, 400.0), (999.0, 0.0, 1.0)] {
            assert!(box_weights(&spec, x, y, h, h, &mut out));
            let sum: f64 = out.iter().map(|e| e.2).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn centred_half_cell_box_hits_one_cell() {
        let mut out = Vec::new();
        box_weights(&spec(), 550.0, 550.0, 50.0, 50.0, &mut out);
        assert_eq!(out, vec![(5, 5, 1.0)]);
    }

    #[test]
    fn offset_box_splits_by_area() {
        let mut out = Vec::new();
        box_weights(&spec(), 500.0, 550.0, 50.0, 50.0, &mut out);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0].2, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn outside_particles_get_no_weights() {
        let mut out = vec![(0, 0, 1.0)];
        assert!(!box_weights(&spec(), -1.0, 50.0, 50.0, 50.0, &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn adaptive_bandwidth_shrinks_with_density() {
        let k = KernelBandwidth::Adaptive {
            cells: 0.5,
            reference_count: 100.0,
            max_cells: 3.0,
        };
        assert_eq!(k.half_width(1), 3.0);
        assert_relative_eq!(k.half_width(25), 1.0, epsilon = 1e-12);
        assert_eq!(k.half_width(10_000), 0.5);
    }
}
