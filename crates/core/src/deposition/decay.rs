//! Radioactive or first-order chemical decay

use std::f64::consts::LN_2;

/// Fraction of mass lost in `dt` for a species with half-life `half_life` (s).
#[inline]
pub fn decay_fraction(half_life: Option<f64>, dt: f64) -> f64 {
    match half_life {
        Some(t) if t > 0.0 && dt > 0.0 => 1.0 - (-LN_2 * dt / t).exp(),
        _ => 0.0,
    }
}
