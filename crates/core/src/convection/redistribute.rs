//! Column redistribution matrix and particle moves
//!
//! The column is split into layers bounded by the ground, the midpoints
//! between model levels and the top level. Over one event of length Δt the
//! matrix entry P[to][from] is the fraction of the air in layer `from` that
//! ends up in layer `to`:
//!
//! ```text
//! updraft     entrained in j, detrained in k > j   ∝ E_j · D_k / Σ_{k'>j} D_k'
//! downdraft   entrained in j, detrained in k < j   ∝ E_j · D_k / Σ_{k'<j} D_k'
//! subsidence  across interface i with flux S_i = M_u − M_d (downward if > 0)
//! P[k][j]     = F(j→k) Δt / m_j,     P[j][j] = 1 − Σ_{k≠j} P[k][j]
//! ```
//!
//! Every column of P sums to one, so moving each particle to a layer drawn
//! from its source column conserves particle count and mass exactly.

use super::MassFluxProfile;
use rand::Rng;

/// Layer geometry of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayers {
    /// Interface heights (m AGL), ascending, `len() + 1` entries.
    pub bounds: Vec<f64>,
}

impl ColumnLayers {
    /// Layers around model levels: ground, level midpoints, top level.
    pub fn from_levels(heights: &[f64]) -> Self {
        let n = heights.len();
        let mut bounds = Vec::with_capacity(n + 1);
        bounds.push(0.0);
        for k in 1..n {
            bounds.push(0.5 * (heights[k - 1] + heights[k]));
        }
        bounds.push(heights[n - 1]);
        Self { bounds }
    }

    pub fn len(&self) -> usize {
        self.bounds.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn thickness(&self, k: usize) -> f64 {
        self.bounds[k + 1] - self.bounds[k]
    }

    #[inline]
    pub fn midpoint(&self, k: usize) -> f64 {
        0.5 * (self.bounds[k] + self.bounds[k + 1])
    }

    /// Layer containing height `z`; `None` above the column top.
    pub fn layer_of(&self, z: f64) -> Option<usize> {
        if z > self.bounds[self.len()] {
            return None;
        }
        let k = self.bounds.partition_point(|&b| b <= z).saturating_sub(1);
        Some(k.min(self.len() - 1))
    }
}

/// Column-stochastic layer-to-layer transfer matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct RedistributionMatrix {
    n: usize,
    /// Row-major P[to][from].
    data: Vec<f64>,
}

impl RedistributionMatrix {
    /// Identity matrix: nothing moves.
    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for k in 0..n {
            data[k * n + k] = 1.0;
        }
        Self { n, data }
    }

    /// Build the matrix for one event of length `dt`.
    ///
    /// `air_mass` is the mass of air per unit area in each layer (kg/m²).
    pub fn build(
        layers: &ColumnLayers,
        air_mass: &[f64],
        profile: &MassFluxProfile,
        dt: f64,
        max_outflow: f64,
    ) -> Self {
        let n = layers.len();
        let mut flux = vec![0.0; n * n];
        let mut add = |from: usize, to: usize, f: f64| {
            if from != to && f > 0.0 {
                flux[to * n + from] += f;
            }
        };

        // interface fluxes; none through the ground or the column top
        let updraft: Vec<f64> = (0..=n)
            .map(|i| if i == 0 || i == n { 0.0 } else { profile.updraft(layers.bounds[i]) })
            .collect();
        let downdraft: Vec<f64> = (0..=n)
            .map(|i| if i == 0 || i == n { 0.0 } else { profile.downdraft(layers.bounds[i]) })
            .collect();

        let up_entrain: Vec<f64> = (0..n).map(|k| (updraft[k + 1] - updraft[k]).max(0.0)).collect();
        let up_detrain: Vec<f64> = (0..n).map(|k| (updraft[k] - updraft[k + 1]).max(0.0)).collect();
        for j in 0..n {
            let above: f64 = up_detrain[j + 1..].iter().sum();
            if up_entrain[j] > 0.0 && above > 0.0 {
                for k in j + 1..n {
                    add(j, k, up_entrain[j] * up_detrain[k] / above);
                }
            }
        }

        // downdraft flux is downward: inflow from above, outflow below
        let down_entrain: Vec<f64> = (0..n).map(|k| (downdraft[k] - downdraft[k + 1]).max(0.0)).collect();
        let down_detrain: Vec<f64> = (0..n).map(|k| (downdraft[k + 1] - downdraft[k]).max(0.0)).collect();
        for j in 0..n {
            let below: f64 = down_detrain[..j].iter().sum();
            if down_entrain[j] > 0.0 && below > 0.0 {
                for k in 0..j {
                    add(j, k, down_entrain[j] * down_detrain[k] / below);
                }
            }
        }

        for i in 1..n {
            let subsidence = updraft[i] - downdraft[i];
            if subsidence > 0.0 {
                add(i, i - 1, subsidence);
            } else {
                add(i - 1, i, -subsidence);
            }
        }

        // fluxes to fractions of the source layer
        let mut data = flux;
        let mut outflow = vec![0.0; n];
        for from in 0..n {
            let m = air_mass[from].max(f64::MIN_POSITIVE);
            for to in 0..n {
                if to != from {
                    data[to * n + from] *= dt / m;
                    outflow[from] += data[to * n + from];
                }
            }
        }
        let largest = outflow.iter().copied().fold(0.0, f64::max);
        let scale = if largest > max_outflow { max_outflow / largest } else { 1.0 };
        for from in 0..n {
            for to in 0..n {
                if to != from {
                    data[to * n + from] *= scale;
                }
            }
            data[from * n + from] = 1.0 - outflow[from] * scale;
        }
        Self { n, data }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn probability(&self, to: usize, from: usize) -> f64 {
        self.data[to * self.n + from]
    }

    /// Sum of a source column; one up to rounding.
    pub fn column_sum(&self, from: usize) -> f64 {
        (0..self.n).map(|to| self.probability(to, from)).sum()
    }

    /// Destination layer for a particle in `from`, by inverse CDF.
    pub fn draw<R: Rng + ?Sized>(&self, from: usize, rng: &mut R) -> usize {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for to in 0..self.n {
            cumulative += self.probability(to, from);
            if u < cumulative {
                return to;
            }
        }
        from
    }
}

/// Move particles `(index, z)` of one column. Returns `(index, new_z)` for
/// every particle whose layer changed; the new height is uniform in the
/// destination layer.
pub fn redistribute_column<R: Rng + ?Sized>(
    particles: &[(usize, f64)],
    layers: &ColumnLayers,
    matrix: &RedistributionMatrix,
    rng: &mut R,
) -> Vec<(usize, f64)> {
    let mut moves = Vec::new();
    for &(index, z) in particles {
        let Some(from) = layers.layer_of(z) else {
            continue;
        };
        let to = matrix.draw(from, rng);
        if to != from {
            let lo = layers.bounds[to];
            let hi = layers.bounds[to + 1];
            moves.push((index, lo + rng.random::<f64>() * (hi - lo)));
        }
    }
    moves
}
