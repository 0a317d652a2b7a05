//! Stability regime selection
//!
//! The regime is a pure function of the particle height, the mixing height and
//! the stability parameter h/L. Every input maps to exactly one regime.
//!
//! ```text
//! z ≥ h              → FreeTroposphere
//! h/L < −1           → Unstable
//! h/L >  1           → Stable
//! otherwise          → Neutral
//! ```

use crate::interpolation::BoundaryLayerProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Threshold on |h/L| separating neutral from stratified conditions.
pub const NEUTRAL_LIMIT: f64 = 1.0;

/// Turbulence regime of one particle for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    /// Convective boundary layer.
    Unstable,
    /// Mechanically driven boundary layer.
    Neutral,
    /// Stably stratified boundary layer.
    Stable,
    /// Above the mixing height.
    FreeTroposphere,
}

impl Regime {
    /// Select the regime for a particle at height `z`.
    pub fn classify(z: f64, profile: &BoundaryLayerProfile) -> Self {
        if z >= profile.mixing_height {
            return Self::FreeTroposphere;
        }
        let stability = profile.mixing_height * profile.inverse_obukhov;
        if !stability.is_finite() {
            debug!("Non-finite stability parameter h/L = {stability}, using neutral profiles");
            return Self::Neutral;
        }
        if stability < -NEUTRAL_LIMIT {
            Self::Unstable
        } else if stability > NEUTRAL_LIMIT {
            Self::Stable
        } else {
            Self::Neutral
        }
    }

    /// Whether the regime belongs to the boundary layer.
    pub fn in_boundary_layer(self) -> bool {
        !matches!(self, Self::FreeTroposphere)
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unstable => "unstable",
            Self::Neutral => "neutral",
            Self::Stable => "stable",
            Self::FreeTroposphere => "free troposphere",
        };
        f.write_str(name)
    }
}
