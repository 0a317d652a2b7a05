//! Stochastic turbulence parameterization
//!
//! Boundary-layer similarity profiles (Hanna 1982) feed a per-particle Markov
//! chain for the turbulent velocity. The regime is selected per particle and
//! per step from the interpolated boundary-layer profile.

pub mod hanna;
pub mod markov;
pub mod regime;

pub use hanna::{boundary_layer_stats, TurbulenceStats};
pub use markov::{initial_velocity, perturb, stats_at, TurbulenceOptions, TurbulenceUpdate};
pub use regime::Regime;
