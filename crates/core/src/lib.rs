//! Lagrangian Particle Dispersion Core Library
//!
//! Releases marked particles carrying tracer mass into a time-evolving,
//! gridded wind field and follows them through mean advection, stochastic
//! boundary-layer turbulence and sub-grid convective mixing, while decay, wet
//! scavenging and dry deposition strip mass and the surviving mass is binned
//! onto output concentration grids and receptors.
//!
//! ## Engine layout
//!
//! - `met` / `grid` / `interpolation`: field snapshots on a base grid plus
//!   nests, with space-time interpolation on the finest covering grid, and
//!   the land-use cover behind roughness and surface resistance
//! - `particles`: point and box releases, and the domain-filling release
//! - `turbulence`: Hanna (1982) profiles and a Markov-chain velocity model
//! - `convection`: bulk mass-flux diagnosis and column redistribution
//! - `deposition`: resistance-based dry deposition, scavenging and decay
//! - `output`: kernel-smoothed concentration, deposition and receptor
//!   tallies, face fluxes and particle dumps
//! - `simulation`: the `TimeManager` state machine composing the stages
//!
//! Meteorological input arrives through the [`met::MetReader`] trait and
//! results leave through [`output::OutputWriter`].

// Core types and utilities
pub mod core_types;
pub mod error;

// Meteorology and geometry
pub mod grid;
pub mod interpolation;
pub mod met;

// Particle physics
pub mod convection;
pub mod deposition;
pub mod particles;
pub mod turbulence;

// Accumulation and the main loop
pub mod output;
pub mod simulation;

// Re-export core types
pub use core_types::{DryDepositionParams, SpeciesProperties, Vec3, WetScavengingParams};
pub use error::{DispersionError, MetError, Result, RunError, Stage};

// Re-export the run surface
pub use grid::{GridHierarchy, GridId, GridSpec, ProjectionSpec, VerticalCoordinate};
pub use met::{LandUseClass, LandUseMap, MetReader, SyntheticReader, UniformAtmosphere};
pub use output::{MemoryWriter, OutputFrame, OutputGridSpec, OutputWriter, ReceptorSpec};
pub use particles::{DomainFillConfig, ParticleEnsemble, ReleaseGroupConfig, ReleaseRegion};
pub use simulation::{RunConfig, RunState, RunSummary, TimeManager};
