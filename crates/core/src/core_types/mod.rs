//! Core types and utilities

pub mod constants;
pub mod species;
pub mod vec3;

pub use species::{DryDepositionParams, GasReactivity, SpeciesIndex, SpeciesProperties, WetScavengingParams};
pub use vec3::Vec3;
