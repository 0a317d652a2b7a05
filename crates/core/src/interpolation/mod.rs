//! Field interpolation at particle positions
//!
//! Resolves a point to the finest covering grid, then interpolates in the
//! native vertical coordinate, bilinearly in the horizontal and linearly in
//! time between the two bracketing snapshots.

pub mod location;
pub mod sampler;

pub use location::Location;
pub use sampler::{BoundaryLayerProfile, FieldInterpolator, FieldSample, PrecipitationSample};
