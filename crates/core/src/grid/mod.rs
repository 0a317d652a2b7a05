//! Meteorological grid geometry: lattices, nests and the map projection

pub mod hierarchy;
pub mod met_grid;
pub mod projection;

pub use hierarchy::GridHierarchy;
pub use met_grid::{GridId, GridSpec, LevelBracket, VerticalCoordinate};
pub use projection::{MapProjection, PlaneProjection, ProjectionSpec};
