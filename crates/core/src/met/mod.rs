//! Meteorological fields: identifiers, snapshots, land use, the reader seam
//! and the store

pub mod derived;
pub mod field;
pub mod land_use;
pub mod reader;
pub mod snapshot;
pub mod store;
pub mod synthetic;

pub use derived::{derive_surface_parameters, DerivedOptions};
pub use field::FieldId;
pub use land_use::{LandUseClass, LandUseFractions, LandUseMap, LAND_USE_CLASSES};
pub use reader::MetReader;
pub use snapshot::FieldSnapshot;
pub use store::{FieldRequirements, FieldStore};
pub use synthetic::{field_from_fn, SyntheticReader, UniformAtmosphere};
