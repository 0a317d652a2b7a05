//! Meteorological variable identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a gridded meteorological variable.
///
/// Units follow the reader contract: winds m/s, temperatures K, humidity kg/kg
/// or fraction, pressure Pa, heat flux W/m² (positive upward), stress N/m²,
/// precipitation mm/h, heights m.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldId {
    // 3D fields
    U,
    V,
    W,
    Temperature,
    SpecificHumidity,
    RelativeHumidity,
    Density,
    // 2D surface fields supplied by the reader
    Terrain,
    SurfacePressure,
    Temperature2m,
    SurfaceSensibleHeatFlux,
    SurfaceStress,
    Roughness,
    LargeScalePrecipitation,
    ConvectivePrecipitation,
    // 2D fields that may be supplied or are derived after load
    FrictionVelocity,
    InverseObukhovLength,
    ConvectiveVelocity,
    MixingHeight,
    CloudBottom,
    CloudTop,
}

impl FieldId {
    /// Whether the field has a vertical dimension.
    pub const fn is_3d(self) -> bool {
        matches!(
            self,
            Self::U
                | Self::V
                | Self::W
                | Self::Temperature
                | Self::SpecificHumidity
                | Self::RelativeHumidity
                | Self::Density
        )
    }

    /// Fields computed from others by the surface-parameter pass.
    pub const fn is_derived(self) -> bool {
        matches!(
            self,
            Self::FrictionVelocity
                | Self::InverseObukhovLength
                | Self::ConvectiveVelocity
                | Self::MixingHeight
                | Self::CloudBottom
                | Self::CloudTop
        )
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
