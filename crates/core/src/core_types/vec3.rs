//! Vector type alias for 3D positions, velocities and gradients.

use nalgebra::Vector3;

/// 3D vector type for positions, velocities, and gradients.
///
/// This is a simple alias for `nalgebra::Vector3<f64>`. Horizontal components
/// are metres in the base grid's projected plane, the vertical component is
/// metres above ground level.
pub type Vec3 = Vector3<f64>;
