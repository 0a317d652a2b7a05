//! Particle ensemble, release groups and the domain-filling release

pub mod domain_fill;
pub mod ensemble;
pub mod particle;
pub mod release;

pub use domain_fill::{DomainFill, DomainFillConfig};
pub use ensemble::ParticleEnsemble;
pub use particle::{Particle, ParticleId, ParticleStatus, TerminationReason};
pub use release::{ReleaseGroup, ReleaseGroupConfig, ReleaseRegion, ReleaseSummary};
