//! Concentration output: grids, face fluxes, smoothing kernel, receptors,
//! particle dumps and writers

pub mod concentration;
pub mod flux;
pub mod grid;
pub mod kernel;
pub mod receptor;
pub mod writer;

pub use concentration::{ConcentrationGrid, DepositionKind, GridFrame, SampleTally};
pub use flux::{FluxDirection, FluxFrame, FluxTally};
pub use grid::OutputGridSpec;
pub use kernel::{box_weights, KernelBandwidth};
pub use receptor::{ReceptorSample, ReceptorSet, ReceptorSpec};
pub use writer::{LogWriter, MemoryWriter, OutputFrame, OutputWriter, ParticleRecord};
