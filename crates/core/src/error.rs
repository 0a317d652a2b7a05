//! Error taxonomy for the dispersion engine
//!
//! Per-particle conditions (`OutOfDomain`, `NumericDegenerate`) are recovered
//! locally by the caller. Missing meteorological data and invalid configuration
//! abort the run and surface as a [`RunError`] that names the failing stage and
//! the simulation time.

use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DispersionError>;

/// Errors raised by the core components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispersionError {
    /// Sample point lies outside every grid (horizontally or above the model top).
    #[error("point ({x:.1}, {y:.1}, {z:.1}) is outside the meteorological domain")]
    OutOfDomain { x: f64, y: f64, z: f64 },

    /// A field required by the configured physics is absent from a snapshot.
    #[error("field {field} missing from snapshot of grid '{grid}' at t={time}s")]
    MissingField {
        field: String,
        grid: String,
        time: f64,
    },

    /// The reader cannot supply a snapshot bracketing the requested time.
    #[error("no meteorological data for grid '{grid}' at t={time}s")]
    TimeNotFound { grid: String, time: f64 },

    /// The reader failed while reading or decoding.
    #[error("meteorological input failure: {0}")]
    IoFailure(String),

    /// A computation hit a degenerate input that has no regime fallback.
    #[error("numerically degenerate input in {context}: {detail}")]
    NumericDegenerate { context: String, detail: String },

    /// The global mass budget no longer closes within tolerance.
    #[error("mass imbalance: released {released:.6e} kg, accounted {accounted:.6e} kg (relative error {relative:.2e})")]
    MassImbalance {
        released: f64,
        accounted: f64,
        relative: f64,
    },

    /// Configuration rejected at INIT.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The output collaborator rejected a frame.
    #[error("output write failed: {0}")]
    WriteFailure(String),
}

impl DispersionError {
    /// Construct an `InvalidConfig` error from anything displayable.
    pub fn invalid_config(message: impl fmt::Display) -> Self {
        Self::InvalidConfig(message.to_string())
    }

    /// Whether this error only affects a single particle.
    pub fn is_particle_local(&self) -> bool {
        matches!(
            self,
            Self::OutOfDomain { .. } | Self::NumericDegenerate { .. }
        )
    }
}

/// Errors reported by the meteorological reader collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetError {
    #[error("I/O failure: {0}")]
    IoFailure(String),
    #[error("variable '{variable}' missing in grid '{grid}'")]
    MissingVariable { variable: String, grid: String },
    #[error("time {time}s not available for grid '{grid}'")]
    TimeNotFound { grid: String, time: f64 },
}

impl From<MetError> for DispersionError {
    fn from(err: MetError) -> Self {
        match err {
            MetError::IoFailure(msg) => DispersionError::IoFailure(msg),
            MetError::MissingVariable { variable, grid } => DispersionError::MissingField {
                field: variable,
                grid,
                time: f64::NAN,
            },
            MetError::TimeNotFound { grid, time } => DispersionError::TimeNotFound { grid, time },
        }
    }
}

/// Component in which a run-fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    FieldRefresh,
    Release,
    Transport,
    Convection,
    Deposition,
    Accumulation,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::FieldRefresh => "field refresh",
            Stage::Release => "release",
            Stage::Transport => "transport",
            Stage::Convection => "convection",
            Stage::Deposition => "deposition",
            Stage::Accumulation => "accumulation",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

/// User-visible fatal error: which component failed, and when.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} failed at t={time}s: {source}")]
pub struct RunError {
    pub stage: Stage,
    pub time: f64,
    #[source]
    pub source: DispersionError,
}

impl RunError {
    pub fn new(stage: Stage, time: f64, source: DispersionError) -> Self {
        Self {
            stage,
            time,
            source,
        }
    }
}

/// Attach a stage and time to a library result.
pub(crate) trait StageContext<T> {
    fn at_stage(self, stage: Stage, time: f64) -> std::result::Result<T, RunError>;
}

impl<T> StageContext<T> for Result<T> {
    fn at_stage(self, stage: Stage, time: f64) -> std::result::Result<T, RunError> {
        self.map_err(|source| RunError::new(stage, time, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_names_stage_and_time() {
        let err = RunError::new(
            Stage::FieldRefresh,
            3600.0,
            DispersionError::TimeNotFound {
                grid: "base".into(),
                time: 7200.0,
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("field refresh failed at t=3600s"), "{msg}");
        assert!(msg.contains("7200"), "{msg}");
    }

    #[test]
    fn met_errors_map_onto_taxonomy() {
        let missing: DispersionError = MetError::MissingVariable {
            variable: "U".into(),
            grid: "base".into(),
        }
        .into();
        assert!(matches!(missing, DispersionError::MissingField { .. }));
        assert!(!missing.is_particle_local());

        let outside = DispersionError::OutOfDomain {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
        assert!(outside.is_particle_local());
    }
}
