//! Output collaborator interface

use super::{GridFrame, ReceptorSample};
use crate::core_types::Vec3;
use crate::error::Result;
use crate::grid::MapProjection;
use crate::particles::{Particle, ParticleId};
use tracing::info;

/// State of one active particle at the end of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleRecord {
    pub id: ParticleId,
    pub release_group: usize,
    /// Projected position (m, m, m AGL).
    pub position: Vec3,
    /// Geographic position (degrees).
    pub longitude: f64,
    pub latitude: f64,
    /// Time since release (s).
    pub age: f64,
    /// Mass per species (kg).
    pub mass: Vec<f64>,
}

impl ParticleRecord {
    /// Records of every active particle, in ensemble order.
    pub fn collect(particles: &[Particle], projection: &dyn MapProjection) -> Vec<ParticleRecord> {
        particles
            .iter()
            .filter(|p| p.is_active())
            .map(|p| {
                let (longitude, latitude) = projection.to_geographic(p.position.x, p.position.y);
                ParticleRecord {
                    id: p.id,
                    release_group: p.release_group,
                    position: p.position,
                    longitude,
                    latitude,
                    age: p.age,
                    mass: p.mass.clone(),
                }
            })
            .collect()
    }
}

/// Everything flushed at one OUTPUT transition.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFrame {
    /// Averaging window (s).
    pub window_start: f64,
    pub window_end: f64,
    /// One frame per output grid, in configuration order.
    pub grids: Vec<GridFrame>,
    pub receptors: Vec<ReceptorSample>,
    /// Particle dump at the end of the window; empty unless enabled.
    pub particles: Vec<ParticleRecord>,
}

/// Receives output frames. Errors abort the run as `WriteFailure`; frames
/// already written stay valid.
pub trait OutputWriter {
    fn write(&mut self, frame: &OutputFrame) -> Result<()>;
}

/// Keeps every frame in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    pub frames: Vec<OutputFrame>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&OutputFrame> {
        self.frames.last()
    }
}

impl OutputWriter for MemoryWriter {
    fn write(&mut self, frame: &OutputFrame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Logs a one-line summary per grid and receptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogWriter;

impl OutputWriter for LogWriter {
    fn write(&mut self, frame: &OutputFrame) -> Result<()> {
        for grid in &frame.grids {
            let peak = grid.concentration.iter().copied().fold(0.0, f64::max);
            let deposited: f64 = grid.cumulative_dry.iter().chain(&grid.cumulative_wet).sum();
            info!(
                "[{:.0}-{:.0}s] grid '{}': {} samples, peak {:.3e} kg/m³, deposited {:.3e} kg/m² (cell sum)",
                frame.window_start, frame.window_end, grid.grid, grid.samples, peak, deposited
            );
        }
        for receptor in &frame.receptors {
            info!(
                "[{:.0}-{:.0}s] receptor '{}': {:?} kg/m³",
                frame.window_start, frame.window_end, receptor.name, receptor.concentration
            );
        }
        if !frame.particles.is_empty() {
            info!(
                "[{:.0}-{:.0}s] {} particle positions dumped",
                frame.window_start,
                frame.window_end,
                frame.particles.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::PlaneProjection;
    use crate::particles::TerminationReason;

    #[test]
    fn records_skip_retired_particles_and_carry_geography() {
        let projection = PlaneProjection::new(10.0, 50.0);
        let mut particles = vec![
            Particle::new(ParticleId(0), Vec3::new(0.0, 0.0, 120.0), vec![1.5], 2, 1),
            Particle::new(ParticleId(1), Vec3::new(5000.0, 0.0, 10.0), vec![1.0], 0, 1),
        ];
        particles[1].terminate(TerminationReason::MaxAge);
        let records = ParticleRecord::collect(&particles, &projection);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, ParticleId(0));
        assert_eq!(r.release_group, 2);
        assert_eq!(r.mass, vec![1.5]);
        assert!((r.longitude - 10.0).abs() < 1e-9 && (r.latitude - 50.0).abs() < 1e-9);
    }
}
