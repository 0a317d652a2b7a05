//! Time manager: the main dispersion loop
//!
//! `TimeManager` drives the run through
//!
//! ```text
//! INIT → STEPPING → {STEPPING, OUTPUT, TERMINATED}
//! OUTPUT → {STEPPING, TERMINATED}
//! ```
//!
//! One STEPPING transition:
//! 1. refreshes the field brackets (exclusive phase, no particle work runs)
//! 2. releases due particles
//! 3. runs the per-particle pipeline over the worker pool, split at any
//!    snapshot time inside the step with a refresh between the pieces
//! 4. credits removed mass to the budget and deposition grids
//! 5. runs convective redistribution when an event is due
//! 6. samples concentrations when a sample is due
//! 7. checks the global mass budget
//!
//! OUTPUT flushes every accumulator to the writer and starts a new window.

pub mod budget;
pub mod config;
pub mod pipeline;
pub mod plume;

pub use budget::MassBudget;
pub use config::{
    DomainConfig, Integrator, OutputOptions, RunConfig, SubsteppingOptions, TerminationOptions,
};
pub use pipeline::{
    advect, deposit, interpolate, perturb, step_particle, ParticleEnvironment, ParticleOutcome, StepContext,
};
pub use plume::PlumeStatistics;

use crate::convection::{ConvectionSummary, ConvectiveRedistributor};
use crate::deposition::species_settling_velocity;
use crate::error::{DispersionError, Result, RunError, Stage, StageContext};
use crate::grid::GridHierarchy;
use crate::interpolation::FieldInterpolator;
use crate::met::{FieldRequirements, FieldStore, MetReader};
use crate::core_types::Vec3;
use crate::output::{ConcentrationGrid, DepositionKind, OutputFrame, OutputWriter, ParticleRecord, ReceptorSet};
use crate::particles::{DomainFill, ParticleEnsemble, ReleaseGroup, TerminationReason};
use rayon::prelude::*;
use tracing::{debug, info, warn};

// ============================================================================
// TIME TOLERANCES
// ============================================================================

/// Slack when comparing simulation times against cadences (s).
const TIME_EPSILON: f64 = 1.0e-9;

/// Where the time manager is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Stepping,
    Output,
    Terminated,
}

/// What one STEPPING transition did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepReport {
    /// Simulation time at the end of the step (s).
    pub time: f64,
    pub dt: f64,
    pub released: usize,
    pub active: usize,
    pub left_domain: usize,
    /// Particles retired for age, mass or numerics.
    pub retired: usize,
    pub convection: Option<ConvectionSummary>,
    pub sampled: bool,
}

/// End-of-run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub end_time: f64,
    pub particles_released: u64,
    pub particles_active: usize,
    pub outputs: usize,
    pub convection_events: u64,
    pub met_refreshes: usize,
    pub budget: MassBudget,
    /// Largest relative budget error over species at the end of the run.
    pub relative_mass_error: f64,
}

/// Owns every piece of run state and advances it.
pub struct TimeManager {
    config: RunConfig,
    reader: Box<dyn MetReader>,
    hierarchy: GridHierarchy,
    store: Option<FieldStore>,
    ensemble: ParticleEnsemble,
    releases: Vec<ReleaseGroup>,
    domain_fill: Option<DomainFill>,
    grids: Vec<ConcentrationGrid>,
    receptors: ReceptorSet,
    convection: ConvectiveRedistributor,
    budget: MassBudget,
    /// Settling velocity per species (m/s).
    settling: Vec<f64>,
    state: RunState,
    time: f64,
    step: u64,
    window_start: f64,
    next_sample: f64,
    next_output: f64,
    outputs: usize,
    window_samples: usize,
}

impl TimeManager {
    /// Validate the configuration and build the run state. Meteorology is
    /// loaded by the INIT transition.
    pub fn new(config: RunConfig, reader: Box<dyn MetReader>) -> std::result::Result<Self, RunError> {
        let start = config.start;
        config.validate().at_stage(Stage::Init, start)?;
        let projection = config.domain.projection.build();
        let hierarchy = GridHierarchy::new(config.domain.grids.clone(), projection).at_stage(Stage::Init, start)?;

        let species_count = config.species.len();
        let releases = config
            .releases
            .iter()
            .enumerate()
            .map(|(index, release)| ReleaseGroup::new(index, release.clone(), hierarchy.projection().as_ref(), config.seed))
            .collect();
        let domain_fill = config
            .domain_fill
            .clone()
            .map(|fill| DomainFill::new(config.releases.len(), fill, config.seed));
        let grids = config
            .output_grids
            .iter()
            .map(|spec| {
                let grid = ConcentrationGrid::new(spec.clone(), species_count, config.output.age_classes.clone());
                if config.output.fluxes {
                    grid.with_fluxes()
                } else {
                    grid
                }
            })
            .collect();
        let half_width = config.output.receptor_half_width;
        let receptors = ReceptorSet::new(
            config.receptors.clone(),
            species_count,
            (half_width, half_width),
            config.output.receptor_layer_depth,
        );
        let settling = config
            .species
            .iter()
            .map(|s| species_settling_velocity(&s.dry_deposition))
            .collect();

        Ok(Self {
            ensemble: ParticleEnsemble::new(species_count, config.seed),
            convection: ConvectiveRedistributor::new(config.convection.clone(), config.seed),
            budget: MassBudget::new(species_count),
            next_sample: start + config.output.sample_interval,
            next_output: start + config.output.interval,
            window_start: start,
            time: start,
            step: 0,
            outputs: 0,
            window_samples: 0,
            state: RunState::Init,
            store: None,
            settling,
            releases,
            domain_fill,
            grids,
            receptors,
            hierarchy,
            reader,
            config,
        })
    }

    /// Fields the configured physics reads.
    pub fn requirements(config: &RunConfig) -> FieldRequirements {
        let species = &config.species;
        let mut req = FieldRequirements::transport();
        if config.turbulence.enabled || config.deposition.needs_dry(species) {
            req = req.with_turbulence();
        }
        if config.deposition.needs_dry(species) {
            req = req.with_dry_deposition();
        }
        if config.deposition.needs_wet(species) {
            req = req.with_wet_deposition();
        }
        if config.convection.enabled {
            req = req.with_convection();
        }
        req
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> &GridHierarchy {
        &self.hierarchy
    }

    /// Field brackets; `None` before INIT.
    pub fn store(&self) -> Option<&FieldStore> {
        self.store.as_ref()
    }

    pub fn ensemble(&self) -> &ParticleEnsemble {
        &self.ensemble
    }

    pub fn budget(&self) -> &MassBudget {
        &self.budget
    }

    pub fn concentration_grids(&self) -> &[ConcentrationGrid] {
        &self.grids
    }

    pub fn receptors(&self) -> &ReceptorSet {
        &self.receptors
    }

    /// Statistics per release group; the domain fill is the last group.
    pub fn plume_statistics(&self) -> Vec<PlumeStatistics> {
        let groups = self.releases.len() + usize::from(self.domain_fill.is_some());
        PlumeStatistics::compute(&self.ensemble, groups)
    }

    /// INIT: load the snapshots bracketing the start time.
    pub fn initialize(&mut self) -> std::result::Result<(), RunError> {
        if self.state != RunState::Init {
            return Ok(());
        }
        let requirements = Self::requirements(&self.config);
        let store = FieldStore::load(
            &self.hierarchy,
            self.reader.as_mut(),
            self.time,
            requirements,
            self.config.derived.clone(),
        )
        .at_stage(Stage::Init, self.time)?;
        if let Some(fill) = self.domain_fill.as_mut() {
            let interp = FieldInterpolator::new(&self.hierarchy, &store);
            let filled = fill.fill(&interp, self.time, &mut self.ensemble).at_stage(Stage::Init, self.time)?;
            self.budget.add_released(&filled.mass);
            info!(
                "Domain filled with {} particles of {:.3e} kg air each",
                filled.particles,
                fill.air_mass_per_particle()
            );
        }
        self.store = Some(store);
        self.state = RunState::Stepping;
        info!(
            "Run initialised: {} grid(s), {} species, {} release group(s), {} output grid(s), {} receptor(s), [{}, {}]s with dt={}s",
            self.hierarchy.len(),
            self.config.species.len(),
            self.releases.len(),
            self.grids.len(),
            self.receptors.len(),
            self.config.start,
            self.config.end,
            self.config.dt
        );
        Ok(())
    }

    /// Perform whichever transition the current state calls for.
    pub fn advance(&mut self, writer: &mut dyn OutputWriter) -> std::result::Result<RunState, RunError> {
        match self.state {
            RunState::Init => self.initialize()?,
            RunState::Stepping => {
                self.step()?;
            }
            RunState::Output => self.flush(writer)?,
            RunState::Terminated => {}
        }
        Ok(self.state)
    }

    /// Run to the end time.
    pub fn run(&mut self, writer: &mut dyn OutputWriter) -> std::result::Result<RunSummary, RunError> {
        while self.advance(writer)? != RunState::Terminated {}
        let summary = self.summary();
        info!(
            "Run finished at t={}s after {} steps: {} particles released, {} active, {} outputs, mass error {:.2e}",
            summary.end_time,
            summary.steps,
            summary.particles_released,
            summary.particles_active,
            summary.outputs,
            summary.relative_mass_error
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        let airborne = self.ensemble.airborne_mass();
        RunSummary {
            steps: self.step,
            end_time: self.time,
            particles_released: self.ensemble.spawned_count(),
            particles_active: self.ensemble.active_count(),
            outputs: self.outputs,
            convection_events: self.convection.events(),
            met_refreshes: self.store.as_ref().map_or(0, FieldStore::refresh_count),
            relative_mass_error: self.budget.relative_error(&airborne),
            budget: self.budget.clone(),
        }
    }

    /// One STEPPING transition.
    pub fn step(&mut self) -> std::result::Result<StepReport, RunError> {
        if self.state == RunState::Init {
            self.initialize()?;
        }
        if self.state != RunState::Stepping {
            return Ok(StepReport {
                time: self.time,
                ..StepReport::default()
            });
        }
        let t0 = self.time;
        let dt = self.config.dt.min(self.config.end - t0);
        let t1 = t0 + dt;
        let mut report = StepReport {
            time: t1,
            dt,
            ..StepReport::default()
        };

        let Some(store) = self.store.as_mut() else {
            return Err(RunError::new(
                Stage::FieldRefresh,
                t0,
                DispersionError::invalid_config("field store missing after INIT"),
            ));
        };
        store
            .refresh(&self.hierarchy, self.reader.as_mut(), t0)
            .at_stage(Stage::FieldRefresh, t0)?;

        for group in &mut self.releases {
            let released = group.release(t0, &mut self.ensemble);
            if released.particles > 0 {
                debug!("Release group '{}': {} particles at t={t0}s", group.config.name, released.particles);
                self.budget.add_released(&released.mass);
                report.released += released.particles;
            }
        }
        if let (Some(fill), Some(store)) = (self.domain_fill.as_mut(), self.store.as_ref()) {
            let interp = FieldInterpolator::new(&self.hierarchy, store);
            let entered = fill.inflow(&interp, t0, dt, &mut self.ensemble).at_stage(Stage::Release, t0)?;
            if entered.particles > 0 {
                debug!("Boundary inflow: {} particles at t={t0}s", entered.particles);
                self.budget.add_released(&entered.mass);
                report.released += entered.particles;
            }
        }

        // transport never integrates across a snapshot time: split there and refresh
        let mut t = t0;
        loop {
            let boundary = self.store.as_ref().and_then(|store| store.next_boundary(t + TIME_EPSILON));
            let segment_end = boundary.filter(|&b| b < t1 - TIME_EPSILON).unwrap_or(t1);
            let starts: Option<Vec<Vec3>> = self
                .config
                .output
                .fluxes
                .then(|| self.ensemble.particles().iter().map(|p| p.position).collect());
            let outcomes = self.transport(t, segment_end - t).at_stage(Stage::Transport, t)?;
            self.credit(&outcomes, &mut report);
            if let Some(starts) = starts {
                self.record_fluxes(&starts, &outcomes);
            }
            if segment_end >= t1 {
                break;
            }
            debug!("Step [{t0}, {t1}]s split at snapshot time {segment_end}s");
            t = segment_end;
            if let Some(store) = self.store.as_mut() {
                store
                    .refresh(&self.hierarchy, self.reader.as_mut(), t)
                    .at_stage(Stage::FieldRefresh, t)?;
            }
        }

        if let Some(store) = self.store.as_ref() {
            report.convection = self
                .convection
                .maybe_run(&mut self.ensemble, &self.hierarchy, store, t0, self.step)
                .at_stage(Stage::Convection, t0)?;
        }

        if t1 >= self.next_sample - TIME_EPSILON {
            self.sample();
            report.sampled = true;
            while self.next_sample <= t1 + TIME_EPSILON {
                self.next_sample += self.config.output.sample_interval;
            }
        }

        let airborne = self.ensemble.airborne_mass();
        if let Err(err) = self.budget.check(&airborne, self.config.mass_tolerance) {
            if self.config.strict_mass_balance {
                return Err(RunError::new(Stage::Deposition, t1, err));
            }
            warn!("t={t1}s: {err}");
        }

        self.time = t1;
        self.step += 1;
        report.active = self.ensemble.active_count();
        debug!(
            "Step {} to t={t1}s: {} released, {} active, {} left domain, {} retired",
            self.step, report.released, report.active, report.left_domain, report.retired
        );
        if t1 >= self.next_output - TIME_EPSILON || t1 >= self.config.end - TIME_EPSILON {
            self.state = RunState::Output;
        }
        Ok(report)
    }

    /// Credit removed mass to the budget and deposition grids, and count
    /// terminations.
    fn credit(&mut self, outcomes: &[ParticleOutcome], report: &mut StepReport) {
        for outcome in outcomes {
            self.budget.add_removed(&outcome.removed);
            for grid in &mut self.grids {
                let (x, y) = (outcome.position.x, outcome.position.y);
                for (species, (&dry, &wet)) in outcome.removed.dry.iter().zip(&outcome.removed.wet).enumerate() {
                    if dry > 0.0 {
                        grid.add_deposition(DepositionKind::Dry, species, x, y, dry);
                    }
                    if wet > 0.0 {
                        grid.add_deposition(DepositionKind::Wet, species, x, y, wet);
                    }
                }
            }
            if let Some((reason, mass)) = &outcome.terminated {
                if *reason == TerminationReason::LeftDomain {
                    self.budget.add_outflow(mass);
                    report.left_domain += 1;
                } else {
                    self.budget.add_retired(mass);
                    report.retired += 1;
                }
            }
        }
    }

    /// Credit every particle's displacement to the output-grid face fluxes.
    /// `starts` and `outcomes` are in ensemble order.
    fn record_fluxes(&mut self, starts: &[Vec3], outcomes: &[ParticleOutcome]) {
        let particles = self.ensemble.particles();
        for ((particle, from), outcome) in particles.iter().zip(starts).zip(outcomes) {
            let mass = match &outcome.terminated {
                Some((_, carried)) => carried.as_slice(),
                None if particle.is_active() => particle.mass.as_slice(),
                None => continue,
            };
            for grid in &mut self.grids {
                grid.record_flux(from, &particle.position, mass);
            }
        }
    }

    /// Per-particle pipeline over the worker pool.
    fn transport(&mut self, t0: f64, dt: f64) -> Result<Vec<ParticleOutcome>> {
        let Some(store) = self.store.as_ref() else {
            return Ok(Vec::new());
        };
        let ctx = StepContext::new(
            FieldInterpolator::new(&self.hierarchy, store),
            &self.config,
            &self.settling,
            t0,
            dt,
        );
        self.ensemble
            .particles_mut()
            .par_iter_mut()
            .map(|particle| step_particle(&ctx, particle))
            .collect()
    }

    fn sample(&mut self) {
        let particles = self.ensemble.particles();
        for grid in &mut self.grids {
            let tally = grid.accumulate(particles, &self.config.output.bandwidth);
            debug!(
                "Sampled grid '{}': {} particles, {:?} kg",
                grid.spec().name,
                tally.particles,
                tally.mass
            );
        }
        self.receptors.accumulate(particles);
        self.window_samples += 1;
    }

    /// OUTPUT: flush the window, reset accumulators and compact the ensemble.
    pub fn flush(&mut self, writer: &mut dyn OutputWriter) -> std::result::Result<(), RunError> {
        if self.state != RunState::Output {
            return Ok(());
        }
        if self.window_samples == 0 {
            // short final window: take one sample at its end
            self.sample();
        }
        let frame = OutputFrame {
            window_start: self.window_start,
            window_end: self.time,
            grids: self.grids.iter().map(ConcentrationGrid::frame).collect(),
            receptors: self.receptors.frame(),
            particles: if self.config.output.particle_dump {
                ParticleRecord::collect(self.ensemble.particles(), self.hierarchy.projection().as_ref())
            } else {
                Vec::new()
            },
        };
        writer
            .write(&frame)
            .map_err(|e| match e {
                DispersionError::WriteFailure(_) => e,
                other => DispersionError::WriteFailure(other.to_string()),
            })
            .at_stage(Stage::Output, self.time)?;
        self.outputs += 1;
        info!(
            "Output {} for window [{}, {}]s: {} grid(s), {} receptor(s), {} samples",
            self.outputs,
            frame.window_start,
            frame.window_end,
            frame.grids.len(),
            frame.receptors.len(),
            self.window_samples
        );

        for grid in &mut self.grids {
            grid.reset_window();
        }
        self.receptors.reset_window();
        self.window_samples = 0;
        self.window_start = self.time;
        while self.next_output <= self.time + TIME_EPSILON {
            self.next_output += self.config.output.interval;
        }
        let dropped = self.ensemble.compact();
        if dropped > 0 {
            debug!("Compacted ensemble: {dropped} terminated particles dropped");
        }
        for stats in self.plume_statistics().iter().filter(|s| s.particles > 0) {
            info!(
                "Plume {}: {} particles, {:.3e} kg, centre ({:.0}, {:.0}, {:.0}) m, spread {:.0} m / {:.0} m",
                stats.release_group,
                stats.particles,
                stats.mass,
                stats.centroid.x,
                stats.centroid.y,
                stats.centroid.z,
                stats.horizontal_spread,
                stats.vertical_spread
            );
        }

        self.state = if self.time >= self.config.end - TIME_EPSILON {
            RunState::Terminated
        } else {
            RunState::Stepping
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::SpeciesProperties;
    use crate::grid::GridSpec;
    use crate::met::{SyntheticReader, UniformAtmosphere};
    use crate::output::{MemoryWriter, OutputGridSpec};
    use crate::particles::{DomainFillConfig, ReleaseGroupConfig};
    use crate::turbulence::TurbulenceOptions;
    use approx::assert_relative_eq;

    fn grid() -> GridSpec {
        GridSpec::new("base", (0.0, 0.0), (1000.0, 1000.0), (21, 21), vec![0.0, 100.0, 500.0, 2000.0, 5000.0])
    }

    fn config() -> RunConfig {
        RunConfig {
            start: 0.0,
            end: 1800.0,
            dt: 60.0,
            turbulence: TurbulenceOptions::disabled(),
            domain: DomainConfig {
                grids: vec![grid()],
                ..DomainConfig::default()
            },
            species: vec![SpeciesProperties::passive("tracer")],
            releases: vec![ReleaseGroupConfig::point("stack", 0.0, Vec3::new(2000.0, 10_000.0, 100.0), 10.0, 50)],
            output_grids: vec![OutputGridSpec::new(
                "out",
                (0.0, 0.0),
                (500.0, 500.0),
                (40, 40),
                vec![200.0, 1000.0],
            )],
            output: OutputOptions {
                interval: 900.0,
                sample_interval: 300.0,
                ..OutputOptions::default()
            },
            strict_mass_balance: true,
            ..RunConfig::default()
        }
    }

    fn manager(config: RunConfig) -> TimeManager {
        let reader = SyntheticReader::uniform(vec![grid()], vec![0.0, 3600.0], UniformAtmosphere::default());
        TimeManager::new(config, Box::new(reader)).unwrap()
    }

    #[test]
    fn state_machine_visits_output_and_terminates() {
        let mut tm = manager(config());
        let mut writer = MemoryWriter::new();
        assert_eq!(tm.state(), RunState::Init);
        assert_eq!(tm.advance(&mut writer).unwrap(), RunState::Stepping);
        let mut saw_output = false;
        while tm.state() != RunState::Terminated {
            saw_output |= tm.advance(&mut writer).unwrap() == RunState::Output;
        }
        assert!(saw_output);
        assert_eq!(writer.frames.len(), 2);
        assert_eq!(writer.frames[0].window_end, 900.0);
        assert_eq!(writer.frames[1].window_start, 900.0);
        assert_eq!(tm.time(), 1800.0);
        assert_eq!(tm.steps(), 30);
        // terminated is absorbing
        assert_eq!(tm.advance(&mut writer).unwrap(), RunState::Terminated);
        assert_eq!(tm.steps(), 30);
    }

    #[test]
    fn plume_moves_with_the_wind() {
        let mut tm = manager(config());
        let summary = tm.run(&mut MemoryWriter::new()).unwrap();
        assert_eq!(summary.particles_released, 50);
        let stats = tm.plume_statistics();
        assert!((stats[0].centroid.x - (2000.0 + 5.0 * 1800.0)).abs() < 1e-6);
        assert!(stats[0].horizontal_spread < 1e-6);
        assert!(summary.relative_mass_error < 1e-12);
    }

    #[test]
    fn step_across_a_snapshot_time_follows_the_changing_wind() {
        // u = 10·t/3600 m/s, snapshots every hour
        let reader = SyntheticReader::new(vec![grid()], vec![0.0, 3600.0, 7200.0], |id, spec, time| {
            UniformAtmosphere {
                wind: Vec3::new(10.0 * time / 3600.0, 0.0, 0.0),
                ..UniformAtmosphere::default()
            }
            .snapshot(id, spec, time)
        });
        let c = RunConfig {
            end: 4000.0,
            dt: 1000.0,
            releases: vec![ReleaseGroupConfig::point("stack", 3000.0, Vec3::new(2000.0, 10_000.0, 100.0), 1.0, 1)],
            output_grids: Vec::new(),
            output: OutputOptions {
                interval: 4000.0,
                sample_interval: 1000.0,
                ..OutputOptions::default()
            },
            ..config()
        };
        let mut tm = TimeManager::new(c, Box::new(reader)).unwrap();
        let summary = tm.run(&mut MemoryWriter::new()).unwrap();
        assert_eq!(summary.steps, 4);
        assert_eq!(summary.met_refreshes, 1);
        assert_eq!(tm.store().unwrap().window(), (3600.0, 7200.0));

        let exact = 2000.0 + 10.0 / 7200.0 * (4000.0_f64.powi(2) - 3000.0_f64.powi(2));
        let x = tm.ensemble().particles()[0].position.x;
        assert!((x - exact).abs() < 1e-6, "x = {x}, exact = {exact}");
    }

    #[test]
    fn domain_fill_stays_full_under_boundary_inflow() {
        let c = RunConfig {
            releases: Vec::new(),
            domain_fill: Some(DomainFillConfig {
                particle_count: 1000,
                top: 2000.0,
                layers: 4,
                mixing_ratio: vec![1.0e-9],
                boundary_inflow: true,
            }),
            ..config()
        };
        let mut tm = manager(c);
        tm.initialize().unwrap();
        assert_eq!(tm.ensemble().len(), 1000);
        let filled = tm.budget().released[0];
        assert!(filled > 0.0);
        assert_relative_eq!(tm.ensemble().airborne_mass()[0], filled, max_relative = 1e-12);

        let summary = tm.run(&mut MemoryWriter::new()).unwrap();
        // 5 m/s across a 20 km domain for 1800 s replaces about 45% of the air
        assert!(summary.particles_released > 1300, "{}", summary.particles_released);
        assert!(summary.budget.outflow[0] > 0.3 * filled);
        let airborne = tm.ensemble().airborne_mass()[0];
        assert!((airborne - filled).abs() < 0.15 * filled, "{airborne} vs {filled}");
        assert!(summary.relative_mass_error < 1e-9);
        let stats = tm.plume_statistics();
        assert_eq!(stats.len(), 1);
        assert!(stats[0].particles > 850);
    }

    #[test]
    fn face_fluxes_and_particle_dump_reach_the_writer() {
        let mut c = config();
        c.output.fluxes = true;
        c.output.particle_dump = true;
        let mut tm = manager(c);
        let mut writer = MemoryWriter::new();
        tm.run(&mut writer).unwrap();

        let first = &writer.frames[0];
        assert_eq!(first.particles.len(), 50);
        assert!(first.particles.iter().all(|r| (r.position.x - (2000.0 + 5.0 * 900.0)).abs() < 1e-6));
        assert!(first.particles.iter().all(|r| r.mass.len() == 1 && r.longitude.is_finite()));

        // 10 kg moving east across the 500 m faces between x = 2000 and 6500 m
        let fluxes = first.grids[0].fluxes.as_ref().unwrap();
        let east: f64 = fluxes.east.iter().sum();
        assert!(east >= 80.0 - 1e-9 && east <= 90.0 + 1e-9, "{east}");
        assert_eq!(fluxes.west.iter().sum::<f64>(), 0.0);
        assert_eq!(fluxes.north.iter().sum::<f64>() + fluxes.south.iter().sum::<f64>(), 0.0);
        let spec = &tm.config().output_grids[0];
        assert_relative_eq!(fluxes.east[spec.index_3d(5, 20, 0)], 10.0, epsilon = 1e-9);

        let mut quiet = manager(config());
        let mut plain = MemoryWriter::new();
        quiet.run(&mut plain).unwrap();
        assert!(plain.frames[0].particles.is_empty());
        assert!(plain.frames[0].grids[0].fluxes.is_none());
    }

    #[test]
    fn invalid_configuration_fails_at_init() {
        let mut c = config();
        c.dt = -1.0;
        let reader = SyntheticReader::uniform(vec![grid()], vec![0.0, 3600.0], UniformAtmosphere::default());
        let err = TimeManager::new(c, Box::new(reader)).err().unwrap();
        assert_eq!(err.stage, Stage::Init);
        assert!(matches!(err.source, DispersionError::InvalidConfig(_)));
    }

    #[test]
    fn missing_meteorology_names_the_refresh_stage() {
        let mut c = config();
        c.end = 7200.0;
        let mut tm = manager(c);
        let err = tm.run(&mut MemoryWriter::new()).unwrap_err();
        assert_eq!(err.stage, Stage::FieldRefresh);
        assert!(err.time > 3600.0 - 1.0);
        assert!(matches!(err.source, DispersionError::TimeNotFound { .. }));
    }

    #[test]
    fn write_failures_abort_with_output_stage() {
        struct Failing;
        impl OutputWriter for Failing {
            fn write(&mut self, _frame: &OutputFrame) -> Result<()> {
                Err(DispersionError::WriteFailure("disk full".into()))
            }
        }
        let mut tm = manager(config());
        let err = tm.run(&mut Failing).unwrap_err();
        assert_eq!(err.stage, Stage::Output);
        assert_eq!(err.time, 900.0);
    }
}
