//! Per-particle stage functions
//!
//! One STEPPING transition runs, for every active particle,
//!
//! ```text
//! interpolate → perturb → advect → deposit → termination checks
//! ```
//!
//! Each stage reads the shared field view through [`StepContext`] and only
//! mutates the particle it is given, so the whole chain runs on the worker
//! pool without locks. Conditions local to one particle (leaving the domain,
//! degenerate numerics) retire that particle; missing meteorology aborts.

use super::config::{Integrator, RunConfig};
use crate::core_types::Vec3;
use crate::deposition::{self, RemovedMass};
use crate::error::{DispersionError, Result};
use crate::interpolation::{BoundaryLayerProfile, FieldInterpolator, Location, PrecipitationSample};
use crate::particles::{Particle, TerminationReason};
use crate::turbulence::{self, Regime, TurbulenceUpdate};
use tracing::debug;

/// Read-only inputs shared by every particle of one step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub interp: FieldInterpolator<'a>,
    pub config: &'a RunConfig,
    /// Settling velocity per species (m/s, positive downward).
    pub settling: &'a [f64],
    /// Start of the step (s).
    pub time: f64,
    pub dt: f64,
    /// Whether boundary-layer parameters are sampled (turbulence or dry deposition).
    pub needs_profile: bool,
    /// Whether precipitation is sampled (wet deposition).
    pub needs_precipitation: bool,
}

impl<'a> StepContext<'a> {
    pub fn new(interp: FieldInterpolator<'a>, config: &'a RunConfig, settling: &'a [f64], time: f64, dt: f64) -> Self {
        let species = &config.species;
        Self {
            interp,
            config,
            settling,
            time,
            dt,
            needs_profile: config.turbulence.enabled || config.deposition.needs_dry(species),
            needs_precipitation: config.deposition.needs_wet(species),
        }
    }
}

/// Fields sampled at a particle's position at the start of the step.
#[derive(Debug, Clone)]
pub struct ParticleEnvironment {
    pub location: Location,
    pub wind: Vec3,
    pub profile: Option<BoundaryLayerProfile>,
    pub precipitation: Option<PrecipitationSample>,
}

/// What one particle step hands back to the time manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleOutcome {
    /// Mass removed by decay and deposition this step.
    pub removed: RemovedMass,
    /// Where removed mass is credited (end of step).
    pub position: Vec3,
    /// Set when the particle was retired, with the mass it still carried.
    pub terminated: Option<(TerminationReason, Vec<f64>)>,
    pub regime: Option<Regime>,
}

impl ParticleOutcome {
    fn idle(species_count: usize, position: Vec3) -> Self {
        Self {
            removed: RemovedMass::zeros(species_count),
            position,
            terminated: None,
            regime: None,
        }
    }
}

/// Sample everything the stages need at `point` and `time`.
pub fn interpolate(ctx: &StepContext<'_>, point: &Vec3, time: f64) -> Result<ParticleEnvironment> {
    let location = ctx.interp.locate(point)?;
    let wind = ctx.interp.wind_at(&location, time)?;
    let profile = if ctx.needs_profile {
        Some(ctx.interp.profile_at(&location, time, point)?)
    } else {
        None
    };
    let precipitation = if ctx.needs_precipitation {
        Some(ctx.interp.precipitation_at(&location, time)?)
    } else {
        None
    };
    Ok(ParticleEnvironment {
        location,
        wind,
        profile,
        precipitation,
    })
}

/// Advance the particle's turbulent velocity over the step.
///
/// Fresh particles first draw a velocity from the local variance. Returns
/// `None` when turbulence is off or the profile is not sampled.
pub fn perturb(ctx: &StepContext<'_>, particle: &mut Particle, env: &ParticleEnvironment) -> Option<TurbulenceUpdate> {
    let options = &ctx.config.turbulence;
    let profile = env.profile.as_ref().filter(|_| options.enabled)?;
    let z = particle.position.z;
    if particle.fresh {
        particle.turbulent_velocity = turbulence::initial_velocity(z, profile, options, particle.rng());
        particle.fresh = false;
    }
    let velocity = particle.turbulent_velocity;
    let update = turbulence::perturb(velocity, z, profile, ctx.dt, options, particle.rng());
    particle.turbulent_velocity = update.velocity;
    Some(update)
}

/// Number of mean-wind sub-steps for a displacement `speed·dt` on a grid of
/// spacing `min_spacing`, at height `z`.
pub fn substep_count(config: &RunConfig, speed: f64, dt: f64, min_spacing: f64, z: f64) -> usize {
    let sub = &config.substepping;
    let limit = sub.max_cell_fraction * min_spacing;
    let mut n = if limit > 0.0 {
        (speed * dt / limit).ceil() as usize
    } else {
        1
    };
    if z < sub.near_surface_depth {
        n = n.max(sub.near_surface_substeps);
    }
    n.clamp(1, sub.max_substeps)
}

/// Mass-weighted settling velocity of a particle (m/s).
fn settling_of(ctx: &StepContext<'_>, particle: &Particle) -> f64 {
    let total = particle.total_mass();
    if total <= 0.0 {
        return 0.0;
    }
    particle.mass.iter().zip(ctx.settling).map(|(m, v)| m * v).sum::<f64>() / total
}

#[inline]
fn reflect_ground(mut p: Vec3) -> Vec3 {
    if p.z < 0.0 {
        p.z = -p.z;
    }
    p
}

fn wind_at_point(ctx: &StepContext<'_>, point: &Vec3, time: f64) -> Result<Vec3> {
    let location = ctx.interp.locate(point)?;
    ctx.interp.wind_at(&location, time)
}

/// End-of-step position: sub-stepped mean-wind displacement, then the
/// turbulent displacement and gravitational settling, reflected at the ground.
pub fn advect(
    ctx: &StepContext<'_>,
    particle: &Particle,
    env: &ParticleEnvironment,
    update: Option<&TurbulenceUpdate>,
) -> Result<Vec3> {
    let (dx, dy) = ctx.interp.spacing(&env.location);
    let speed = env.wind.x.hypot(env.wind.y);
    let n = substep_count(ctx.config, speed, ctx.dt, dx.min(dy), particle.position.z);
    let h = ctx.dt / n as f64;

    let mut position = particle.position;
    let mut time = ctx.time;
    for i in 0..n {
        let u0 = if i == 0 {
            env.wind
        } else {
            wind_at_point(ctx, &position, time)?
        };
        let predicted = reflect_ground(position + u0 * h);
        position = match ctx.config.integrator {
            Integrator::Euler => predicted,
            Integrator::Petterssen => match wind_at_point(ctx, &predicted, time + h) {
                Ok(u1) => reflect_ground(position + (u0 + u1) * (0.5 * h)),
                // corrector left the domain: keep the predictor
                Err(e) if e.is_particle_local() => {
                    debug!("Particle {} keeps the Euler predictor: {}", particle.id, e);
                    predicted
                }
                Err(e) => return Err(e),
            },
        };
        time += h;
    }

    if let Some(update) = update {
        position.x += update.velocity.x * ctx.dt;
        position.y += update.velocity.y * ctx.dt;
        position.z += update.vertical_displacement;
    }
    position.z -= settling_of(ctx, particle) * ctx.dt;
    let position = reflect_ground(position);
    if position.iter().all(|c| c.is_finite()) {
        Ok(position)
    } else {
        Err(DispersionError::NumericDegenerate {
            context: "advection".into(),
            detail: format!("particle {} moved to a non-finite position", particle.id),
        })
    }
}

/// Decay, wet and dry removal at the particle's current position.
pub fn deposit(ctx: &StepContext<'_>, particle: &mut Particle, env: &ParticleEnvironment) -> RemovedMass {
    let (x, y) = (particle.position.x, particle.position.y);
    let land_use = ctx.config.derived.land_use.as_ref().map(|map| map.fractions_at(x, y));
    deposition::deposit(
        particle,
        &ctx.config.species,
        env.profile.as_ref(),
        land_use,
        env.precipitation.as_ref(),
        ctx.dt,
        &ctx.config.deposition,
    )
}

fn reason_for(err: &DispersionError) -> TerminationReason {
    match err {
        DispersionError::OutOfDomain { .. } => TerminationReason::LeftDomain,
        _ => TerminationReason::NumericFailure,
    }
}

fn retire(particle: &mut Particle, reason: TerminationReason) -> Option<(TerminationReason, Vec<f64>)> {
    particle.terminate(reason);
    Some((reason, particle.take_mass()))
}

/// Run the full stage chain on one particle.
///
/// Errors are returned only for run-fatal conditions.
pub fn step_particle(ctx: &StepContext<'_>, particle: &mut Particle) -> Result<ParticleOutcome> {
    let mut outcome = ParticleOutcome::idle(ctx.config.species.len(), particle.position);
    if !particle.is_active() {
        return Ok(outcome);
    }

    let moved = interpolate(ctx, &particle.position, ctx.time).and_then(|env| {
        let update = perturb(ctx, particle, &env);
        let end = advect(ctx, particle, &env, update.as_ref())?;
        let grid = ctx.interp.locate(&end)?.grid;
        Ok((env, update, end, grid))
    });
    let (env, update, end, grid) = match moved {
        Ok(moved) => moved,
        Err(e) if e.is_particle_local() => {
            outcome.terminated = retire(particle, reason_for(&e));
            return Ok(outcome);
        }
        Err(e) => return Err(e),
    };

    particle.position = end;
    particle.grid = Some(grid);
    outcome.position = end;
    outcome.regime = update.map(|u| u.regime);
    outcome.removed = deposit(ctx, particle, &env);
    particle.age += ctx.dt;

    let termination = &ctx.config.termination;
    if termination.max_age.is_some_and(|max| particle.age >= max) {
        outcome.terminated = retire(particle, TerminationReason::MaxAge);
    } else if particle.total_mass() <= termination.negligible_mass_fraction * particle.initial_mass {
        outcome.terminated = retire(particle, TerminationReason::NegligibleMass);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::SpeciesProperties;
    use crate::grid::{GridHierarchy, GridSpec, PlaneProjection};
    use crate::met::{DerivedOptions, FieldRequirements, FieldStore, SyntheticReader, UniformAtmosphere};
    use crate::particles::ParticleId;
    use crate::simulation::config::DomainConfig;
    use crate::turbulence::TurbulenceOptions;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn grid() -> GridSpec {
        GridSpec::new("base", (0.0, 0.0), (1000.0, 1000.0), (21, 21), vec![0.0, 100.0, 500.0, 2000.0, 5000.0])
    }

    fn setup(atmosphere: UniformAtmosphere) -> (GridHierarchy, FieldStore) {
        let hierarchy = GridHierarchy::new(vec![grid()], Arc::new(PlaneProjection::new(0.0, 45.0))).unwrap();
        let mut reader = SyntheticReader::uniform(vec![grid()], vec![0.0, 3600.0], atmosphere);
        let store = FieldStore::load(
            &hierarchy,
            &mut reader,
            0.0,
            FieldRequirements::transport().with_turbulence(),
            DerivedOptions::default(),
        )
        .unwrap();
        (hierarchy, store)
    }

    fn config(turbulence: TurbulenceOptions) -> RunConfig {
        RunConfig {
            turbulence,
            domain: DomainConfig {
                grids: vec![grid()],
                ..DomainConfig::default()
            },
            species: vec![SpeciesProperties::passive("tracer")],
            ..RunConfig::default()
        }
    }

    #[test]
    fn uniform_wind_without_turbulence_is_exact() {
        let (hierarchy, store) = setup(UniformAtmosphere::default());
        let config = config(TurbulenceOptions::disabled());
        let ctx = StepContext::new(FieldInterpolator::new(&hierarchy, &store), &config, &[0.0], 0.0, 60.0);
        let mut p = Particle::new(ParticleId(0), Vec3::new(1000.0, 1000.0, 200.0), vec![1.0], 0, 1);
        let outcome = step_particle(&ctx, &mut p).unwrap();
        assert!(outcome.terminated.is_none());
        assert_relative_eq!(p.position.x, 1300.0, epsilon = 1e-9);
        assert_relative_eq!(p.position.z, 200.0, epsilon = 1e-9);
        assert_eq!(p.age, 60.0);
    }

    #[test]
    fn leaving_the_domain_moves_mass_out() {
        let (hierarchy, store) = setup(UniformAtmosphere::default());
        let config = config(TurbulenceOptions::disabled());
        let ctx = StepContext::new(FieldInterpolator::new(&hierarchy, &store), &config, &[0.0], 0.0, 60.0);
        let mut p = Particle::new(ParticleId(0), Vec3::new(19_900.0, 1000.0, 200.0), vec![2.0], 0, 1);
        let outcome = step_particle(&ctx, &mut p).unwrap();
        let (reason, mass) = outcome.terminated.unwrap();
        assert_eq!(reason, TerminationReason::LeftDomain);
        assert_eq!(mass, vec![2.0]);
        assert!(!p.is_active());
        assert_eq!(p.total_mass(), 0.0);
    }

    #[test]
    fn sub_steps_follow_spacing_and_surface() {
        let config = config(TurbulenceOptions::disabled());
        assert_eq!(substep_count(&config, 0.0, 60.0, 1000.0, 500.0), 1);
        assert_eq!(substep_count(&config, 0.0, 60.0, 1000.0, 10.0), 2);
        assert_eq!(substep_count(&config, 20.0, 60.0, 1000.0, 500.0), 3);
        assert_eq!(substep_count(&config, 1.0e4, 60.0, 1000.0, 500.0), 20);
    }

    #[test]
    fn turbulence_draws_initial_velocity_once() {
        let (hierarchy, store) = setup(UniformAtmosphere::calm());
        let config = config(TurbulenceOptions::default());
        let ctx = StepContext::new(FieldInterpolator::new(&hierarchy, &store), &config, &[0.0], 0.0, 60.0);
        let mut p = Particle::new(ParticleId(3), Vec3::new(5000.0, 5000.0, 300.0), vec![1.0], 0, 9);
        let outcome = step_particle(&ctx, &mut p).unwrap();
        assert!(!p.fresh);
        assert!(outcome.regime.is_some());
        assert!(p.position.z >= 0.0);
        assert!(p.position.x != 5000.0);
    }

    #[test]
    fn settling_lowers_heavy_particles() {
        let (hierarchy, store) = setup(UniformAtmosphere::calm());
        let config = config(TurbulenceOptions::disabled());
        let ctx = StepContext::new(FieldInterpolator::new(&hierarchy, &store), &config, &[0.5], 0.0, 60.0);
        let mut p = Particle::new(ParticleId(0), Vec3::new(5000.0, 5000.0, 300.0), vec![1.0], 0, 1);
        step_particle(&ctx, &mut p).unwrap();
        assert_relative_eq!(p.position.z, 270.0, epsilon = 1e-9);
    }

    #[test]
    fn max_age_retires_particles() {
        let (hierarchy, store) = setup(UniformAtmosphere::calm());
        let mut config = config(TurbulenceOptions::disabled());
        config.termination.max_age = Some(60.0);
        let ctx = StepContext::new(FieldInterpolator::new(&hierarchy, &store), &config, &[0.0], 0.0, 60.0);
        let mut p = Particle::new(ParticleId(0), Vec3::new(5000.0, 5000.0, 300.0), vec![1.0], 0, 1);
        let outcome = step_particle(&ctx, &mut p).unwrap();
        assert_eq!(outcome.terminated.map(|t| t.0), Some(TerminationReason::MaxAge));
    }

    #[test]
    fn dry_removal_follows_the_land_use_under_the_particle() {
        use crate::core_types::{DryDepositionParams, GasReactivity};
        use crate::met::{LandUseClass, LandUseFractions, LandUseMap};
        let (hierarchy, store) = setup(UniformAtmosphere::calm());
        let mut config = config(TurbulenceOptions::disabled());
        config.species[0].dry_deposition = DryDepositionParams::Gas {
            diffusivity_ratio: 1.9,
            surface_resistance: 500.0,
            reactivity: Some(GasReactivity {
                henry: 1.0e5,
                reactivity: 0.0,
            }),
        };
        // water west of x = 10 km, city east of it
        config.derived.land_use = Some(LandUseMap {
            origin_x: 0.0,
            origin_y: 0.0,
            dx: 10_000.0,
            dy: 20_000.0,
            nx: 2,
            ny: 1,
            cells: vec![
                LandUseFractions::pure(LandUseClass::Water),
                LandUseFractions::pure(LandUseClass::Urban),
            ],
        });
        let ctx = StepContext::new(FieldInterpolator::new(&hierarchy, &store), &config, &[0.0], 0.0, 600.0);
        let mut over_water = Particle::new(ParticleId(0), Vec3::new(5000.0, 5000.0, 5.0), vec![1.0], 0, 1);
        let mut over_city = Particle::new(ParticleId(1), Vec3::new(15_000.0, 5000.0, 5.0), vec![1.0], 0, 1);
        let water = step_particle(&ctx, &mut over_water).unwrap().removed.dry[0];
        let city = step_particle(&ctx, &mut over_city).unwrap().removed.dry[0];
        assert!(city > 0.0);
        assert!(water > city, "water {water}, city {city}");
    }
}
