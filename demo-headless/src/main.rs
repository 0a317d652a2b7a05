use clap::Parser;
use plume_core::output::LogWriter;
use plume_core::simulation::DomainConfig;
use plume_core::{
    GridSpec, OutputGridSpec, ReceptorSpec, ReleaseGroupConfig, ReleaseRegion, RunConfig, RunState, SpeciesProperties,
    SyntheticReader, TimeManager, UniformAtmosphere, Vec3,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Headless dispersion run over a synthetic atmosphere
#[derive(Parser, Debug)]
#[command(name = "plume-headless")]
#[command(about = "Lagrangian particle dispersion demo", long_about = None)]
struct Args {
    /// TOML scenario with `[run]` and `[atmosphere]` tables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated duration in hours
    #[arg(long, default_value_t = 6)]
    hours: u32,

    /// Time step in seconds
    #[arg(long, default_value_t = 300.0)]
    dt: f64,

    /// Wind speed in m/s
    #[arg(short, long, default_value_t = 5.0)]
    wind_speed: f64,

    /// Direction the wind blows from, degrees (0=North, 90=East)
    #[arg(long, default_value_t = 270.0)]
    wind_direction: f64,

    /// Surface sensible heat flux in W/m²
    #[arg(long, default_value_t = 150.0)]
    heat_flux: f64,

    /// Large-scale precipitation in mm/h
    #[arg(long, default_value_t = 0.0)]
    rain: f64,

    /// Particles per release
    #[arg(short, long, default_value_t = 20_000)]
    particles: usize,

    /// Stack height in metres
    #[arg(long, default_value_t = 80.0)]
    stack_height: f64,

    /// Seed of every random stream
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long, default_value_t = 0)]
    threads: usize,
}

/// On-disk scenario; omitted tables fall back to the built-in scenario.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScenarioFile {
    run: Option<RunConfig>,
    atmosphere: Option<UniformAtmosphere>,
}

// ===== SYNTHETIC DOMAIN =====
const BASE_SPACING: f64 = 2000.0;
const BASE_POINTS: usize = 101;
const NEST_SPACING: f64 = 500.0;
const NEST_POINTS: usize = 81;
const SOURCE: (f64, f64) = (50_000.0, 100_000.0);

fn levels() -> Vec<f64> {
    vec![
        0.0, 25.0, 75.0, 150.0, 300.0, 500.0, 800.0, 1200.0, 1700.0, 2300.0, 3000.0, 4000.0, 5500.0, 7000.0, 9000.0,
        11_000.0, 14_000.0,
    ]
}

fn domain() -> DomainConfig {
    let base = GridSpec::new("base", (0.0, 0.0), (BASE_SPACING, BASE_SPACING), (BASE_POINTS, BASE_POINTS), levels());
    let half = NEST_SPACING * (NEST_POINTS - 1) as f64 / 2.0;
    let nest = GridSpec::new(
        "nest",
        (SOURCE.0 - half / 2.0, SOURCE.1 - half),
        (NEST_SPACING, NEST_SPACING),
        (NEST_POINTS, NEST_POINTS),
        levels(),
    )
    .nested_in(plume_core::GridId(0));
    DomainConfig {
        grids: vec![base, nest],
        ..DomainConfig::default()
    }
}

fn atmosphere(args: &Args) -> UniformAtmosphere {
    // meteorological convention: direction the wind comes from
    let theta = args.wind_direction.to_radians();
    UniformAtmosphere {
        wind: Vec3::new(-args.wind_speed * theta.sin(), -args.wind_speed * theta.cos(), 0.0),
        heat_flux: args.heat_flux,
        large_scale_precipitation: args.rain,
        friction_velocity: None,
        mixing_height: None,
        ..UniformAtmosphere::default()
    }
}

fn builtin_config(args: &Args) -> RunConfig {
    let end = 3600.0 * f64::from(args.hours);
    let mut config = RunConfig {
        end,
        dt: args.dt,
        seed: args.seed,
        domain: domain(),
        species: vec![
            SpeciesProperties {
                half_life: Some(8.02 * 86_400.0),
                ..SpeciesProperties::aerosol("i131", 1500.0, 4.0e-7)
            },
            SpeciesProperties::aerosol("ash", 2500.0, 1.0e-5),
        ],
        releases: vec![ReleaseGroupConfig {
            name: "stack".into(),
            start: 0.0,
            end: end.min(3.0 * 3600.0),
            region: ReleaseRegion::Point {
                x: SOURCE.0,
                y: SOURCE.1,
                z: args.stack_height,
            },
            species_mass: vec![1.0e9, 5.0e3],
            particle_count: args.particles,
        }],
        output_grids: vec![
            OutputGridSpec::new("regional", (0.0, 0.0), (4000.0, 4000.0), (50, 50), vec![100.0, 500.0, 2000.0]),
            OutputGridSpec::new(
                "local",
                (SOURCE.0 - 5000.0, SOURCE.1 - 10_000.0),
                (500.0, 500.0),
                (60, 40),
                vec![100.0],
            ),
        ],
        receptors: vec![
            ReceptorSpec::new("near", SOURCE.0 + 5000.0, SOURCE.1),
            ReceptorSpec::new("far", SOURCE.0 + 40_000.0, SOURCE.1),
        ],
        ..RunConfig::default()
    };
    config.output.interval = 3600.0;
    config.output.sample_interval = 900.0;
    config
}

fn load_scenario(path: &Path) -> Result<ScenarioFile, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    toml::from_str(&text).map_err(|e| format!("cannot parse {}: {e}", path.display()))
}

fn met_times(config: &RunConfig) -> Vec<f64> {
    let first = (config.start / 3600.0).floor() as i64;
    let last = (config.end / 3600.0).ceil() as i64;
    (first..=last.max(first + 1)).map(|h| 3600.0 * h as f64).collect()
}

fn run(args: &Args) -> Result<(), String> {
    let scenario = match &args.config {
        Some(path) => load_scenario(path)?,
        None => ScenarioFile::default(),
    };
    let mut config = scenario.run.unwrap_or_else(|| builtin_config(args));
    if config.domain.grids.is_empty() {
        config.domain = domain();
    }
    let atmosphere = scenario.atmosphere.unwrap_or_else(|| atmosphere(args));

    println!("=== Plume Dispersion Demo ===\n");
    println!(
        "Window {:.0}-{:.0}s, dt {:.0}s, {} species, {} release group(s), seed {}",
        config.start,
        config.end,
        config.dt,
        config.species.len(),
        config.releases.len(),
        config.seed
    );
    println!(
        "Wind ({:.1}, {:.1}) m/s, heat flux {:.0} W/m², rain {:.1} mm/h\n",
        atmosphere.wind.x, atmosphere.wind.y, atmosphere.heat_flux, atmosphere.large_scale_precipitation
    );

    let reader = SyntheticReader::uniform(config.domain.grids.clone(), met_times(&config), atmosphere);
    let mut manager = TimeManager::new(config, Box::new(reader)).map_err(|e| e.to_string())?;
    let mut writer = LogWriter;

    println!("Time(s) | Active | Released(kg) | Airborne(kg) | Deposited(kg) | Centroid(km)");
    println!("--------|--------|--------------|--------------|---------------|-------------");
    loop {
        let state = manager.advance(&mut writer).map_err(|e| e.to_string())?;
        if matches!(state, RunState::Output | RunState::Terminated) {
            report(&manager);
        }
        if state == RunState::Terminated {
            break;
        }
    }

    let summary = manager.summary();
    println!("\n=== Run Complete ===");
    println!("Steps: {}, outputs: {}, met refreshes: {}", summary.steps, summary.outputs, summary.met_refreshes);
    println!(
        "Particles released: {}, still active: {}, convective events: {}",
        summary.particles_released, summary.particles_active, summary.convection_events
    );
    let species = &manager.config().species;
    for (s, props) in species.iter().enumerate() {
        let budget = &summary.budget;
        println!(
            "{:>8}: released {:.3e} kg, dry {:.3e}, wet {:.3e}, decayed {:.3e}, outflow {:.3e}",
            props.name, budget.released[s], budget.dry[s], budget.wet[s], budget.decayed[s], budget.outflow[s]
        );
    }
    println!("Relative mass error: {:.2e}", summary.relative_mass_error);
    info!("Run finished after {} steps", summary.steps);
    Ok(())
}

fn report(manager: &TimeManager) {
    let budget = manager.budget();
    let airborne = manager.ensemble().airborne_mass();
    let released: f64 = budget.released.iter().sum();
    let deposited: f64 = budget.dry.iter().chain(&budget.wet).sum();
    let centroid = manager
        .plume_statistics()
        .into_iter()
        .find(|p| p.particles > 0)
        .map_or_else(|| "-".to_string(), |p| format!("({:.1}, {:.1})", p.centroid.x / 1000.0, p.centroid.y / 1000.0));
    println!(
        "{:7.0} | {:6} | {:12.3e} | {:12.3e} | {:13.3e} | {}",
        manager.time(),
        manager.ensemble().active_count(),
        released,
        airborne.iter().sum::<f64>(),
        deposited,
        centroid
    );
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();
    if args.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global() {
            error!("Cannot size the worker pool: {e}");
        }
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
