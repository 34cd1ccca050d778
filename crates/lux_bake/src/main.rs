//! Bakes lightmaps of the built-in demo scene.
//!
//! Usage: `lux_bake [config.json] [--out DIR]`

mod config;
mod scene;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use lux_baker::DynamicSolver;
use lux_core::{Environment, GammaScaler, LatLongEnvironment, LightmapBuffer, OutputBuffer, UniformEnvironment};
use lux_math::Vec3;
use lux_solver::Improvement;

use crate::config::BakeConfig;

struct Args {
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        output_dir: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out" | "-o" => {
                let dir = iter.next().context("--out needs a directory")?;
                args.output_dir = Some(PathBuf::from(dir));
            }
            "--help" | "-h" => {
                println!("Usage: lux_bake [config.json] [--out DIR]");
                std::process::exit(0);
            }
            _ if args.config.is_none() && !arg.starts_with('-') => args.config = Some(PathBuf::from(arg)),
            _ => bail!("Unexpected argument: {}", arg),
        }
    }
    Ok(args)
}

fn load_environment(config: &BakeConfig) -> Result<Arc<dyn Environment>> {
    Ok(match &config.environment {
        Some(path) => {
            let env = LatLongEnvironment::load(path)
                .with_context(|| format!("Failed to load environment {}", path.display()))?;
            Arc::new(env)
        }
        None => Arc::new(UniformEnvironment(config.sky)),
    })
}

fn save_png(buffer: &LightmapBuffer, width: u32, height: u32, path: &Path) -> Result<()> {
    let pixels = buffer.to_rgba8(Some(&GammaScaler::srgb()));
    let image = image::RgbaImage::from_raw(width, height, pixels).context("Lightmap size mismatch")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = parse_args()?;
    let mut config = match &args.config {
        Some(path) => BakeConfig::load(path)?,
        None => BakeConfig::default(),
    };
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let demo = scene::demo_objects();
    let names: Vec<&str> = demo.iter().map(|d| d.name).collect();
    let mut solver = DynamicSolver::new(config.propagation);
    solver.set_static_objects(
        demo.into_iter().map(|d| d.object).collect(),
        config.smoothing,
        config.technique.into(),
    );
    solver.set_lights(scene::demo_lights());
    solver.set_environment(Some(load_environment(&config)?));

    // Solve
    let start = Instant::now();
    let budget = Duration::from_secs_f32(config.solve_seconds.max(0.0));
    let mut steps = 0;
    while steps < config.max_solve_steps {
        let step_end = Instant::now() + Duration::from_millis(100);
        let improvement = solver.calculate(|| Instant::now() >= step_end);
        steps += 1;
        match improvement {
            Improvement::Improved | Improvement::NotImproved => {}
            Improvement::Finished => break,
            Improvement::InternalError => bail!("Solver failed after {} steps", steps),
        }
        if start.elapsed() >= budget {
            break;
        }
    }
    if let Some(static_solver) = solver.solver() {
        log::info!(
            "Solved {} patches with {} shots in {:.2?} ({:.1}% energy unshot)",
            static_solver.patch_count(),
            static_solver.shots(),
            start.elapsed(),
            static_solver.unshot_fraction() * 100.0
        );
    }

    // Bake
    let size = config.lightmap_size.max(1);
    for (index, name) in names.iter().enumerate() {
        let mut buffer = LightmapBuffer::new(size, size)?;
        {
            let mut targets: [&mut dyn OutputBuffer; 1] = [&mut buffer];
            solver
                .update_lightmap(index, &mut targets, &config.update, &config.filtering)
                .with_context(|| format!("Failed to bake {}", name))?;
        }
        save_png(&buffer, size, size, &config.output_dir.join(format!("{}.png", name)))?;
    }

    if config.capture_environment {
        let mut buffer = LightmapBuffer::new(size * 2, size)?;
        solver.update_environment_map(Vec3::new(0.0, 1.5, 0.0), &mut buffer, &config.update)?;
        save_png(&buffer, size * 2, size, &config.output_dir.join("environment.png"))?;
    }

    Ok(())
}
