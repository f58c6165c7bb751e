use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;

use ocean_synth::prelude::*;

/// Command-line probe that runs the spectral ocean on the CPU backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Grid resolution (power of two)
    #[arg(short = 'n', long, default_value_t = 128)]
    resolution: usize,

    /// World-space size of the ocean patch
    #[arg(short = 'l', long, default_value_t = 100.0)]
    patch_length: f32,

    /// Wind speed for wave generation
    #[arg(long, default_value_t = 5.0)]
    wind_speed: f32,

    /// Wind direction X component
    #[arg(long, default_value_t = 1.0)]
    wind_dir_x: f32,

    /// Wind direction Z component
    #[arg(long, default_value_t = 0.0)]
    wind_dir_z: f32,

    /// Phillips spectrum amplitude
    #[arg(short, long, default_value_t = 1.0)]
    amplitude: f32,

    /// Wave choppiness
    #[arg(short, long, default_value_t = 0.5)]
    choppiness: f32,

    /// Gravity acceleration
    #[arg(long, default_value_t = 9.81)]
    gravity: f32,

    /// Water depth, deep water when omitted
    #[arg(long)]
    depth: Option<f32>,

    /// Random seed for wave generation
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of simulation ticks to run
    #[arg(long, default_value_t = 10)]
    ticks: u32,

    /// Simulation time step between ticks in seconds
    #[arg(long, default_value_t = 1.0 / 30.0)]
    dt: f32,

    /// Time of the first tick
    #[arg(short, long, default_value_t = 0.0)]
    time: f32,
}

impl Args {
    fn config(&self) -> OceanConfig {
        OceanConfig {
            resolution: self.resolution,
            patch_length: self.patch_length,
            wind_speed: self.wind_speed,
            wind_direction: Vec2::new(self.wind_dir_x, self.wind_dir_z),
            amplitude: self.amplitude,
            choppiness: self.choppiness,
            gravity: self.gravity,
            depth: self.depth,
            seed: self.seed,
            ..OceanConfig::default()
        }
    }
}

/// Height range and mean slope of one frame
fn summarize(snapshot: &FieldSnapshot) -> (f32, f32, f32) {
    let mut min_height = f32::MAX;
    let mut max_height = f32::MIN;
    for value in &snapshot.displacement.values {
        min_height = min_height.min(value.y);
        max_height = max_height.max(value.y);
    }

    // Angle between normal and up, averaged
    let mean_slope = snapshot
        .normals
        .values
        .iter()
        .map(|n| n.y.clamp(-1.0, 1.0).acos())
        .sum::<f32>()
        / snapshot.normals.values.len() as f32;

    (min_height, max_height, mean_slope.to_degrees())
}

fn main() -> Result<()> {
    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();
    let config = args.config();

    log::info!(
        "Ocean patch {}m with {}x{} cells, wind {} m/s, amplitude {}, choppiness {}",
        config.patch_length,
        config.resolution,
        config.resolution,
        config.wind_speed,
        config.amplitude,
        config.choppiness
    );

    let mut ocean = FrameOrchestrator::new(CpuDevice::new());
    ocean
        .configure(&config)
        .context("invalid ocean configuration")?;

    for i in 0..args.ticks {
        let time = args.time + i as f32 * args.dt;
        let start = std::time::Instant::now();
        if let Err(err) = ocean.tick(time) {
            // The previous frame stays valid; try again on the next tick
            log::warn!("tick {} at t={:.3} failed: {}", i, time, err);
            continue;
        }
        let elapsed = start.elapsed();

        let snapshot = ocean.read_frame().context("reading back frame")?;
        let (min_height, max_height, slope) = summarize(&snapshot);
        log::info!(
            "tick {} t={:.3}s: height [{:.4}, {:.4}], mean slope {:.2} deg ({:.2?})",
            snapshot.tick,
            time,
            min_height,
            max_height,
            slope,
            elapsed
        );
    }

    let snapshot = ocean.read_frame().context("no frame was produced")?;
    let (min_height, max_height, _) = summarize(&snapshot);
    println!(
        "Height range after {} ticks: min = {:.4}, max = {:.4}, amplitude = {:.4} units",
        snapshot.tick,
        min_height,
        max_height,
        (max_height - min_height) / 2.0
    );

    Ok(())
}
