#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless Tower Siege simulation.

mod config;
mod simulation;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    config::GameConfig,
    simulation::{Simulation, SimulationOptions},
};

/// Command-line arguments accepted by the simulation.
#[derive(Debug, Parser)]
#[command(name = "tower-siege", about = "Run a headless Tower Siege pursuit simulation")]
struct Args {
    /// TOML file overriding level, navigator and pursuit settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for level generation, overriding the configured one.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Number of NPCs chasing the player.
    #[arg(long, default_value_t = 16)]
    npcs: usize,

    /// Number of random building placements attempted before the first tick.
    #[arg(long, default_value_t = 24)]
    buildings: usize,
}

/// Entry point for the Tower Siege command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;
    let options = SimulationOptions {
        npcs: args.npcs,
        buildings: args.buildings,
        seed: config.level.seed,
    };

    let mut simulation =
        Simulation::new(&config, options).context("failed to set up the simulation")?;
    let summary = simulation.run(args.ticks);

    info!(
        ticks = summary.ticks,
        elapsed_ms = summary.elapsed_ms,
        buildings_placed = summary.buildings_placed,
        buildings_rejected = summary.buildings_rejected,
        arrived = summary.arrived,
        stalled = summary.stalled,
        engaged = summary.engaged,
        visible = summary.visible,
        strikes = summary.strikes,
        expansions = summary.expansions,
        resolved = summary.resolved,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "simulation finished"
    );
    Ok(())
}

fn resolve_config(args: &Args) -> Result<GameConfig> {
    let mut config = match &args.config {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => GameConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.level.seed = seed;
    }
    Ok(config)
}
