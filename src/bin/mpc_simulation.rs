//! Closed-loop MPC run on a synthetic track.
//!
//! Drives the simulated vehicle around an oval track and plots the driven
//! path and the commands with gnuplot.
//!
//! Run with: cargo run --bin mpc_simulation -- [--config params.toml] [--cycles 600] [--seed 0] [--record frames.txt]

use std::fs;
use std::path::PathBuf;
use std::process;

use log::{error, info, warn, LevelFilter};
use structopt::StructOpt;

use mpc_trajectory_tracker::simulation::{ClosedLoopSim, SimulationConfig};
use mpc_trajectory_tracker::utils::{logger, visualization};
use mpc_trajectory_tracker::{MpcConfig, MpcResult};

const OUTPUT_DIR: &str = "img/path_tracking";

/// Closed-loop MPC run on the synthetic oval track
#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_simulation")]
struct Args {
    /// Controller parameter file (TOML); built-in defaults when absent
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Number of control cycles to simulate
    #[structopt(long, default_value = "600")]
    cycles: usize,

    /// Seed of the telemetry noise
    #[structopt(long, default_value = "0")]
    seed: u64,

    /// Write the sampled telemetry frames to this file, for mpc_replay
    #[structopt(long, parse(from_os_str))]
    record: Option<PathBuf>,
}

fn run(args: Args) -> MpcResult<()> {
    let controller = match &args.config {
        Some(path) => MpcConfig::load(path)?,
        None => MpcConfig::default(),
    };
    let config = SimulationConfig {
        controller,
        seed: args.seed,
        ..SimulationConfig::default()
    };

    let mut sim = ClosedLoopSim::new(config)?;
    if args.record.is_some() {
        sim.enable_recording();
    }
    let trace = sim.run(args.cycles);
    info!("Mean speed {:.1} m/s", trace.mean_speed());

    if let Some(path) = &args.record {
        let frames = sim.take_recording();
        fs::write(path, frames.join("\n") + "\n")?;
        info!("Recorded {} telemetry frames to {}", frames.len(), path.display());
    }

    fs::create_dir_all(OUTPUT_DIR)?;
    let trajectory = format!("{}/mpc_trajectory.svg", OUTPUT_DIR);
    let commands = format!("{}/mpc_commands.svg", OUTPUT_DIR);

    let plots = [
        (visualization::plot_trajectory(sim.track(), &trace, "MPC trajectory tracking"), &trajectory),
        (visualization::plot_commands(&trace), &commands),
    ];
    for (vis, path) in plots.iter() {
        match vis.save_svg(path) {
            Ok(()) => info!("Plot saved to {}", path),
            Err(e) => warn!("Cannot save {}: {}", path, e),
        }
    }
    Ok(())
}

fn main() {
    if let Err(e) = logger::init(LevelFilter::Info) {
        eprintln!("{}", e);
        process::exit(1);
    }

    if let Err(e) = run(Args::from_args()) {
        error!("{}", e);
        process::exit(1);
    }
}
