//! Feed simulator frames through a control session.
//!
//! Reads one inbound frame per line from a file (or stdin) and writes the
//! outbound frames to stdout once their actuation latency has passed.
//!
//! Run with: cargo run --bin mpc_replay -- [--config params.toml] [--log-level debug] [frames.txt]

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Instant;

use log::{error, info, LevelFilter};
use structopt::StructOpt;

use mpc_trajectory_tracker::transport::Session;
use mpc_trajectory_tracker::utils::logger;
use mpc_trajectory_tracker::{MpcConfig, MpcResult};

/// Replay simulator frames through a control session
#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_replay")]
struct Args {
    /// Controller parameter file (TOML); built-in defaults when absent
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Log level written to stderr
    #[structopt(long = "log-level", default_value = "info")]
    log_level: LevelFilter,

    /// File with one inbound frame per line; stdin when absent
    #[structopt(parse(from_os_str))]
    input: Option<PathBuf>,
}

fn emit(out: &mut impl Write, frames: Vec<String>) -> io::Result<()> {
    for frame in frames {
        writeln!(out, "{}", frame)?;
    }
    out.flush()
}

fn run(args: Args) -> MpcResult<()> {
    let config = match &args.config {
        Some(path) => MpcConfig::load(path)?,
        None => MpcConfig::default(),
    };
    let mut session = Session::new(config)?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in reader.lines() {
        let line = line?;
        let now = Instant::now();
        if let Some(reply) = session.handle_frame(&line, now) {
            emit(&mut out, vec![reply])?;
        }
        emit(&mut out, session.poll(now))?;
    }

    // Input is exhausted: wait out the remaining deadlines
    while let Some(deadline) = session.next_deadline() {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        emit(&mut out, session.poll(Instant::now()))?;
    }

    let stats = session.stats();
    info!(
        "{} frames: {} solved, {} fallback, {} skipped, {} manual",
        stats.frames, stats.solved, stats.fallbacks, stats.skipped, stats.manual
    );
    Ok(())
}

fn main() {
    let args = Args::from_args();

    if let Err(e) = logger::init_stderr(args.log_level) {
        eprintln!("{}", e);
        process::exit(1);
    }

    if let Err(e) = run(args) {
        error!("{}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::from_iter_safe(&["mpc_replay"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.input.is_none());
        assert_eq!(args.log_level, LevelFilter::Info);
    }

    #[test]
    fn test_args_full() {
        let args = Args::from_iter_safe(&[
            "mpc_replay",
            "--config",
            "params/mpc.toml",
            "--log-level",
            "debug",
            "frames.txt",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("params/mpc.toml")));
        assert_eq!(args.log_level, LevelFilter::Debug);
        assert_eq!(args.input, Some(PathBuf::from("frames.txt")));
    }

    #[test]
    fn test_args_rejects_unknown_flag_and_missing_value() {
        assert!(Args::from_iter_safe(&["mpc_replay", "--bogus", "frames.txt"]).is_err());
        assert!(Args::from_iter_safe(&["mpc_replay", "--config"]).is_err());
        assert!(Args::from_iter_safe(&["mpc_replay", "--log-level", "loud"]).is_err());
    }
}
