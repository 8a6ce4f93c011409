//! Closed-loop run: simulated vehicle, telemetry, controller, delayed release
//!
//! Time is simulated: release instants are offsets from a fixed epoch, so
//! the run is as fast as the solver and independent of wall-clock time.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::common::{ActuatorCommand, MpcResult, Point2D};
use crate::config::MpcConfig;
use crate::path_tracking::bicycle::KinematicBicycle;
use crate::path_tracking::control_loop::{ControlLoop, CycleStatus};
use crate::simulation::telemetry::{NoiseConfig, TelemetrySource};
use crate::simulation::track::Track;
use crate::simulation::vehicle::VehicleSim;
use crate::transport::latency::LatencyQueue;
use crate::transport::protocol::encode_telemetry;

/// Closed-loop run parameters
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub controller: MpcConfig,
    pub track: Track,
    /// Waypoints reported per telemetry event
    pub lookahead: usize,
    pub noise: NoiseConfig,
    pub seed: u64,
    pub initial_speed: f64,
    /// Control cycle period [s]
    pub cycle_time: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            controller: MpcConfig::default(),
            track: Track::oval(150.0, 90.0, 0.08, 160),
            lookahead: 6,
            noise: NoiseConfig::default(),
            seed: 0,
            initial_speed: 10.0,
            cycle_time: 0.1,
        }
    }
}

/// Recorded closed-loop trajectory
#[derive(Debug, Clone, Default)]
pub struct SimulationTrace {
    pub time: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub speed: Vec<f64>,
    /// Distance from the track centerline [m]
    pub track_error: Vec<f64>,
    pub steering: Vec<f64>,
    pub throttle: Vec<f64>,
    pub solved: usize,
    pub fallbacks: usize,
    pub skipped: usize,
    pub distance: f64,
}

impl SimulationTrace {
    pub fn max_track_error(&self) -> f64 {
        self.track_error.iter().fold(0.0, |m, e| m.max(*e))
    }

    pub fn mean_speed(&self) -> f64 {
        if self.speed.is_empty() {
            return 0.0;
        }
        self.speed.iter().sum::<f64>() / self.speed.len() as f64
    }
}

pub struct ClosedLoopSim {
    control: ControlLoop,
    vehicle: VehicleSim,
    source: TelemetrySource,
    queue: LatencyQueue,
    active: ActuatorCommand,
    cycle_time: f64,
    epoch: Instant,
    elapsed: f64,
    recording: Option<Vec<String>>,
}

impl ClosedLoopSim {
    pub fn new(config: SimulationConfig) -> MpcResult<Self> {
        let controller = config.controller;
        let vehicle = VehicleSim::new(
            KinematicBicycle::new(controller.lf),
            controller.max_steer_rad,
            config.track.start_pose(),
            config.initial_speed,
        );
        Ok(Self {
            control: ControlLoop::new(controller)?,
            vehicle,
            source: TelemetrySource::new(config.track, config.lookahead, config.noise, config.seed)?,
            queue: LatencyQueue::new(),
            active: ActuatorCommand::zero(),
            cycle_time: config.cycle_time,
            epoch: Instant::now(),
            elapsed: 0.0,
            recording: None,
        })
    }

    pub fn track(&self) -> &Track {
        self.source.track()
    }

    /// Keep every telemetry event as a wire frame from now on
    pub fn enable_recording(&mut self) {
        self.recording.get_or_insert_with(Vec::new);
    }

    /// Recorded telemetry frames, in the order they were sampled
    pub fn take_recording(&mut self) -> Vec<String> {
        self.recording.take().unwrap_or_default()
    }

    fn now(&self) -> Instant {
        self.epoch + Duration::from_secs_f64(self.elapsed)
    }

    /// Run `cycles` control cycles and record the vehicle after each
    pub fn run(&mut self, cycles: usize) -> SimulationTrace {
        let mut trace = SimulationTrace::default();

        for _ in 0..cycles {
            let telemetry = self.source.sample(&self.vehicle);
            if let Some(recording) = self.recording.as_mut() {
                match encode_telemetry(&telemetry) {
                    Ok(frame) => recording.push(frame),
                    Err(e) => warn!("Cannot record telemetry: {}", e),
                }
            }
            match self.control.run_cycle(&telemetry, self.now()) {
                Ok(output) => {
                    match output.status {
                        CycleStatus::Solved { .. } => trace.solved += 1,
                        CycleStatus::Fallback { .. } => trace.fallbacks += 1,
                    }
                    self.queue.push(output.pending);
                }
                Err(e) => {
                    warn!("Cycle skipped at t = {:.1} s: {}", self.elapsed, e);
                    trace.skipped += 1;
                }
            }

            // Commands take effect once released; the newest released wins
            self.elapsed += self.cycle_time;
            if let Some(latest) = self.queue.pop_ready(self.now()).pop() {
                self.active = latest.command;
            }
            self.vehicle.step(&self.active, self.cycle_time);

            let pose = self.vehicle.pose();
            trace.time.push(self.elapsed);
            trace.x.push(pose.x);
            trace.y.push(pose.y);
            trace.speed.push(self.vehicle.speed());
            trace
                .track_error
                .push(self.track().distance_to(&Point2D::new(pose.x, pose.y)));
            trace.steering.push(self.active.steering);
            trace.throttle.push(self.active.throttle);
        }

        trace.distance = self.vehicle.odometer();
        info!(
            "Simulated {:.1} s: {:.0} m driven, max track error {:.2} m, {} solved / {} fallback / {} skipped",
            self.elapsed,
            trace.distance,
            trace.max_track_error(),
            trace.solved,
            trace.fallbacks,
            trace.skipped
        );
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.controller.solver.max_solve_time_ms = 5_000;
        config.controller.solver.max_iterations = 500;
        config
    }

    #[test]
    fn test_closed_loop_stays_on_track() {
        let mut sim = ClosedLoopSim::new(test_config()).unwrap();
        let trace = sim.run(200);

        assert_eq!(trace.time.len(), 200);
        assert_eq!(trace.skipped, 0);
        assert!(trace.max_track_error() < 3.0, "max track error {}", trace.max_track_error());
        // Accelerates from 10 m/s towards the reference speed
        assert!(trace.speed[trace.speed.len() - 1] > 15.0);
        assert!(trace.distance > 200.0);
    }

    #[test]
    fn test_recording_replays_through_session() {
        use crate::transport::Session;

        let mut config = test_config();
        config.noise = NoiseConfig::none();
        let controller = config.controller.clone();
        let mut sim = ClosedLoopSim::new(config).unwrap();
        sim.enable_recording();
        sim.run(5);
        let frames = sim.take_recording();
        assert_eq!(frames.len(), 5);

        let mut session = Session::new(controller).unwrap();
        let now = Instant::now();
        for frame in &frames {
            assert_eq!(session.handle_frame(frame, now), None);
        }
        assert_eq!(session.flush().len(), 5);
        assert_eq!(session.stats().solved, 5);
    }

    #[test]
    fn test_commands_are_normalized() {
        let mut sim = ClosedLoopSim::new(test_config()).unwrap();
        let trace = sim.run(50);
        assert!(trace.steering.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(trace.throttle.iter().all(|t| (-1.0..=1.0).contains(t)));
    }
}
