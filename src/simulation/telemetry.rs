//! Noisy telemetry generator

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::common::{Frame, MpcError, MpcResult, Point2D, Pose2D, Telemetry, Waypoints};
use crate::simulation::track::Track;
use crate::simulation::vehicle::VehicleSim;

/// Standard deviations of the measurement noise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Pose position noise [m]
    pub position: f64,
    /// Heading noise [rad]
    pub heading: f64,
    /// Speed noise [m/s]
    pub speed: f64,
    /// Waypoint position noise [m]
    pub waypoint: f64,
}

impl NoiseConfig {
    pub fn none() -> Self {
        Self {
            position: 0.0,
            heading: 0.0,
            speed: 0.0,
            waypoint: 0.0,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            position: 0.05,
            heading: 0.005,
            speed: 0.1,
            waypoint: 0.02,
        }
    }
}

fn normal(std_dev: f64) -> MpcResult<Normal<f64>> {
    if !(std_dev >= 0.0) {
        return Err(MpcError::Config(format!(
            "noise level must be >= 0, got {}",
            std_dev
        )));
    }
    Normal::new(0.0, std_dev)
        .map_err(|e| MpcError::Config(format!("invalid noise level {}: {}", std_dev, e)))
}

/// Samples what the simulator would report for a vehicle on a track
pub struct TelemetrySource {
    track: Track,
    lookahead: usize,
    rng: StdRng,
    position: Normal<f64>,
    heading: Normal<f64>,
    speed: Normal<f64>,
    waypoint: Normal<f64>,
}

impl TelemetrySource {
    pub fn new(track: Track, lookahead: usize, noise: NoiseConfig, seed: u64) -> MpcResult<Self> {
        Ok(Self {
            track,
            lookahead,
            rng: StdRng::seed_from_u64(seed),
            position: normal(noise.position)?,
            heading: normal(noise.heading)?,
            speed: normal(noise.speed)?,
            waypoint: normal(noise.waypoint)?,
        })
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn sample(&mut self, vehicle: &VehicleSim) -> Telemetry {
        let truth = vehicle.pose();
        let ahead = self.track.waypoints_ahead(&truth, self.lookahead);

        let noisy: Vec<Point2D> = ahead
            .points()
            .map(|p| {
                Point2D::new(
                    p.x + self.waypoint.sample(&mut self.rng),
                    p.y + self.waypoint.sample(&mut self.rng),
                )
            })
            .collect();
        let waypoints = Waypoints::from_points(Frame::Global, &noisy);

        let pose = Pose2D::new(
            truth.x + self.position.sample(&mut self.rng),
            truth.y + self.position.sample(&mut self.rng),
            truth.yaw + self.heading.sample(&mut self.rng),
        );
        let speed = (vehicle.speed() + self.speed.sample(&mut self.rng)).max(0.0);

        Telemetry::new(waypoints, pose, speed)
    }
}
