//! Simulated vehicle driven by normalized commands

use crate::common::{ActuatorCommand, Pose2D};
use crate::path_tracking::bicycle::{Actuation, KinematicBicycle};

/// Kinematic vehicle with the simulator's command polarity: positive
/// steering turns right, throttle is an acceleration in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct VehicleSim {
    model: KinematicBicycle,
    max_steer: f64,
    pose: Pose2D,
    speed: f64,
    odometer: f64,
}

impl VehicleSim {
    pub fn new(model: KinematicBicycle, max_steer: f64, pose: Pose2D, speed: f64) -> Self {
        Self {
            model,
            max_steer,
            pose,
            speed,
            odometer: 0.0,
        }
    }

    /// Current pose; yaw accumulates and is not wrapped
    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Distance driven since start
    pub fn odometer(&self) -> f64 {
        self.odometer
    }

    pub fn step(&mut self, command: &ActuatorCommand, dt: f64) {
        let act = Actuation::new(
            -command.steering.clamp(-1.0, 1.0) * self.max_steer,
            command.throttle.clamp(-1.0, 1.0),
        );
        let (pose, speed) = self.model.step(&self.pose, self.speed, &act, dt);
        self.odometer += self.pose.position().distance(&pose.position());
        self.pose = pose;
        // No reversing
        self.speed = speed.max(0.0);
    }
}
