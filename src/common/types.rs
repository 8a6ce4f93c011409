//! Common types used throughout the trajectory tracker

use nalgebra::Vector6;

use crate::common::angle::normalize_angle;
use crate::common::error::{MpcError, MpcResult};

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 2D pose (position + heading)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, yaw: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Normalize yaw to (-pi, pi]
    pub fn normalize_yaw(&mut self) {
        self.yaw = normalize_angle(self.yaw);
    }

    pub fn normalized(mut self) -> Self {
        self.normalize_yaw();
        self
    }
}

/// Coordinate frame a set of waypoints is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Simulator map frame
    Global,
    /// Vehicle at the origin, heading along +x
    Vehicle,
}

/// Ordered reference points tagged with the frame they live in
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoints {
    frame: Frame,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Waypoints {
    /// Build a waypoint list from parallel coordinate sequences.
    ///
    /// Fails with `InvalidInput` when the sequences differ in length.
    pub fn new(frame: Frame, xs: Vec<f64>, ys: Vec<f64>) -> MpcResult<Self> {
        if xs.len() != ys.len() {
            return Err(MpcError::invalid_input(format!(
                "waypoint x/y length mismatch ({} vs {})",
                xs.len(),
                ys.len()
            )));
        }
        Ok(Self { frame, xs, ys })
    }

    pub fn from_points(frame: Frame, points: &[Point2D]) -> Self {
        Self {
            frame,
            xs: points.iter().map(|p| p.x).collect(),
            ys: points.iter().map(|p| p.y).collect(),
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn point(&self, i: usize) -> Option<Point2D> {
        Some(Point2D::new(*self.xs.get(i)?, *self.ys.get(i)?))
    }

    pub fn points(&self) -> impl Iterator<Item = Point2D> + '_ {
        self.xs.iter().zip(self.ys.iter()).map(|(&x, &y)| Point2D::new(x, y))
    }

    pub fn into_xy(self) -> (Vec<f64>, Vec<f64>) {
        (self.xs, self.ys)
    }
}

/// Kinematic and error state seen by the optimizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    pub psi: f64,
    pub v: f64,
    pub cte: f64,
    pub epsi: f64,
}

impl VehicleState {
    pub fn new(x: f64, y: f64, psi: f64, v: f64, cte: f64, epsi: f64) -> Self {
        Self { x, y, psi, v, cte, epsi }
    }

    /// State at decision time in the vehicle frame (x = y = psi = 0)
    pub fn local(v: f64, cte: f64, epsi: f64) -> Self {
        Self::new(0.0, 0.0, 0.0, v, cte, epsi)
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(self.x, self.y, self.psi, self.v, self.cte, self.epsi)
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

impl From<Vector6<f64>> for VehicleState {
    fn from(s: Vector6<f64>) -> Self {
        Self::new(s[0], s[1], s[2], s[3], s[4], s[5])
    }
}

/// Normalized command sent to the simulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    /// Steering in [-1, 1]; positive steers right
    pub steering: f64,
    /// Throttle (positive) or brake (negative) in [-1, 1]
    pub throttle: f64,
}

impl ActuatorCommand {
    pub fn new(steering: f64, throttle: f64) -> Self {
        Self { steering, throttle }
    }

    pub fn zero() -> Self {
        Self { steering: 0.0, throttle: 0.0 }
    }
}

impl Default for ActuatorCommand {
    fn default() -> Self {
        Self::zero()
    }
}

/// One decoded telemetry event: global waypoints and the global pose
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    pub waypoints: Waypoints,
    /// Global pose; yaw is not necessarily normalized
    pub pose: Pose2D,
    pub speed: f64,
}

impl Telemetry {
    pub fn new(waypoints: Waypoints, pose: Pose2D, speed: f64) -> Self {
        Self { waypoints, pose, speed }
    }
}

/// Render-only data sent alongside a command, all in the vehicle frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Visualization {
    pub mpc_x: Vec<f64>,
    pub mpc_y: Vec<f64>,
    pub next_x: Vec<f64>,
    pub next_y: Vec<f64>,
}
