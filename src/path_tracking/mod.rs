//! Path tracking pipeline: frame transform, reference fit, tracking error,
//! MPC trajectory optimizer, actuator mapping and the per-cycle control loop

pub mod frame_transform;
pub mod polynomial;
pub mod tracking_error;
pub mod bicycle;
pub mod mpc;
pub mod actuator;
pub mod control_loop;

pub use frame_transform::*;
pub use polynomial::{polyfit, Polynomial, PolynomialFitter};
pub use tracking_error::{tracking_error, TrackingError};
pub use bicycle::{Actuation, ErrorDynamics, KinematicBicycle};
pub use mpc::{Horizon, MpcSolution, TrajectoryOptimizer, WarmStart};
pub use actuator::{ActuatorMapper, LatencyPolicy, PendingCommand};
pub use control_loop::{ControlLoop, CycleOutput, CycleStatus};
