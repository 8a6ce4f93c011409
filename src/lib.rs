//! MPC trajectory tracker
//!
//! Control core for a driving-simulator vehicle: each telemetry event is
//! turned into a steering/throttle command by fitting the reference
//! waypoints and solving a short-horizon nonlinear MPC problem over a
//! kinematic bicycle model.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Pipeline
pub mod path_tracking;
pub mod transport;
pub mod simulation;

// Re-export common types for convenience
pub use common::{ActuatorCommand, Frame, Point2D, Pose2D, Telemetry, VehicleState, Visualization, Waypoints};
pub use common::{Controller, MotionModel};
pub use common::{MpcError, MpcResult};
pub use config::{DivergencePolicy, MpcConfig};
