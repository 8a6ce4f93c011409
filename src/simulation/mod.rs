//! Closed-loop simulation of the vehicle on a synthetic track

pub mod runner;
pub mod telemetry;
pub mod track;
pub mod vehicle;

pub use runner::{ClosedLoopSim, SimulationConfig, SimulationTrace};
pub use telemetry::{NoiseConfig, TelemetrySource};
pub use track::Track;
pub use vehicle::VehicleSim;
