//! Per-telemetry control cycle
//!
//! telemetry -> vehicle frame -> polynomial fit -> cte/epsi -> MPC -> command
//!
//! The loop owns the only state that survives between cycles: the warm start
//! of the optimizer and the last command it handed out. Both belong to one
//! session and are never shared.

use std::time::Instant;

use log::{debug, warn};

use crate::common::{
    ActuatorCommand, Controller, MpcError, MpcResult, Pose2D, Telemetry, VehicleState, Visualization,
};
use crate::config::{DivergencePolicy, MpcConfig};
use crate::path_tracking::actuator::{ActuatorMapper, LatencyPolicy, PendingCommand};
use crate::path_tracking::bicycle::{Actuation, KinematicBicycle};
use crate::path_tracking::frame_transform::to_vehicle_frame;
use crate::path_tracking::mpc::{TrajectoryOptimizer, WarmStart};
use crate::path_tracking::polynomial::PolynomialFitter;
use crate::path_tracking::tracking_error::{tracking_error, TrackingError};

/// How the command of a cycle was obtained
#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    /// Converged optimizer output
    Solved { iterations: usize, cost: f64 },
    /// The optimizer diverged and the divergence policy supplied the command
    Fallback { reason: String },
}

/// Result of one control cycle
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub pending: PendingCommand,
    /// State the optimizer started from
    pub state: VehicleState,
    pub tracking: TrackingError,
    pub status: CycleStatus,
}

impl CycleOutput {
    pub fn command(&self) -> ActuatorCommand {
        self.pending.command
    }

    pub fn visualization(&self) -> &Visualization {
        &self.pending.visualization
    }
}

pub struct ControlLoop {
    config: MpcConfig,
    fitter: PolynomialFitter,
    model: KinematicBicycle,
    optimizer: TrajectoryOptimizer,
    mapper: ActuatorMapper,
    warm_start: Option<WarmStart>,
    last_command: Option<ActuatorCommand>,
}

impl ControlLoop {
    pub fn new(config: MpcConfig) -> MpcResult<Self> {
        config.validate()?;
        Ok(Self {
            fitter: PolynomialFitter::new(config.poly_degree),
            model: KinematicBicycle::new(config.lf),
            optimizer: TrajectoryOptimizer::new(&config)?,
            mapper: ActuatorMapper::new(
                config.max_steer_rad,
                LatencyPolicy::from_latency(config.latency()),
            ),
            warm_start: None,
            last_command: None,
            config,
        })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn last_command(&self) -> Option<ActuatorCommand> {
        self.last_command
    }

    /// Run one cycle for `telemetry` received at `now`.
    ///
    /// `InvalidInput` and `FitFailure` skip the cycle and leave the loop
    /// state untouched. `SolverDivergence` goes through the configured
    /// divergence policy and only escapes with `DivergencePolicy::Propagate`.
    pub fn run_cycle(&mut self, telemetry: &Telemetry, now: Instant) -> MpcResult<CycleOutput> {
        if telemetry.waypoints.len() < 2 {
            return Err(MpcError::invalid_input(format!(
                "need at least 2 waypoints, got {}",
                telemetry.waypoints.len()
            )));
        }
        let pose = telemetry.pose;
        if !(pose.x.is_finite() && pose.y.is_finite() && pose.yaw.is_finite()) {
            return Err(MpcError::invalid_input("pose is not finite"));
        }
        if !telemetry.speed.is_finite() {
            return Err(MpcError::invalid_input("speed is not finite"));
        }

        let pose = pose.normalized();
        let local = to_vehicle_frame(&pose, &telemetry.waypoints)?;
        let reference = self.fitter.fit_with_fallback(local.xs(), local.ys())?;

        let (vehicle, speed) = self.predicted_pose(telemetry.speed);
        let tracking = tracking_error(&reference, &vehicle, &local)?;
        let state = VehicleState::new(
            vehicle.x,
            vehicle.y,
            vehicle.yaw,
            speed,
            tracking.cte,
            tracking.epsi,
        );
        debug!(
            "cycle: v {:.2}, cte {:.4}, epsi {:.4}, poly {:?}",
            speed,
            tracking.cte,
            tracking.epsi,
            reference.coeffs()
        );

        let (next_x, next_y) = local.into_xy();
        let mut visualization = Visualization {
            next_x,
            next_y,
            ..Visualization::default()
        };

        let warm_start = if self.config.solver.warm_start {
            self.warm_start.as_ref()
        } else {
            None
        };

        let (command, status) = match self.optimizer.solve(&state, &reference, warm_start) {
            Ok(solution) => {
                let command = self.mapper.map(&solution.horizon.first_actuation());
                visualization.mpc_x = solution.horizon.xs().to_vec();
                visualization.mpc_y = solution.horizon.ys().to_vec();
                self.warm_start = Some(solution.warm_start());
                let status = CycleStatus::Solved {
                    iterations: solution.iterations,
                    cost: solution.cost,
                };
                (command, status)
            }
            Err(err @ MpcError::SolverDivergence { .. }) => {
                self.warm_start = None;
                let command = match self.config.divergence_policy {
                    DivergencePolicy::HoldLast => self.last_command.unwrap_or_default(),
                    DivergencePolicy::Zero => ActuatorCommand::zero(),
                    DivergencePolicy::Propagate => return Err(err),
                };
                warn!(
                    "{}; sending {:?} fallback command {:?}",
                    err, self.config.divergence_policy, command
                );
                (command, CycleStatus::Fallback { reason: err.to_string() })
            }
            Err(err) => return Err(err),
        };

        self.last_command = Some(command);
        debug!(
            "command: steering {:.4}, throttle {:.4}",
            command.steering, command.throttle
        );

        Ok(CycleOutput {
            pending: self.mapper.schedule(command, visualization, now),
            state,
            tracking,
            status,
        })
    }

    /// Vehicle-frame pose and speed at which the command will take effect.
    ///
    /// Without latency compensation this is the origin at the measured speed.
    /// With it, the origin is advanced through the bicycle model over the
    /// actuation latency using the last command handed out.
    fn predicted_pose(&self, speed: f64) -> (Pose2D, f64) {
        let origin = Pose2D::origin();
        if !self.config.latency_compensation {
            return (origin, speed);
        }
        let latency = self.config.latency().as_secs_f64();
        if latency <= 0.0 {
            return (origin, speed);
        }
        let last = self
            .last_command
            .map(|cmd| self.mapper.unmap(&cmd))
            .unwrap_or_else(Actuation::default);
        self.model.step(&origin, speed, &last, latency)
    }
}

impl Controller for ControlLoop {
    type Input = Telemetry;
    type Output = CycleOutput;

    fn compute(&mut self, input: &Telemetry) -> MpcResult<CycleOutput> {
        self.run_cycle(input, Instant::now())
    }

    fn reset(&mut self) {
        self.warm_start = None;
        self.last_command = None;
    }
}
