//! Kinematic bicycle model
//!
//! `KinematicBicycle` moves a pose and speed forward; `ErrorDynamics` extends
//! it with the cross-track and heading error states measured against a
//! reference polynomial, which is the model the optimizer plans with.

use nalgebra::{DMatrix, Matrix6, Matrix6x2, Vector6};

use crate::common::{MotionModel, Pose2D, VehicleState};
use crate::path_tracking::polynomial::Polynomial;

/// Raw actuation: steering angle [rad] and normalized acceleration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Actuation {
    pub delta: f64,
    pub accel: f64,
}

impl Actuation {
    pub fn new(delta: f64, accel: f64) -> Self {
        Self { delta, accel }
    }
}

/// Kinematic bicycle with the steering applied at distance `lf` from the CoG
#[derive(Debug, Clone, Copy)]
pub struct KinematicBicycle {
    lf: f64,
}

impl KinematicBicycle {
    pub fn new(lf: f64) -> Self {
        Self { lf }
    }

    /// Advance a pose and speed by one Euler step.
    ///
    /// Positive `delta` turns the vehicle counter-clockwise.
    pub fn step(&self, pose: &Pose2D, v: f64, act: &Actuation, dt: f64) -> (Pose2D, f64) {
        let next = Pose2D::new(
            pose.x + v * pose.yaw.cos() * dt,
            pose.y + v * pose.yaw.sin() * dt,
            pose.yaw + v / self.lf * act.delta * dt,
        );
        (next, v + act.accel * dt)
    }

    /// Error dynamics against `reference`
    pub fn with_reference<'a>(&self, reference: &'a Polynomial) -> ErrorDynamics<'a> {
        ErrorDynamics { lf: self.lf, reference }
    }
}

/// Six-state model `[x, y, psi, v, cte, epsi]` relative to a reference path
#[derive(Debug, Clone, Copy)]
pub struct ErrorDynamics<'a> {
    lf: f64,
    reference: &'a Polynomial,
}

impl<'a> ErrorDynamics<'a> {
    pub fn step(&self, s: &Vector6<f64>, act: &Actuation, dt: f64) -> Vector6<f64> {
        let (x, y, psi, v, _cte, epsi) = (s[0], s[1], s[2], s[3], s[4], s[5]);
        let f = self.reference.eval(x);
        let psi_des = self.reference.tangent_heading(x);
        let yaw_rate = v / self.lf * act.delta;

        Vector6::new(
            x + v * psi.cos() * dt,
            y + v * psi.sin() * dt,
            psi + yaw_rate * dt,
            v + act.accel * dt,
            (f - y) + v * epsi.sin() * dt,
            (psi - psi_des) + yaw_rate * dt,
        )
    }

    /// d(step)/d(state)
    pub fn state_jacobian(&self, s: &Vector6<f64>, act: &Actuation, dt: f64) -> Matrix6<f64> {
        let (x, psi, v, epsi) = (s[0], s[2], s[3], s[5]);
        let df = self.reference.derivative(x);
        let ddf = self.reference.second_derivative(x);
        let dpsi_des = ddf / (1.0 + df * df);
        let (sin_psi, cos_psi) = psi.sin_cos();
        let (sin_epsi, cos_epsi) = epsi.sin_cos();
        let k = act.delta / self.lf * dt;

        #[rustfmt::skip]
        let a = Matrix6::new(
            1.0, 0.0, -v * sin_psi * dt, cos_psi * dt, 0.0, 0.0,
            0.0, 1.0,  v * cos_psi * dt, sin_psi * dt, 0.0, 0.0,
            0.0, 0.0,  1.0,              k,            0.0, 0.0,
            0.0, 0.0,  0.0,              1.0,          0.0, 0.0,
            df,  -1.0, 0.0,              sin_epsi * dt, 0.0, v * cos_epsi * dt,
            -dpsi_des, 0.0, 1.0,         k,            0.0, 0.0,
        );
        a
    }

    /// d(step)/d(delta, accel)
    pub fn control_jacobian(&self, s: &Vector6<f64>, _act: &Actuation, dt: f64) -> Matrix6x2<f64> {
        let v = s[3];
        let k = v / self.lf * dt;

        #[rustfmt::skip]
        let b = Matrix6x2::new(
            0.0, 0.0,
            0.0, 0.0,
            k,   0.0,
            0.0, dt,
            0.0, 0.0,
            k,   0.0,
        );
        b
    }
}

impl MotionModel for ErrorDynamics<'_> {
    type State = VehicleState;
    type Control = Actuation;

    fn propagate(&self, state: &VehicleState, control: &Actuation, dt: f64) -> VehicleState {
        self.step(&state.to_vector(), control, dt).into()
    }

    fn jacobian_state(&self, state: &VehicleState, control: &Actuation, dt: f64) -> DMatrix<f64> {
        let a = self.state_jacobian(&state.to_vector(), control, dt);
        DMatrix::from_column_slice(6, 6, a.as_slice())
    }

    fn jacobian_control(&self, state: &VehicleState, control: &Actuation, dt: f64) -> DMatrix<f64> {
        let b = self.control_jacobian(&state.to_vector(), control, dt);
        DMatrix::from_column_slice(6, 2, b.as_slice())
    }
}
