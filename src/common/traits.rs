//! Common traits defining interfaces for the control pipeline

use nalgebra::DMatrix;

use crate::common::error::MpcResult;

/// Trait for vehicle motion models
pub trait MotionModel {
    /// State type
    type State;
    /// Control type
    type Control;

    /// Propagate state forward in time
    fn propagate(&self, state: &Self::State, control: &Self::Control, dt: f64) -> Self::State;

    /// Compute Jacobian of the propagated state with respect to the state
    fn jacobian_state(&self, state: &Self::State, control: &Self::Control, dt: f64)
        -> DMatrix<f64>;

    /// Compute Jacobian of the propagated state with respect to the control
    fn jacobian_control(&self, state: &Self::State, control: &Self::Control, dt: f64)
        -> DMatrix<f64>;
}

/// Trait for per-cycle controllers (one input event in, one command out)
pub trait Controller {
    /// Input event type
    type Input;
    /// Output command type
    type Output;

    /// Run one control cycle
    fn compute(&mut self, input: &Self::Input) -> MpcResult<Self::Output>;

    /// Drop any state carried between cycles
    fn reset(&mut self);
}
