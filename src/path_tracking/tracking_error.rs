//! Cross-track and heading error against the fitted reference polynomial

use std::f64::consts::PI;

use crate::common::{angle_diff, normalize_angle, Frame, MpcError, MpcResult, Pose2D, Waypoints};
use crate::path_tracking::polynomial::Polynomial;

/// Errors of the current pose relative to the reference path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingError {
    /// Cross-track error `y - f(x)`
    pub cte: f64,
    /// Heading error `psi - desired_heading`, in (-pi, pi]
    pub epsi: f64,
    /// Path tangent heading after disambiguation, in (-pi, pi]
    pub desired_heading: f64,
}

/// Compute cte and epsi for a vehicle-frame `pose`.
///
/// The tangent `atan(f'(x))` only defines the path direction up to pi. The
/// direction of travel is taken from the first two waypoints in the order
/// they were received: if their displacement points against the tangent,
/// the tangent is flipped. With fewer than two waypoints, or two coincident
/// leading waypoints, no flip is applied.
pub fn tracking_error(
    poly: &Polynomial,
    pose: &Pose2D,
    waypoints: &Waypoints,
) -> MpcResult<TrackingError> {
    if waypoints.frame() != Frame::Vehicle {
        return Err(MpcError::invalid_input(
            "tracking error needs vehicle-frame waypoints",
        ));
    }

    let cte = pose.y - poly.eval(pose.x);

    let mut desired_heading = poly.tangent_heading(pose.x);
    if let (Some(p0), Some(p1)) = (waypoints.point(0), waypoints.point(1)) {
        let dx = p1.x - p0.x;
        let dy = p1.y - p0.y;
        if dx * desired_heading.cos() + dy * desired_heading.sin() < 0.0 {
            desired_heading = normalize_angle(desired_heading + PI);
        }
    }

    let epsi = angle_diff(pose.yaw, desired_heading);

    if !cte.is_finite() || !epsi.is_finite() {
        return Err(MpcError::invalid_input("non-finite tracking error"));
    }

    Ok(TrackingError { cte, epsi, desired_heading })
}
