//! Angle helpers

use std::f64::consts::PI;

/// Normalize angle to (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a - 2.0 * PI
    } else {
        a
    }
}

/// Calculate angle difference `a - b` (handles wrap-around)
pub fn angle_diff(a: f64, b: f64) -> f64 {
    normalize_angle(a - b)
}
