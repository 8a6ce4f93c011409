//! Global to vehicle frame transform
//!
//! Rotates by -yaw after translating by -position, so the vehicle sits at the
//! origin looking along +x.

use crate::common::{Frame, MpcError, MpcResult, Point2D, Pose2D, Waypoints};

/// Transform a single global point into the frame of `pose`
pub fn point_to_vehicle_frame(pose: &Pose2D, p: Point2D) -> Point2D {
    let (sin, cos) = pose.yaw.sin_cos();
    let dx = p.x - pose.x;
    let dy = p.y - pose.y;
    Point2D::new(cos * dx + sin * dy, -sin * dx + cos * dy)
}

/// Inverse of `point_to_vehicle_frame`
pub fn point_to_global_frame(pose: &Pose2D, p: Point2D) -> Point2D {
    let (sin, cos) = pose.yaw.sin_cos();
    Point2D::new(
        pose.x + cos * p.x - sin * p.y,
        pose.y + sin * p.x + cos * p.y,
    )
}

/// Express global waypoints in the vehicle frame.
///
/// `pose.yaw` must already be normalized to (-pi, pi].
pub fn to_vehicle_frame(pose: &Pose2D, waypoints: &Waypoints) -> MpcResult<Waypoints> {
    if waypoints.frame() != Frame::Global {
        return Err(MpcError::invalid_input("waypoints are already in the vehicle frame"));
    }
    let local: Vec<Point2D> = waypoints
        .points()
        .map(|p| point_to_vehicle_frame(pose, p))
        .collect();
    Ok(Waypoints::from_points(Frame::Vehicle, &local))
}

/// Express vehicle-frame waypoints in the global frame
pub fn to_global_frame(pose: &Pose2D, waypoints: &Waypoints) -> MpcResult<Waypoints> {
    if waypoints.frame() != Frame::Vehicle {
        return Err(MpcError::invalid_input("waypoints are already in the global frame"));
    }
    let global: Vec<Point2D> = waypoints
        .points()
        .map(|p| point_to_global_frame(pose, p))
        .collect();
    Ok(Waypoints::from_points(Frame::Global, &global))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    #[test]
    fn test_identity_pose() {
        let p = point_to_vehicle_frame(&Pose2D::origin(), Point2D::new(3.0, -2.0));
        assert!((p.x - 3.0).abs() < 1e-12);
        assert!((p.y + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_ahead_lands_on_x_axis() {
        // Vehicle at (1, 1) looking along +y; a point 5 m further along +y is straight ahead
        let pose = Pose2D::new(1.0, 1.0, PI / 2.0);
        let p = point_to_vehicle_frame(&pose, Point2D::new(1.0, 6.0));
        assert!((p.x - 5.0).abs() < 1e-12);
        assert!(p.y.abs() < 1e-12);

        // A point to the global +x is on the vehicle's right (negative local y)
        let p = point_to_vehicle_frame(&pose, Point2D::new(3.0, 1.0));
        assert!(p.x.abs() < 1e-12);
        assert!((p.y + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_is_invertible() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let pose = Pose2D::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-PI..PI),
            )
            .normalized();
            let p = Point2D::new(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0));

            let back = point_to_global_frame(&pose, point_to_vehicle_frame(&pose, p));
            assert!(back.distance(&p) < 1e-9, "round trip drifted for {:?}", pose);
        }
    }

    #[test]
    fn test_waypoints_frame_tag() {
        let pose = Pose2D::new(10.0, 0.0, 0.0);
        let global = Waypoints::new(Frame::Global, vec![10.0, 20.0], vec![0.0, 5.0]).unwrap();

        let local = to_vehicle_frame(&pose, &global).unwrap();
        assert_eq!(local.frame(), Frame::Vehicle);
        assert!((local.xs()[1] - 10.0).abs() < 1e-12);
        assert!((local.ys()[1] - 5.0).abs() < 1e-12);

        // Transforming twice is a frame error rather than a silent double rotation
        assert!(to_vehicle_frame(&pose, &local).is_err());

        let restored = to_global_frame(&pose, &local).unwrap();
        assert_eq!(restored.frame(), Frame::Global);
        assert!((restored.xs()[1] - 20.0).abs() < 1e-12);
    }
}
