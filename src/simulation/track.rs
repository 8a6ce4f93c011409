//! Synthetic closed race track

use std::f64::consts::TAU;

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::common::{Frame, MpcError, MpcResult, Point2D, Pose2D, Waypoints};

/// Closed polyline, traversed counter-clockwise in point order
#[derive(Debug, Clone)]
pub struct Track {
    points: Vec<Point2D>,
}

impl Track {
    pub fn from_points(points: Vec<Point2D>) -> MpcResult<Self> {
        if points.len() < 3 {
            return Err(MpcError::invalid_input(format!(
                "a closed track needs at least 3 points, got {}",
                points.len()
            )));
        }
        Ok(Self { points })
    }

    /// Ellipse with semi-axes `rx`, `ry` whose radius is modulated by
    /// `wobble * sin(3 theta)`, sampled at `samples` points.
    pub fn oval(rx: f64, ry: f64, wobble: f64, samples: usize) -> Self {
        let samples = samples.max(3);
        let points = (0..samples)
            .map(|i| {
                let theta = TAU * i as f64 / samples as f64;
                let scale = 1.0 + wobble * (3.0 * theta).sin();
                Point2D::new(rx * scale * theta.cos(), ry * scale * theta.sin())
            })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn segments(&self) -> impl Iterator<Item = (&Point2D, &Point2D)> + '_ {
        self.points.iter().chain(self.points.first()).tuple_windows()
    }

    /// Total length of the closed loop
    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance(b)).sum()
    }

    /// Pose at the first track point, heading towards the second
    pub fn start_pose(&self) -> Pose2D {
        let (a, b) = (self.points[0], self.points[1]);
        Pose2D::new(a.x, a.y, (b.y - a.y).atan2(b.x - a.x))
    }

    pub fn nearest_index(&self, p: &Point2D) -> usize {
        self.points
            .iter()
            .position_min_by_key(|q| OrderedFloat(q.distance(p)))
            .unwrap_or(0)
    }

    /// Distance from `p` to the closest point on the polyline
    pub fn distance_to(&self, p: &Point2D) -> f64 {
        self.segments()
            .map(|(a, b)| OrderedFloat(distance_to_segment(p, a, b)))
            .min()
            .map_or(f64::INFINITY, |d| d.0)
    }

    /// The next `count` track points strictly ahead of `pose`, in global
    /// coordinates
    pub fn waypoints_ahead(&self, pose: &Pose2D, count: usize) -> Waypoints {
        let n = self.points.len();
        let mut start = self.nearest_index(&pose.position());
        let nearest = self.points[start];
        let (sin, cos) = pose.yaw.sin_cos();
        if (nearest.x - pose.x) * cos + (nearest.y - pose.y) * sin <= 0.0 {
            start = (start + 1) % n;
        }
        let ahead: Vec<Point2D> = (0..count.min(n)).map(|i| self.points[(start + i) % n]).collect();
        Waypoints::from_points(Frame::Global, &ahead)
    }
}

fn distance_to_segment(p: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 <= 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(&Point2D::new(a.x + t * dx, a.y + t * dy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_length() {
        let track = Track::oval(50.0, 50.0, 0.0, 720);
        assert!((track.length() - TAU * 50.0).abs() < 0.1);
    }

    #[test]
    fn test_distance_to_track() {
        let track = Track::oval(50.0, 50.0, 0.0, 720);
        assert!(track.distance_to(&Point2D::new(50.0, 0.0)) < 1e-9);
        assert!((track.distance_to(&Point2D::new(45.0, 0.0)) - 5.0).abs() < 0.01);
        assert!((track.distance_to(&Point2D::origin()) - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_start_pose_is_counter_clockwise() {
        let track = Track::oval(100.0, 60.0, 0.1, 200);
        let pose = track.start_pose();
        assert!(pose.yaw > 0.0 && pose.yaw < std::f64::consts::PI);
    }

    #[test]
    fn test_waypoints_ahead_skip_points_behind() {
        let track = Track::from_points(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
            Point2D::new(0.0, 10.0),
        ])
        .unwrap();
        let wps = track.waypoints_ahead(&Pose2D::new(1.0, 0.0, 0.0), 3);
        assert_eq!(wps.frame(), Frame::Global);
        assert_eq!(wps.xs(), &[10.0, 10.0, 0.0]);
        assert_eq!(wps.ys(), &[0.0, 10.0, 10.0]);
    }

    #[test]
    fn test_too_few_points() {
        assert!(Track::from_points(vec![Point2D::origin(), Point2D::new(1.0, 0.0)]).is_err());
    }
}
