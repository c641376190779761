//! Per-frame geometry: eye aspect ratio and head tilt.
//!
//! Every function here is total. The detector runs at ~10 Hz and a single
//! bad frame must still yield a usable number, so degenerate input maps to
//! documented sentinel values instead of errors.

use serde::Serialize;

use crate::landmarks::Point;

/// EAR reported when the eye geometry is degenerate or unusable (eyes open).
pub const SENTINEL_OPEN_EAR: f64 = 0.35;
/// Lower clamp bound for EAR.
pub const EAR_MIN: f64 = 0.10;
/// Upper clamp bound for EAR.
pub const EAR_MAX: f64 = 0.45;

/// Eye openness for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyeMetrics {
    pub left_ear: f64,
    pub right_ear: f64,
    pub average_ear: f64,
}

impl EyeMetrics {
    pub fn from_eyes(left: &[Point], right: &[Point]) -> Self {
        let left_ear = compute_ear(left);
        let right_ear = compute_ear(right);
        Self {
            left_ear,
            right_ear,
            average_ear: average_ear(left_ear, right_ear),
        }
    }
}

/// Eye aspect ratio of a six-point eye region `[p1..p6]`:
///
/// `(|p2 - p6| + |p3 - p5|) / (2 * |p1 - p4|)`
///
/// Returns [`SENTINEL_OPEN_EAR`] when the region does not have six points,
/// when `p1 == p4`, or when the ratio is not finite. Otherwise the ratio is
/// clamped to `[EAR_MIN, EAR_MAX]`.
pub fn compute_ear(eye: &[Point]) -> f64 {
    let [p1, p2, p3, p4, p5, p6] = eye else {
        return SENTINEL_OPEN_EAR;
    };

    let horizontal = p1.distance(p4);
    if horizontal == 0.0 {
        return SENTINEL_OPEN_EAR;
    }

    let ear = (p2.distance(p6) + p3.distance(p5)) / (2.0 * horizontal);
    if !ear.is_finite() {
        return SENTINEL_OPEN_EAR;
    }
    ear.clamp(EAR_MIN, EAR_MAX)
}

pub fn average_ear(left: f64, right: f64) -> f64 {
    (left + right) / 2.0
}

/// Signed head roll: `sin(atan2(dy, dx))` of the vector from the left-eye
/// centroid to the right-eye centroid. Negative when the subject tilts
/// left, positive when they tilt right. Not clamped.
///
/// Both point sets must be non-empty; callers check this through
/// [`LandmarkSet::head_pose_eyes`](crate::LandmarkSet::head_pose_eyes).
pub fn compute_head_tilt(left_eye: &[Point], right_eye: &[Point]) -> f64 {
    debug_assert!(!left_eye.is_empty() && !right_eye.is_empty());
    let left = centroid(left_eye);
    let right = centroid(right_eye);
    let angle = (right.y - left.y).atan2(right.x - left.x);
    angle.sin()
}

fn centroid(points: &[Point]) -> Point {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Eye with corners at x=0 and x=`width`, lids `half_height` above/below.
    fn eye(width: f64, half_height: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(width / 3.0, -half_height),
            Point::new(2.0 * width / 3.0, -half_height),
            Point::new(width, 0.0),
            Point::new(2.0 * width / 3.0, half_height),
            Point::new(width / 3.0, half_height),
        ]
    }

    fn eye_at(cx: f64, cy: f64) -> Vec<Point> {
        eye(10.0, 2.0)
            .into_iter()
            .map(|p| Point::new(p.x + cx - 5.0, p.y + cy))
            .collect()
    }

    #[test]
    fn test_ear_open_eye() {
        // verticals = 2 * 3.0, horizontal = 10 -> (3 + 3) / 20 = 0.3
        let ear = compute_ear(&eye(10.0, 1.5));
        assert!((ear - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_ear_clamped_low() {
        let ear = compute_ear(&eye(10.0, 0.0));
        assert_eq!(ear, EAR_MIN);
    }

    #[test]
    fn test_ear_clamped_high() {
        let ear = compute_ear(&eye(10.0, 20.0));
        assert_eq!(ear, EAR_MAX);
    }

    #[test]
    fn test_ear_degenerate_corners() {
        let mut points = eye(10.0, 1.5);
        points[3] = points[0];
        assert_eq!(compute_ear(&points), SENTINEL_OPEN_EAR);
    }

    #[test]
    fn test_ear_wrong_point_count() {
        assert_eq!(compute_ear(&[]), SENTINEL_OPEN_EAR);
        assert_eq!(compute_ear(&eye(10.0, 1.5)[..5]), SENTINEL_OPEN_EAR);
    }

    #[test]
    fn test_ear_nan_point() {
        let mut points = eye(10.0, 1.5);
        points[1] = Point::new(f64::NAN, 0.0);
        assert_eq!(compute_ear(&points), SENTINEL_OPEN_EAR);
    }

    #[test]
    fn test_eye_metrics_average() {
        let m = EyeMetrics::from_eyes(&eye(10.0, 1.5), &eye(10.0, 0.0));
        assert!((m.left_ear - 0.3).abs() < 1e-12);
        assert_eq!(m.right_ear, EAR_MIN);
        assert!((m.average_ear - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_tilt_level_head() {
        let tilt = compute_head_tilt(&eye_at(30.0, 50.0), &eye_at(70.0, 50.0));
        assert!(tilt.abs() < 1e-12);
    }

    #[test]
    fn test_tilt_sign() {
        // Right eye higher in the image (smaller y) -> negative tilt.
        let left_tilt = compute_head_tilt(&eye_at(30.0, 50.0), &eye_at(70.0, 40.0));
        assert!(left_tilt < -0.10);

        let right_tilt = compute_head_tilt(&eye_at(30.0, 50.0), &eye_at(70.0, 60.0));
        assert!(right_tilt > 0.10);
    }

    #[test]
    fn test_tilt_value() {
        // dx = 40, dy = 30 -> sin(atan2(30, 40)) = 0.6
        let tilt = compute_head_tilt(&[Point::new(0.0, 0.0)], &[Point::new(40.0, 30.0)]);
        assert!((tilt - 0.6).abs() < 1e-12);
    }

    fn point() -> impl Strategy<Value = Point> {
        (-1000.0f64..1000.0, -1000.0f64..1000.0).prop_map(|(x, y)| Point::new(x, y))
    }

    proptest! {
        #[test]
        fn prop_ear_within_bounds(points in prop::collection::vec(point(), 6)) {
            let ear = compute_ear(&points);
            prop_assert!((EAR_MIN..=EAR_MAX).contains(&ear));
        }

        #[test]
        fn prop_coincident_corners_give_sentinel(points in prop::collection::vec(point(), 6)) {
            let mut points = points;
            points[3] = points[0];
            prop_assert_eq!(compute_ear(&points), SENTINEL_OPEN_EAR);
        }
    }
}
