//! Landmark and descriptor types produced by the upstream face detector.
//!
//! The detector uses the 68-point layout. Only the regions the liveness
//! challenge reads are carried here: both eyes (six points each, canonical
//! order `p1..p6` with `p1`/`p4` the horizontal corners), the nose bridge and
//! the 17-point jaw outline.

use serde::{Deserialize, Serialize};

use crate::matcher::{validate_vector, MatchError};

/// Length of an identity descriptor.
pub const DESCRIPTOR_DIM: usize = 128;
/// Points per eye region.
pub const EYE_POINTS: usize = 6;
/// Points in the jaw outline.
pub const JAW_POINTS: usize = 17;
/// Jaw outline index of the chin.
pub const CHIN_INDEX: usize = 8;

/// A 2-D landmark in image coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Landmark regions of the first detected face in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub left_eye: Vec<Point>,
    pub right_eye: Vec<Point>,
    #[serde(default)]
    pub nose: Vec<Point>,
    #[serde(default)]
    pub jaw_outline: Vec<Point>,
}

impl LandmarkSet {
    /// Both eye regions, if each carries exactly [`EYE_POINTS`] points.
    pub fn eyes(&self) -> Option<(&[Point], &[Point])> {
        if self.left_eye.len() == EYE_POINTS && self.right_eye.len() == EYE_POINTS {
            Some((&self.left_eye, &self.right_eye))
        } else {
            None
        }
    }

    /// Eye regions for head-turn measurement.
    ///
    /// Returns `None` unless the chin, the nose bridge and both eyes are all
    /// present; a frame missing any of them is skipped by the head-turn stage.
    pub fn head_pose_eyes(&self) -> Option<(&[Point], &[Point])> {
        self.jaw_outline.get(CHIN_INDEX)?;
        self.nose.first()?;
        if self.left_eye.is_empty() || self.right_eye.is_empty() {
            return None;
        }
        Some((&self.left_eye, &self.right_eye))
    }
}

/// Validated 128-dimension identity descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Descriptor(Vec<f64>);

impl Descriptor {
    /// Wrap raw detector output, rejecting wrong lengths and NaN/Inf values.
    pub fn new(values: Vec<f64>) -> Result<Self, MatchError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(MatchError::LengthMismatch {
                left: values.len(),
                right: DESCRIPTOR_DIM,
            });
        }
        validate_vector(&values)?;
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

impl TryFrom<Vec<f64>> for Descriptor {
    type Error = MatchError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f64> {
    fn from(d: Descriptor) -> Self {
        d.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye(offset: f64) -> Vec<Point> {
        (0..EYE_POINTS)
            .map(|i| Point::new(offset + i as f64, 10.0))
            .collect()
    }

    fn full_face() -> LandmarkSet {
        LandmarkSet {
            left_eye: eye(0.0),
            right_eye: eye(40.0),
            nose: vec![Point::new(25.0, 20.0)],
            jaw_outline: (0..JAW_POINTS)
                .map(|i| Point::new(i as f64 * 3.0, 60.0))
                .collect(),
        }
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_point_pair_conversion() {
        let p = Point::from([1.5, -2.0]);
        assert_eq!(p, Point::new(1.5, -2.0));
        let pair: [f64; 2] = p.into();
        assert_eq!(pair, [1.5, -2.0]);
    }

    #[test]
    fn test_eyes_require_six_points() {
        let mut face = full_face();
        assert!(face.eyes().is_some());
        face.right_eye.pop();
        assert!(face.eyes().is_none());
    }

    #[test]
    fn test_head_pose_requires_chin_and_nose() {
        let face = full_face();
        assert!(face.head_pose_eyes().is_some());

        let mut no_chin = full_face();
        no_chin.jaw_outline.truncate(CHIN_INDEX);
        assert!(no_chin.head_pose_eyes().is_none());

        let mut no_nose = full_face();
        no_nose.nose.clear();
        assert!(no_nose.head_pose_eyes().is_none());

        let mut no_eye = full_face();
        no_eye.left_eye.clear();
        assert!(no_eye.head_pose_eyes().is_none());
    }

    #[test]
    fn test_descriptor_rejects_wrong_length() {
        let err = Descriptor::new(vec![0.5; 64]).unwrap_err();
        assert_eq!(
            err,
            MatchError::LengthMismatch {
                left: 64,
                right: DESCRIPTOR_DIM
            }
        );
    }

    #[test]
    fn test_descriptor_rejects_nan() {
        let mut values = vec![0.5; DESCRIPTOR_DIM];
        values[7] = f64::NAN;
        let err = Descriptor::new(values).unwrap_err();
        assert_eq!(err, MatchError::InvalidVectorValue { index: 7 });
    }

    #[test]
    fn test_descriptor_accepts_valid() {
        let values: Vec<f64> = (0..DESCRIPTOR_DIM).map(|i| i as f64 / 128.0).collect();
        let d = Descriptor::new(values.clone()).unwrap();
        assert_eq!(d.as_slice(), values.as_slice());
        assert_eq!(d.into_vec(), values);
    }
}
