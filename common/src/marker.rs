use crate::geometry::{self, GeometryError};
use nalgebra::Point2;
use std::fmt::Display;

pub type MarkerId = u32;

/// The four detected corners of a marker, in pixel space.
///
/// Order is the detector's: top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkerCorners([Point2<f64>; 4]);

impl MarkerCorners {
    pub const fn new(corners: [Point2<f64>; 4]) -> Self {
        Self(corners)
    }

    pub fn points(&self) -> &[Point2<f64>; 4] {
        &self.0
    }

    pub fn perimeter(&self) -> f64 {
        geometry::perimeter(&self.0)
    }
}

impl TryFrom<&[Point2<f64>]> for MarkerCorners {
    type Error = GeometryError;

    fn try_from(points: &[Point2<f64>]) -> Result<Self, Self::Error> {
        let corners: [Point2<f64>; 4] =
            points
                .try_into()
                .map_err(|_| GeometryError::InvalidInput {
                    expected: 4,
                    got: points.len(),
                })?;

        Ok(Self(corners))
    }
}

impl TryFrom<Vec<Point2<f64>>> for MarkerCorners {
    type Error = GeometryError;

    fn try_from(points: Vec<Point2<f64>>) -> Result<Self, Self::Error> {
        points.as_slice().try_into()
    }
}

impl From<[(f64, f64); 4]> for MarkerCorners {
    fn from(corners: [(f64, f64); 4]) -> Self {
        Self(corners.map(|(x, y)| Point2::new(x, y)))
    }
}

/// One marker as reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Detection {
    pub id: MarkerId,
    pub corners: MarkerCorners,
}

impl Detection {
    pub const fn new(id: MarkerId, corners: MarkerCorners) -> Self {
        Self { id, corners }
    }
}

/// Finds markers in a frame.
pub trait Detector<F> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn detect(&mut self, frame: &F) -> Result<Vec<Detection>, Self::Error>;
}

/// A physical marker the pilot knows how to measure.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkerSpec {
    pub id: MarkerId,
    /// Side length in the system's native unit (mm for the stock markers)
    pub size: f64,
    /// Native unit -> pose primitive unit
    pub unit_divisor: f64,
}

impl MarkerSpec {
    pub const DEFAULT_UNIT_DIVISOR: f64 = 10.;

    pub const fn new(id: MarkerId, size: f64) -> Self {
        Self {
            id,
            size,
            unit_divisor: Self::DEFAULT_UNIT_DIVISOR,
        }
    }

    pub fn with_unit_divisor(mut self, unit_divisor: f64) -> Self {
        self.unit_divisor = unit_divisor;
        self
    }

    /// Half the side length as handed to the pose primitive
    pub fn pose_half_size(&self) -> f64 {
        self.size / self.unit_divisor / 2.
    }
}

/// A measured marker, relative to the frame center.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkerObservation {
    pub id: MarkerId,
    /// Offset from the frame center in pixels, positive y is up
    pub center: Point2<f64>,
    /// Shrinks as the marker gets closer, see [`crate::extract::distance_proxy`]
    pub distance: f64,
    /// **In degrees**, `None` if attitude wasn't estimated for this marker
    pub yaw: Option<f64>,
}

impl Display for MarkerObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} ({:.1}; {:.1}) d={:.2}",
            self.id, self.center.x, self.center.y, self.distance
        )?;

        if let Some(yaw) = self.yaw {
            write!(f, " {yaw:.1}°")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_require_four_points() {
        let pts = vec![Point2::new(1., 2.); 4];
        assert!(MarkerCorners::try_from(pts).is_ok());

        let pts = vec![Point2::new(1., 2.); 3];
        assert_eq!(
            MarkerCorners::try_from(pts),
            Err(GeometryError::InvalidInput {
                expected: 4,
                got: 3
            })
        );
    }

    #[test]
    fn pose_half_size_applies_unit_divisor() {
        let spec = MarkerSpec::new(81, 100.);
        assert_eq!(spec.pose_half_size(), 5.);
        assert_eq!(spec.with_unit_divisor(1000.).pose_half_size(), 0.05);
    }
}
