use nalgebra::{Matrix3, Point2};
use thiserror::Error as ThisError;

/// Tolerance for `||R^T R - I||` and for the gimbal lock branch.
pub const ROTATION_EPSILON: f64 = 1e-6;

#[derive(Debug, ThisError, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Expected exactly {expected} points, got {got}")]
    InvalidInput { expected: usize, got: usize },

    #[error("Not a rotation matrix (||RᵀR - I|| = {deviation:e})")]
    NotARotationMatrix { deviation: f64 },

    #[error("Degenerate marker quadrilateral (perimeter {perimeter})")]
    DegenerateMarker { perimeter: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EulerAngles {
    /// **in radians**
    pub roll: f64,
    /// **in radians**
    pub pitch: f64,
    /// **in radians**
    pub yaw: f64,
}

impl std::fmt::Display for EulerAngles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(r {:.2}° p {:.2}° y {:.2}°)",
            self.roll.to_degrees(),
            self.pitch.to_degrees(),
            self.yaw.to_degrees()
        )
    }
}

/// Mean of exactly four points
pub fn centroid(points: &[Point2<f64>]) -> Result<Point2<f64>, GeometryError> {
    if points.len() != 4 {
        return Err(GeometryError::InvalidInput {
            expected: 4,
            got: points.len(),
        });
    }

    let (sx, sy) = points
        .iter()
        .fold((0., 0.), |(sx, sy), p| (sx + p.x, sy + p.y));

    Ok(Point2::new(sx / 4., sy / 4.))
}

/// Length of the closed polygon through `points`, closing edge included.
pub fn perimeter(points: &[Point2<f64>]) -> f64 {
    let Some(first) = points.first() else {
        return 0.;
    };

    points
        .windows(2)
        .map(|w| nalgebra::distance(&w[0], &w[1]))
        .sum::<f64>()
        + points.last().map_or(0., |last| nalgebra::distance(last, first))
}

fn orthonormality_deviation(r: &Matrix3<f64>) -> f64 {
    (r.transpose() * r - Matrix3::identity()).norm()
}

pub fn is_rotation_matrix(r: &Matrix3<f64>) -> bool {
    orthonormality_deviation(r) < ROTATION_EPSILON
}

/// Decomposes `r` into roll (x), pitch (y) and yaw (z).
///
/// Near gimbal lock (`sqrt(r00² + r10²) < 1e-6`) yaw is pinned to zero and the
/// whole rotation about the vertical is attributed to roll.
pub fn rotation_matrix_to_euler(r: &Matrix3<f64>) -> Result<EulerAngles, GeometryError> {
    let deviation = orthonormality_deviation(r);
    if deviation >= ROTATION_EPSILON {
        return Err(GeometryError::NotARotationMatrix { deviation });
    }

    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    Ok(if sy >= ROTATION_EPSILON {
        EulerAngles {
            roll: r[(2, 1)].atan2(r[(2, 2)]),
            pitch: (-r[(2, 0)]).atan2(sy),
            yaw: r[(1, 0)].atan2(r[(0, 0)]),
        }
    } else {
        EulerAngles {
            roll: (-r[(1, 2)]).atan2(r[(1, 1)]),
            pitch: (-r[(2, 0)]).atan2(sy),
            yaw: 0.,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Rotation3, Vector3};
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn centroid_is_the_mean() {
        let pts = [
            Point2::new(10., 20.),
            Point2::new(30., 20.),
            Point2::new(30., 60.),
            Point2::new(10., 60.),
        ];
        assert_eq!(centroid(&pts), Ok(Point2::new(20., 40.)));

        let skewed = [
            Point2::new(-3., 1.5),
            Point2::new(7., 2.),
            Point2::new(4., -9.),
            Point2::new(0., 0.5),
        ];
        let c = centroid(&skewed).unwrap();
        assert_abs_diff_eq!(c.x, 2., epsilon = 1e-12);
        assert_abs_diff_eq!(c.y, -1.25, epsilon = 1e-12);
    }

    #[test]
    fn centroid_rejects_wrong_point_count() {
        let three = [Point2::new(0., 0.); 3];
        let five = [Point2::new(0., 0.); 5];

        assert_eq!(
            centroid(&three),
            Err(GeometryError::InvalidInput {
                expected: 4,
                got: 3
            })
        );
        assert!(matches!(
            centroid(&five),
            Err(GeometryError::InvalidInput { got: 5, .. })
        ));
        assert!(centroid(&[]).is_err());
    }

    #[test]
    fn perimeter_closes_the_polygon() {
        let square = [
            Point2::new(0., 0.),
            Point2::new(5., 0.),
            Point2::new(5., 5.),
            Point2::new(0., 5.),
        ];
        assert_abs_diff_eq!(perimeter(&square), 20., epsilon = 1e-12);
        assert_eq!(perimeter(&[]), 0.);
    }

    #[test]
    fn rotation_validity() {
        assert!(is_rotation_matrix(&Matrix3::identity()));

        let r = Rotation3::from_euler_angles(0.3, -1.1, 2.4);
        assert!(is_rotation_matrix(r.matrix()));

        let duplicated_row = Matrix3::new(
            1., 0., 0., //
            1., 0., 0., //
            0., 0., 1.,
        );
        assert!(!is_rotation_matrix(&duplicated_row));
    }

    #[test]
    fn euler_of_identity_is_zero() {
        let e = rotation_matrix_to_euler(&Matrix3::identity()).unwrap();
        assert_eq!((e.roll, e.pitch, e.yaw), (0., 0., 0.));
    }

    #[test]
    fn euler_of_quarter_turn_about_z() {
        let r = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let e = rotation_matrix_to_euler(r.matrix()).unwrap();

        assert_abs_diff_eq!(e.yaw.to_degrees(), 90., epsilon = 1e-9);
        assert_abs_diff_eq!(e.pitch, 0., epsilon = 1e-12);
        assert_abs_diff_eq!(e.roll, 0., epsilon = 1e-12);
    }

    #[test]
    fn euler_matches_nalgebra_convention() {
        let r = Rotation3::from_euler_angles(0.2, -0.4, 1.3);
        let e = rotation_matrix_to_euler(r.matrix()).unwrap();

        assert_abs_diff_eq!(e.roll, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(e.pitch, -0.4, epsilon = 1e-9);
        assert_abs_diff_eq!(e.yaw, 1.3, epsilon = 1e-9);
    }

    #[test]
    fn gimbal_lock_pins_yaw() {
        let r = Rotation3::from_euler_angles(0.5, FRAC_PI_2, 0.);
        let e = rotation_matrix_to_euler(r.matrix()).unwrap();

        assert_eq!(e.yaw, 0.);
        assert_abs_diff_eq!(e.pitch, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_matrix_is_rejected() {
        let scaled = Matrix3::identity() * 2.;
        assert!(matches!(
            rotation_matrix_to_euler(&scaled),
            Err(GeometryError::NotARotationMatrix { .. })
        ));
    }
}
