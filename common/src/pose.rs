use crate::{
    camera::CameraModel,
    geometry::{self, EulerAngles, GeometryError},
    marker::MarkerCorners,
};
use nalgebra::{Matrix3, Rotation3, SMatrix, SVector, UnitQuaternion, Vector3};
use thiserror::Error as ThisError;

/// 180° about the x axis, turns the tag frame (y up, z out of the tag) into
/// the camera's (y down, z into the scene).
pub fn flip_x() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(1., -1., -1.))
}

#[derive(Debug, ThisError)]
pub enum PoseError {
    #[error("Marker homography is degenerate")]
    DegenerateHomography,

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[cfg(feature = "cv")]
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// Marker pose in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Rodrigues rotation vector (tag -> camera)
    pub rvec: Vector3<f64>,
    /// Tag center in the camera frame, in the unit of the `half_size` it was estimated with
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn rotation(&self) -> Matrix3<f64> {
        rodrigues(&self.rvec)
    }

    /// Attitude of the marker as seen from the (flipped) camera frame
    pub fn marker_attitude(&self) -> Result<EulerAngles, GeometryError> {
        let r_tc = self.rotation().transpose();
        geometry::rotation_matrix_to_euler(&(flip_x() * r_tc))
    }
}

/// Rotation vector -> rotation matrix
pub fn rodrigues(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(*rvec).into_inner()
}

/// Rotation matrix -> rotation vector, stable for half turns
pub fn rotation_vector(r: &Matrix3<f64>) -> Vector3<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*r)).scaled_axis()
}

/// Single-marker pose primitive.
pub trait PoseEstimator: Send + Sync {
    /// `half_size` is half of the marker's side length; the translation comes
    /// back in the same unit.
    fn estimate(
        &self,
        corners: &MarkerCorners,
        half_size: f64,
        camera: &CameraModel,
    ) -> Result<Pose, PoseError>;
}

/// Planar pose from the exact four point homography.
///
/// The model square is `(-h, h)`, `(h, h)`, `(h, -h)`, `(-h, -h)` matching the
/// detector's corner order, i.e. OpenCV's `SOLVEPNP_IPPE_SQUARE` layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct HomographyPoseEstimator;

impl HomographyPoseEstimator {
    const MODEL: [(f64, f64); 4] = [(-1., 1.), (1., 1.), (1., -1.), (-1., -1.)];

    /// H (with `h33 = 1`) mapping the unit model square onto normalized image points
    fn homography(image: &[(f64, f64); 4]) -> Option<Matrix3<f64>> {
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (k, (&(x, y), &(u, v))) in Self::MODEL.iter().zip(image).enumerate() {
            let r0 = 2 * k;
            a[(r0, 0)] = x;
            a[(r0, 1)] = y;
            a[(r0, 2)] = 1.;
            a[(r0, 6)] = -u * x;
            a[(r0, 7)] = -u * y;
            b[r0] = u;

            let r1 = r0 + 1;
            a[(r1, 3)] = x;
            a[(r1, 4)] = y;
            a[(r1, 5)] = 1.;
            a[(r1, 6)] = -v * x;
            a[(r1, 7)] = -v * y;
            b[r1] = v;
        }

        let h = a.lu().solve(&b)?;

        Some(Matrix3::new(
            h[0], h[1], h[2], //
            h[3], h[4], h[5], //
            h[6], h[7], 1.,
        ))
    }
}

impl PoseEstimator for HomographyPoseEstimator {
    fn estimate(
        &self,
        corners: &MarkerCorners,
        half_size: f64,
        camera: &CameraModel,
    ) -> Result<Pose, PoseError> {
        if corners.perimeter() < 1e-9 {
            return Err(PoseError::DegenerateHomography);
        }

        let image = corners.points().map(|p| {
            let n = camera.normalize(&p);
            (n.x, n.y)
        });

        let h = Self::homography(&image).ok_or(PoseError::DegenerateHomography)?;

        // h1 ~ r1, h2 ~ r2, h3 ~ t
        let (h1, h2, h3) = (h.column(0), h.column(1), h.column(2));
        let scale = (h1.norm() + h2.norm()) / 2.;
        if scale < 1e-12 {
            return Err(PoseError::DegenerateHomography);
        }

        // h33 = 1 already puts the marker in front of the camera
        let r1 = h1 / scale;
        let r2 = h2 / scale;
        let t = h3 / scale;
        let r3 = r1.cross(&r2);

        // closest proper rotation
        let raw = Matrix3::from_columns(&[r1, r2, r3]);
        let svd = raw.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(PoseError::DegenerateHomography);
        };
        let d = (u * v_t).determinant().signum();
        let r = u * Matrix3::from_diagonal(&Vector3::new(1., 1., d)) * v_t;

        Ok(Pose {
            rvec: rotation_vector(&r),
            tvec: t * half_size,
        })
    }
}
