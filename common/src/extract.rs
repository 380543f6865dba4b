//! Per-marker measurements: frame-centered position, distance proxy and yaw.

use crate::{
    camera::CameraModel,
    frame::FrameSize,
    geometry::{self, GeometryError},
    marker::{Detection, MarkerCorners, MarkerId, MarkerObservation, MarkerSpec},
    pose::{PoseError, PoseEstimator},
};
use nalgebra::Point2;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ExtractError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("Couldn't estimate pose of marker #{id}: {source}")]
    Pose { id: MarkerId, source: PoseError },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractParams {
    /// Perimeter (px) per unit of the pixel/size ratio
    pub perimeter_divisor: f64,
}

impl ExtractParams {
    pub const DEFAULT_PERIMETER_DIVISOR: f64 = 20.;
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            perimeter_divisor: Self::DEFAULT_PERIMETER_DIVISOR,
        }
    }
}

/// `size / (perimeter / divisor)`; falls as the marker grows in the image.
pub fn distance_proxy(size: f64, perimeter: f64, params: &ExtractParams) -> f64 {
    size / (perimeter / params.perimeter_divisor)
}

/// Marker center relative to the frame center, y pointing up.
pub fn frame_center_offset(
    corners: &MarkerCorners,
    frame: FrameSize,
) -> Result<Point2<f64>, GeometryError> {
    let c = geometry::centroid(corners.points())?;

    Ok(Point2::new(
        c.x - frame.width as f64 / 2.,
        frame.height as f64 / 2. - c.y,
    ))
}

/// Attitude source for pose-bearing markers
pub struct PoseContext<'a> {
    pub estimator: &'a dyn PoseEstimator,
    pub camera: &'a CameraModel,
}

/// Measures one detected marker.
///
/// Yaw is only estimated when `pose` is given.
pub fn observe(
    detection: &Detection,
    spec: &MarkerSpec,
    frame: FrameSize,
    params: &ExtractParams,
    pose: Option<&PoseContext>,
) -> Result<MarkerObservation, ExtractError> {
    let center = frame_center_offset(&detection.corners, frame)?;

    let perimeter = detection.corners.perimeter();
    if perimeter <= 0. {
        return Err(GeometryError::DegenerateMarker { perimeter }.into());
    }
    let distance = distance_proxy(spec.size, perimeter, params);

    let yaw = match pose {
        Some(ctx) => {
            let id = detection.id;
            let pose = ctx
                .estimator
                .estimate(&detection.corners, spec.pose_half_size(), ctx.camera)
                .map_err(|source| ExtractError::Pose { id, source })?;

            Some(pose.marker_attitude()?.yaw.to_degrees())
        }
        None => None,
    };

    Ok(MarkerObservation {
        id: detection.id,
        center,
        distance,
        yaw,
    })
}

/// Measures the first detection of `spec.id`, `None` if it isn't in view.
pub fn find_and_observe(
    detections: &[Detection],
    spec: &MarkerSpec,
    frame: FrameSize,
    params: &ExtractParams,
    pose: Option<&PoseContext>,
) -> Result<Option<MarkerObservation>, ExtractError> {
    let Some(detection) = detections.iter().find(|d| d.id == spec.id) else {
        return Ok(None);
    };

    observe(detection, spec, frame, params, pose).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{
        tests::{facing, project_marker},
        HomographyPoseEstimator,
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    const FRAME: FrameSize = FrameSize::new(640, 480);

    fn square(cx: f64, cy: f64, side: f64) -> MarkerCorners {
        let h = side / 2.;
        MarkerCorners::from([
            (cx - h, cy - h),
            (cx + h, cy - h),
            (cx + h, cy + h),
            (cx - h, cy + h),
        ])
    }

    #[test]
    fn center_is_relative_to_frame_center_with_y_up() {
        let c = frame_center_offset(&square(400., 100., 10.), FRAME).unwrap();
        assert_eq!(c, Point2::new(80., 140.));

        let c = frame_center_offset(&square(320., 240., 10.), FRAME).unwrap();
        assert_eq!(c, Point2::new(0., 0.));
    }

    #[test]
    fn distance_proxy_formula() {
        let params = ExtractParams::default();
        let size = 100.;
        let perimeter = 173.2;

        assert_abs_diff_eq!(
            distance_proxy(size, perimeter, &params),
            size / (perimeter / 20.),
            epsilon = 1e-12
        );

        // a 5 px per side square of the divisor's size reads as its real size
        assert_abs_diff_eq!(distance_proxy(5.5, 20., &params), 5.5, epsilon = 1e-12);
    }

    #[test]
    fn distance_proxy_shrinks_as_marker_grows() {
        let params = ExtractParams::default();
        let spec = MarkerSpec::new(81, 100.);

        let distances: Vec<f64> = [10., 25., 60., 140., 300.]
            .into_iter()
            .map(|side| {
                let d = Detection::new(81, square(320., 240., side));
                observe(&d, &spec, FRAME, &params, None).unwrap().distance
            })
            .collect();

        assert!(distances.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn collapsed_marker_is_rejected() {
        let d = Detection::new(3, MarkerCorners::from([(50., 50.); 4]));
        let err = observe(&d, &MarkerSpec::new(3, 10.), FRAME, &Default::default(), None)
            .unwrap_err();

        assert!(matches!(
            err,
            ExtractError::Geometry(GeometryError::DegenerateMarker { .. })
        ));
    }

    #[test]
    fn absent_marker_is_no_observation() {
        let detections = [Detection::new(7, square(100., 100., 40.))];
        let r = find_and_observe(
            &detections,
            &MarkerSpec::new(81, 100.),
            FRAME,
            &Default::default(),
            None,
        )
        .unwrap();

        assert_eq!(r, None);
    }

    #[test]
    fn yaw_only_with_pose_context() {
        let camera = CameraModel::pinhole(600., 600., 320., 240., (640, 480));
        let spec = MarkerSpec::new(88, 125.);
        let half = spec.pose_half_size();
        let corners = project_marker(&camera, &facing(-15.), &Vector3::new(0., 0., 60.), half);
        let d = Detection::new(88, corners);
        let params = ExtractParams::default();

        let plain = observe(&d, &spec, FRAME, &params, None).unwrap();
        assert_eq!(plain.yaw, None);

        let ctx = PoseContext {
            estimator: &HomographyPoseEstimator,
            camera: &camera,
        };
        let posed = observe(&d, &spec, FRAME, &params, Some(&ctx)).unwrap();
        assert_abs_diff_eq!(posed.yaw.unwrap(), 15., epsilon = 1e-6);
        assert_eq!(posed.center, plain.center);
        assert_eq!(posed.distance, plain.distance);
    }
}
