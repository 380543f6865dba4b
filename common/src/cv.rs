//! OpenCV adapters for the detector, pose and calibration seams.

use crate::{
    camera::CameraModel,
    frame::{Frame, FrameSize},
    marker::{Detection, Detector, MarkerCorners},
    pose::{Pose, PoseError, PoseEstimator},
};
use nalgebra::{Matrix3, Point2, Vector3};
use opencv::{calib3d, core, imgproc, objdetect, prelude::*, types};

fn invalid(message: impl Into<String>) -> opencv::Error {
    opencv::Error::new(core::StsBadArg, message.into())
}

/// Marker bit-grid size, mapped to the matching 1000 marker dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryKind {
    Grid4,
    Grid5,
    Grid6,
    Grid7,
}

impl DictionaryKind {
    pub fn predefined(self) -> objdetect::PredefinedDictionaryType {
        use objdetect::PredefinedDictionaryType::*;

        match self {
            Self::Grid4 => DICT_4X4_1000,
            Self::Grid5 => DICT_5X5_1000,
            Self::Grid6 => DICT_6X6_1000,
            Self::Grid7 => DICT_7X7_1000,
        }
    }

    pub fn dictionary(self) -> opencv::Result<objdetect::Dictionary> {
        objdetect::get_predefined_dictionary(self.predefined())
    }
}

impl TryFrom<u8> for DictionaryKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            4 => Self::Grid4,
            5 => Self::Grid5,
            6 => Self::Grid6,
            7 => Self::Grid7,
            _ => return Err(value),
        })
    }
}

/// ArUco marker detector, keeps the last raw result around for drawing.
pub struct ArucoDetector {
    detector: objdetect::ArucoDetector,
    corners: types::VectorOfVectorOfPoint2f,
    rejected: types::VectorOfVectorOfPoint2f,
    marker_ids: core::Vector<i32>,
}

impl ArucoDetector {
    pub fn new(kind: DictionaryKind) -> opencv::Result<Self> {
        Ok(Self {
            detector: objdetect::ArucoDetector::new(
                &kind.dictionary()?,
                &objdetect::DetectorParameters::default()?,
                objdetect::RefineParameters {
                    min_rep_distance: 0.5,
                    error_correction_rate: 1.0,
                    check_all_orders: true,
                },
            )?,
            corners: types::VectorOfVectorOfPoint2f::new(),
            rejected: types::VectorOfVectorOfPoint2f::new(),
            marker_ids: core::Vector::<i32>::new(),
        })
    }

    /// Outlines the markers found by the last `detect` call
    pub fn draw_last(&self, image: &mut Mat) -> opencv::Result<()> {
        if self.marker_ids.is_empty() {
            return Ok(());
        }

        objdetect::draw_detected_markers(
            image,
            &self.corners,
            &self.marker_ids,
            core::Scalar::new(0.0, 255.0, 0.0, 1.0),
        )
    }
}

impl Detector<Mat> for ArucoDetector {
    type Error = opencv::Error;

    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, Self::Error> {
        self.detector.detect_markers(
            frame,
            &mut self.corners,
            &mut self.marker_ids,
            &mut self.rejected,
        )?;

        let mut detections = Vec::with_capacity(self.marker_ids.len());
        for (id, quad) in self.marker_ids.iter().zip(self.corners.iter()) {
            let Ok(id) = u32::try_from(id) else {
                continue;
            };

            let points: Vec<Point2<f64>> = quad
                .iter()
                .map(|p| Point2::new(p.x as f64, p.y as f64))
                .collect();
            let corners = MarkerCorners::try_from(points).map_err(|e| invalid(e.to_string()))?;

            detections.push(Detection::new(id, corners));
        }

        Ok(detections)
    }
}

impl Frame for Mat {
    fn size(&self) -> FrameSize {
        FrameSize::new(self.cols().max(0) as u32, self.rows().max(0) as u32)
    }

    fn mean_brightness(&self) -> Option<f64> {
        if self.cols() < 1 || self.rows() < 1 {
            return None;
        }

        let mean = if self.channels() == 1 {
            core::mean(self, &core::no_array()).ok()?
        } else {
            let mut gray = Mat::default();
            imgproc::cvt_color(self, &mut gray, imgproc::COLOR_BGR2GRAY, 0).ok()?;
            core::mean(&gray, &core::no_array()).ok()?
        };

        Some(mean.0[0])
    }
}

impl CameraModel {
    pub fn camera_matrix_mat(&self) -> opencv::Result<Mat> {
        let rows: Vec<f64> = self.camera_matrix.transpose().iter().copied().collect();
        Mat::from_slice_rows_cols(&rows, 3, 3)
    }

    pub fn dist_coeffs_mat(&self) -> opencv::Result<Mat> {
        if self.dist_coeffs.is_empty() {
            return Ok(Mat::default());
        }

        Mat::from_slice_rows_cols(&self.dist_coeffs, 1, self.dist_coeffs.len())
    }

    /// From the outputs of `calibrate_camera`
    pub fn from_mats(
        camera_matrix: &Mat,
        dist_coeffs: &Mat,
        image_size: core::Size,
    ) -> opencv::Result<Self> {
        let k: Vec<f64> = camera_matrix
            .to_vec_2d::<f64>()?
            .into_iter()
            .flatten()
            .collect();
        if k.len() != 9 {
            return Err(invalid(format!("camera matrix has {} elements", k.len())));
        }

        let dist_coeffs = dist_coeffs.iter::<f64>()?.map(|a| a.1).collect();

        Ok(Self::new(
            Matrix3::from_row_slice(&k),
            dist_coeffs,
            (image_size.width as u32, image_size.height as u32),
        ))
    }
}

/// `solvePnP` with the square-marker IPPE solver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolvePnpPoseEstimator;

impl PoseEstimator for SolvePnpPoseEstimator {
    fn estimate(
        &self,
        corners: &MarkerCorners,
        half_size: f64,
        camera: &CameraModel,
    ) -> Result<Pose, PoseError> {
        let h = half_size as f32;
        let object_points = core::Vector::<core::Point3f>::from_iter([
            core::Point3f::new(-h, h, 0.),
            core::Point3f::new(h, h, 0.),
            core::Point3f::new(h, -h, 0.),
            core::Point3f::new(-h, -h, 0.),
        ]);
        let image_points = core::Vector::<core::Point2f>::from_iter(
            corners
                .points()
                .iter()
                .map(|p| core::Point2f::new(p.x as f32, p.y as f32)),
        );

        let mut rvec = Mat::default();
        let mut tvec = Mat::default();

        let solved = calib3d::solve_pnp(
            &object_points,
            &image_points,
            &camera.camera_matrix_mat()?,
            &camera.dist_coeffs_mat()?,
            &mut rvec,
            &mut tvec,
            false,
            calib3d::SOLVEPNP_IPPE_SQUARE,
        )?;
        if !solved {
            return Err(PoseError::DegenerateHomography);
        }

        let vector = |m: &Mat| -> opencv::Result<Vector3<f64>> {
            Ok(Vector3::new(*m.at::<f64>(0)?, *m.at::<f64>(1)?, *m.at::<f64>(2)?))
        };

        Ok(Pose {
            rvec: vector(&rvec)?,
            tvec: vector(&tvec)?,
        })
    }
}

/// Inner corner layout of the printed calibration board.
#[derive(Debug, Clone, Copy)]
pub struct Chessboard {
    pub columns: i32,
    pub rows: i32,
}

impl Default for Chessboard {
    fn default() -> Self {
        Self {
            columns: 6,
            rows: 9,
        }
    }
}

impl Chessboard {
    fn pattern_size(&self) -> core::Size {
        core::Size::new(self.columns, self.rows)
    }

    /// Board corners in board units, row by row
    fn object_points(&self) -> core::Vector<core::Point3f> {
        (0..self.rows)
            .flat_map(|y| (0..self.columns).map(move |x| core::Point3f::new(x as f32, y as f32, 0.)))
            .collect()
    }

    /// Sub-pixel refined inner corners, `None` if the board isn't fully visible
    pub fn find(&self, image: &Mat) -> opencv::Result<Option<core::Vector<core::Point2f>>> {
        let mut gray = Mat::default();
        if image.channels() == 1 {
            image.copy_to(&mut gray)?;
        } else {
            imgproc::cvt_color(image, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        }

        let mut corners = core::Vector::<core::Point2f>::new();
        let found = calib3d::find_chessboard_corners(
            &gray,
            self.pattern_size(),
            &mut corners,
            calib3d::CALIB_CB_ADAPTIVE_THRESH
                + calib3d::CALIB_CB_FAST_CHECK
                + calib3d::CALIB_CB_NORMALIZE_IMAGE,
        )?;
        if !found {
            return Ok(None);
        }

        imgproc::corner_sub_pix(
            &gray,
            &mut corners,
            core::Size::new(11, 11),
            core::Size::new(-1, -1),
            core::TermCriteria::new(
                core::TermCriteria_Type::COUNT as i32 + core::TermCriteria_Type::EPS as i32,
                30,
                0.001,
            )?,
        )?;

        Ok(Some(corners))
    }

    pub fn draw(
        &self,
        image: &mut Mat,
        corners: &core::Vector<core::Point2f>,
    ) -> opencv::Result<()> {
        calib3d::draw_chessboard_corners(image, self.pattern_size(), corners, true)
    }
}

/// Result of a chessboard calibration run.
#[derive(Debug, Clone)]
pub struct Calibration {
    pub camera: CameraModel,
    /// RMS reprojection error (px)
    pub reprojection_error: f64,
    /// Images the board was found in
    pub used_images: usize,
}

pub fn calibrate_chessboard(board: &Chessboard, images: &[Mat]) -> opencv::Result<Calibration> {
    let Some(first) = images.first() else {
        return Err(invalid("no calibration images"));
    };
    let image_size = MatTraitConst::size(first)?;

    let mut object_points = types::VectorOfVectorOfPoint3f::new();
    let mut image_points = types::VectorOfVectorOfPoint2f::new();

    for img in images {
        if MatTraitConst::size(img)? != image_size {
            log::warn!("Skipping image of different size");
            continue;
        }

        if let Some(corners) = board.find(img)? {
            object_points.push(board.object_points());
            image_points.push(corners);
        }
    }

    if image_points.is_empty() {
        return Err(invalid("board not found in any image"));
    }

    let mut camera_matrix = Mat::default();
    let mut dist_coeffs = Mat::default();
    let mut rvecs = types::VectorOfMat::new();
    let mut tvecs = types::VectorOfMat::new();

    let reprojection_error = calib3d::calibrate_camera(
        &object_points,
        &image_points,
        image_size,
        &mut camera_matrix,
        &mut dist_coeffs,
        &mut rvecs,
        &mut tvecs,
        0,
        core::TermCriteria::default()?,
    )?;

    Ok(Calibration {
        camera: CameraModel::from_mats(&camera_matrix, &dist_coeffs, image_size)?,
        reprojection_error,
        used_images: image_points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_kinds() {
        assert_eq!(DictionaryKind::try_from(4), Ok(DictionaryKind::Grid4));
        assert_eq!(DictionaryKind::try_from(7), Ok(DictionaryKind::Grid7));
        assert_eq!(DictionaryKind::try_from(3), Err(3));
        assert_eq!(DictionaryKind::try_from(8), Err(8));
    }

    #[test]
    fn camera_matrix_roundtrips_through_mat() {
        let camera = CameraModel::new(
            Matrix3::new(
                600., 0., 321., //
                0., 598., 239., //
                0., 0., 1.,
            ),
            vec![0.1, -0.2, 0., 0., 0.01],
            (640, 480),
        );

        let k = camera.camera_matrix_mat().unwrap();
        assert_eq!(*k.at_2d::<f64>(0, 2).unwrap(), 321.);

        let back = CameraModel::from_mats(
            &k,
            &camera.dist_coeffs_mat().unwrap(),
            core::Size::new(640, 480),
        )
        .unwrap();
        assert_eq!(back, camera);
    }
}
