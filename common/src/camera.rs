use nalgebra::{Matrix3, Point2, Vector2};
use std::{
    io::{Error, ErrorKind, Read},
    mem::size_of,
    path::Path,
};

/// Intrinsics of a calibrated camera.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraModel {
    /// f64 | 3x3
    pub camera_matrix: Matrix3<f64>,
    /// OpenCV order: k1, k2, p1, p2[, k3, ...]
    pub dist_coeffs: Vec<f64>,
    /// Resolution the camera was calibrated at
    pub image_size: (u32, u32),
}

impl CameraModel {
    const MAX_COEFFS: usize = 14;
    const UNDISTORT_ITERATIONS: usize = 8;

    pub fn new(camera_matrix: Matrix3<f64>, dist_coeffs: Vec<f64>, image_size: (u32, u32)) -> Self {
        Self {
            camera_matrix,
            dist_coeffs,
            image_size,
        }
    }

    /// Distortion free pinhole camera
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64, image_size: (u32, u32)) -> Self {
        Self::new(
            Matrix3::new(
                fx, 0., cx, //
                0., fy, cy, //
                0., 0., 1.,
            ),
            vec![],
            image_size,
        )
    }

    pub fn fx(&self) -> f64 {
        self.camera_matrix[(0, 0)]
    }
    pub fn fy(&self) -> f64 {
        self.camera_matrix[(1, 1)]
    }
    pub fn cx(&self) -> f64 {
        self.camera_matrix[(0, 2)]
    }
    pub fn cy(&self) -> f64 {
        self.camera_matrix[(1, 2)]
    }

    /// Horizontal FOV (**in radians**)
    pub fn horizontal_fov(&self) -> f64 {
        2. * (self.image_size.0 as f64 / (2. * self.fx())).atan()
    }

    fn coeff(&self, i: usize) -> f64 {
        self.dist_coeffs.get(i).copied().unwrap_or(0.)
    }

    fn distort(&self, p: Vector2<f64>) -> Vector2<f64> {
        let (k1, k2, p1, p2, k3) = (
            self.coeff(0),
            self.coeff(1),
            self.coeff(2),
            self.coeff(3),
            self.coeff(4),
        );

        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1. + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;

        Vector2::new(
            x * radial + 2. * p1 * x * y + p2 * (r2 + 2. * x * x),
            y * radial + p1 * (r2 + 2. * y * y) + 2. * p2 * x * y,
        )
    }

    /// Pixel -> undistorted normalized image coordinates.
    ///
    /// Only the five-coefficient Brown-Conrady part of `dist_coeffs` is applied.
    pub fn normalize(&self, pixel: &Point2<f64>) -> Point2<f64> {
        let distorted = Vector2::new(
            (pixel.x - self.cx()) / self.fx(),
            (pixel.y - self.cy()) / self.fy(),
        );

        if self.dist_coeffs.iter().all(|c| *c == 0.) {
            return distorted.into();
        }

        let mut p = distorted;
        for _ in 0..Self::UNDISTORT_ITERATIONS {
            p -= self.distort(p) - distorted;
        }

        p.into()
    }

    /// Fails with `InvalidInput` for more than 14 distortion coefficients.
    pub fn to_be_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.dist_coeffs.len() > Self::MAX_COEFFS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "{} distortion coefficients, at most {} fit",
                    self.dist_coeffs.len(),
                    Self::MAX_COEFFS
                ),
            ));
        }
        let dist_coefficients_len = [self.dist_coeffs.len() as u8].into_iter();

        // row major, like the opencv Mat it usually comes from
        let camera_matrix = self
            .camera_matrix
            .transpose()
            .iter()
            .copied()
            .flat_map(f64::to_be_bytes)
            .collect::<Vec<_>>();

        let dist_coefficients = self.dist_coeffs.iter().copied().flat_map(f64::to_be_bytes);

        let (w, h) = self.image_size;

        Ok(dist_coefficients_len
            .chain(camera_matrix)
            .chain(dist_coefficients)
            .chain(w.to_be_bytes())
            .chain(h.to_be_bytes())
            .collect())
    }

    pub fn from_be_bytes(r: &mut impl Read) -> Result<Self, Error> {
        let mut buf = [0; Self::MAX_COEFFS * size_of::<f64>()];

        r.read_exact(&mut buf[..1])?;
        let coeff_count = buf[0] as usize;
        if coeff_count > Self::MAX_COEFFS {
            return Err(Error::from(ErrorKind::InvalidData));
        }

        let mut get_f64s = |n: usize| -> Result<Vec<f64>, Error> {
            let len = n * size_of::<f64>();
            r.read_exact(&mut buf[..len])?;

            buf[..len]
                .chunks(size_of::<f64>())
                .map(|w| w.try_into().map(f64::from_be_bytes))
                .collect::<Result<_, _>>()
                .map_err(|_| Error::from(ErrorKind::InvalidData))
        };

        let camera_matrix = Matrix3::from_row_slice(&get_f64s(9)?);
        let dist_coeffs = get_f64s(coeff_count)?;

        let mut size = [0; 8];
        r.read_exact(&mut size)?;
        let w = u32::from_be_bytes([size[0], size[1], size[2], size[3]]);
        let h = u32::from_be_bytes([size[4], size[5], size[6], size[7]]);

        Ok(Self {
            camera_matrix,
            dist_coeffs,
            image_size: (w, h),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path, self.to_be_bytes()?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut f = std::fs::File::open(path)?;
        Self::from_be_bytes(&mut f)
    }
}
