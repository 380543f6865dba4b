use dockloc_common::{
    cv::ArucoDetector,
    marker::{Detection, Detector},
};
use opencv::{core, highgui, imgproc, prelude::*};
use tokio_util::sync::CancellationToken;

const WINDOW: &str = "dockloc";

/// Shows every detected frame; `q` cancels the control loop.
pub struct Hud {
    draw: Mat,
    translation_threshold: i32,
    cancel_token: CancellationToken,
}

impl Hud {
    pub fn new(translation_threshold: f64, cancel_token: CancellationToken) -> opencv::Result<Self> {
        highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;

        Ok(Self {
            draw: Mat::default(),
            translation_threshold: translation_threshold.round() as i32,
            cancel_token,
        })
    }

    fn show(&mut self, frame: &Mat, detector: &ArucoDetector) -> opencv::Result<()> {
        frame.copy_to(&mut self.draw)?;
        detector.draw_last(&mut self.draw)?;

        // dead zone around the frame center
        let (cx, cy) = (self.draw.cols() / 2, self.draw.rows() / 2);
        let t = self.translation_threshold;
        imgproc::rectangle(
            &mut self.draw,
            core::Rect::new(cx - t, cy - t, 2 * t, 2 * t),
            core::Scalar::new(0.0, 255.0, 255.0, 0.0),
            1,
            imgproc::LINE_8,
            0,
        )?;

        highgui::imshow(WINDOW, &self.draw)?;

        // q
        if highgui::wait_key(1)? == 113 {
            self.cancel_token.cancel();
        }

        Ok(())
    }
}

impl Drop for Hud {
    fn drop(&mut self) {
        let _ = highgui::destroy_all_windows();
    }
}

/// Marker detection with an optional on-screen view.
pub struct Vision {
    pub detector: ArucoDetector,
    pub hud: Option<Hud>,
}

impl Detector<Mat> for Vision {
    type Error = opencv::Error;

    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, Self::Error> {
        let detections = self.detector.detect(frame)?;

        if let Some(hud) = self.hud.as_mut() {
            hud.show(frame, &self.detector)?;
        }

        Ok(detections)
    }
}
