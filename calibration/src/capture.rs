use opencv::{
    highgui, imgcodecs,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};

const WINDOW: &str = "capture";

/// A camera index or a snapshot / stream URL.
pub struct Camera {
    source: String,
    cap: VideoCapture,
}

impl Camera {
    pub fn open(source: &str) -> opencv::Result<Self> {
        Ok(Self {
            cap: Self::open_capture(source)?,
            source: source.to_owned(),
        })
    }

    fn open_capture(source: &str) -> opencv::Result<VideoCapture> {
        match source.parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
            Err(_) => VideoCapture::from_file(source, videoio::CAP_ANY),
        }
    }

    /// Snapshot URLs run dry after every frame, so they get reopened.
    pub fn read(&mut self, frame: &mut Mat) -> opencv::Result<bool> {
        if self.cap.read(frame)? && frame.cols() > 0 {
            return Ok(true);
        }

        self.cap = Self::open_capture(&self.source)?;
        Ok(self.cap.read(frame)? && frame.cols() > 0)
    }
}

/// `Capture_NNN.jpg`
pub fn capture_name(dir: &Path, number: u32) -> PathBuf {
    dir.join(format!("Capture_{number:0>3}.jpg"))
}

/// Shows the camera, `s` saves the current frame and `q` quits.
pub fn capture(camera: &mut Camera, dir: &Path) -> anyhow::Result<u32> {
    std::fs::create_dir_all(dir)?;

    highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;

    let mut frame = Mat::default();
    let mut saved = 0;

    loop {
        if !camera.read(&mut frame)? {
            log::warn!("No frame from camera");
            if highgui::wait_key(100)? == 113 {
                break;
            }
            continue;
        }

        highgui::imshow(WINDOW, &frame)?;

        match highgui::wait_key(5)? {
            // q
            113 => break,
            // s
            115 => {
                saved += 1;
                let name = capture_name(dir, saved);
                imgcodecs::imwrite(&name.to_string_lossy(), &frame, &opencv::core::Vector::new())?;
                println!("image saved to `{}`", name.display());
            }
            _ => (),
        }
    }

    highgui::destroy_window(WINDOW)?;

    Ok(saved)
}
