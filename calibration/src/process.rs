use dockloc_common::cv::{calibrate_chessboard, Calibration, Chessboard};
use opencv::{highgui, imgcodecs, prelude::*};
use std::path::{Path, PathBuf};

/// Every `.jpg` in `dir`, sorted by name
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("jpg"))
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Loads the images, optionally shows the found board in each, then calibrates.
pub fn process(board: &Chessboard, files: &[PathBuf], show: bool) -> anyhow::Result<Calibration> {
    let mut images = Vec::with_capacity(files.len());

    for f in files {
        let img = imgcodecs::imread(&f.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
        if img.cols() < 1 {
            log::warn!("Couldn't read `{}`", f.display());
            continue;
        }

        if show {
            let mut draw = img.clone();
            match board.find(&img)? {
                Some(corners) => board.draw(&mut draw, &corners)?,
                None => println!("no board in `{}`", f.display()),
            }

            highgui::imshow("board", &draw)?;
            highgui::wait_key(0)?;
        }

        images.push(img);
    }

    if show {
        highgui::destroy_all_windows()?;
    }

    Ok(calibrate_chessboard(board, &images)?)
}
