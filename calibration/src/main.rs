mod capture;
mod process;

use crate::capture::Camera;
use clap::{Parser, Subcommand};
use dockloc_common::cv::Chessboard;
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    /// Inner corners per chessboard row
    #[arg(long, default_value_t = 6)]
    columns: i32,

    /// Inner corners per chessboard column
    #[arg(long, default_value_t = 9)]
    rows: i32,

    /// Directory of the calibration images
    #[arg(short, long, default_value = "Images")]
    images: PathBuf,

    /// The action to take
    #[command(subcommand)]
    command: CLICommand,
}

#[derive(Subcommand)]
enum CLICommand {
    /// Take pictures of the chessboard (`s` saves, `q` quits)
    Capture {
        /// Camera index or snapshot URL
        #[arg(short, long, default_value = "http://192.168.168.143/cam-mid.jpg")]
        source: String,
    },

    /// Calibrate from the captured pictures
    Process {
        /// File to save to
        #[arg(short, long, default_value = ".calib")]
        savefile: PathBuf,

        /// Show the board found in each image
        #[arg(long, default_value_t = false)]
        show: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let board = Chessboard {
        columns: args.columns,
        rows: args.rows,
    };

    match args.command {
        CLICommand::Capture { source } => {
            let mut camera = Camera::open(&source)?;
            let saved = capture::capture(&mut camera, &args.images)?;
            println!("{saved} images saved to `{}`", args.images.display());
        }

        CLICommand::Process { savefile, show } => {
            let files = process::list_images(&args.images)?;
            if files.is_empty() {
                println!("No images in `{}`", args.images.display());
                return Ok(());
            }

            let calibration = process::process(&board, &files, show)?;
            let camera = &calibration.camera;

            println!(
                "calibration finished on {}/{} images\nestimated calibration error: {:.3}",
                calibration.used_images,
                files.len(),
                calibration.reprojection_error
            );
            println!("camera matrix:{}", camera.camera_matrix);
            println!("dist: {:?}", camera.dist_coeffs);
            println!(
                "horizontal fov: {:.1}°",
                camera.horizontal_fov().to_degrees()
            );

            camera.save(&savefile)?;
            println!("calibration saved to `{}`", savefile.display());
        }
    };

    Ok(())
}
