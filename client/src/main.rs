mod board;
mod hud;

use crate::{
    board::{CameraBoard, Quality},
    hud::{Hud, Vision},
};
use anyhow::Result;
use dockloc_common::{
    cv::{ArucoDetector, DictionaryKind, SolvePnpPoseEstimator},
    pose::HomographyPoseEstimator,
    CameraModel, MarkerSpec,
};
use dockloc_pilot::{
    link::{CommandLink, LogLink, UdpLink},
    service::{Builder, Event},
    PilotConfig, PoseSource,
};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Flies a vehicle onto a marker pair seen by its camera board
#[derive(clap::Parser)]
struct Args {
    /// Camera board host
    #[arg(long, default_value = "192.168.168.143")]
    host: String,

    /// Snapshot quality
    #[arg(short, long, value_enum, default_value_t = Quality::Mid)]
    quality: Quality,

    /// Marker dictionary grid size (4-7)
    #[arg(short, long, default_value_t = 6)]
    dictionary: u8,

    /// Id of the large approach marker
    #[arg(long, default_value_t = PilotConfig::APPROACH_ID)]
    approach_id: u32,

    /// Side length of the approach marker
    #[arg(long, default_value_t = PilotConfig::APPROACH_SIZE, value_parser = positive)]
    approach_size: f64,

    /// Id of the small precision marker
    #[arg(long, default_value_t = PilotConfig::PRECISION_ID)]
    precision_id: u32,

    /// Side length of the precision marker
    #[arg(long, default_value_t = PilotConfig::PRECISION_SIZE, value_parser = positive)]
    precision_size: f64,

    /// Fly on the approach marker alone
    #[arg(long, default_value_t = false)]
    single: bool,

    /// Marker size unit -> pose unit divisor, approach marker
    #[arg(long, default_value_t = MarkerSpec::DEFAULT_UNIT_DIVISOR, value_parser = positive)]
    approach_unit_divisor: f64,

    /// Marker size unit -> pose unit divisor, precision marker
    #[arg(long, default_value_t = MarkerSpec::DEFAULT_UNIT_DIVISOR, value_parser = positive)]
    precision_unit_divisor: f64,

    /// Yaw threshold (degrees), defaults to 10 (dual) or 5 (single)
    #[arg(long)]
    rotation_threshold: Option<f64>,

    /// Center offset threshold (px)
    #[arg(long, default_value_t = PilotConfig::TRANSLATION_THRESHOLD)]
    translation_threshold: f64,

    /// Perimeter divisor of the distance proxy
    #[arg(long, default_value_t = 20., value_parser = positive)]
    perimeter_divisor: f64,

    /// Stop once aligned at or below this distance proxy
    #[arg(long, value_parser = positive)]
    dock_distance: Option<f64>,

    /// Calibration cache file
    #[arg(long, default_value = ".calib")]
    calibration_cache: String,

    /// Estimate pose without OpenCV's solvePnP
    #[arg(long, default_value_t = false)]
    homography: bool,

    /// Vehicle address, only log commands if not given
    #[arg(long)]
    vehicle: Option<SocketAddr>,

    /// Show what's happening
    #[arg(short, long, default_value_t = false)]
    gui: bool,
}

fn positive(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v > 0. && v.is_finite() => Ok(v),
        Ok(v) => Err(format!("{v} is not a positive number")),
        Err(e) => Err(e.to_string()),
    }
}

impl Args {
    fn pilot_config(&self) -> PilotConfig {
        let approach = MarkerSpec::new(self.approach_id, self.approach_size)
            .with_unit_divisor(self.approach_unit_divisor);

        let config = if self.single {
            PilotConfig::single(approach)
        } else {
            PilotConfig::dual().with_precision(Some(
                MarkerSpec::new(self.precision_id, self.precision_size)
                    .with_unit_divisor(self.precision_unit_divisor),
            ))
        };

        let config = match self.rotation_threshold {
            Some(t) => config.with_rotation_threshold(t),
            None => config,
        };

        PilotConfig {
            approach,
            ..config
        }
        .with_translation_threshold(self.translation_threshold)
        .with_perimeter_divisor(self.perimeter_divisor)
        .with_dock_distance(self.dock_distance)
    }

    fn pose_source(&self) -> Option<PoseSource> {
        let camera = match CameraModel::load(&self.calibration_cache) {
            Ok(c) => c,
            Err(e) => {
                log::warn!(
                    "No calibration in `{}` ({e}), flying without attitude",
                    self.calibration_cache
                );
                return None;
            }
        };
        log::info!("Found calibration file");

        Some(if self.homography {
            PoseSource::new(HomographyPoseEstimator, camera)
        } else {
            PoseSource::new(SolvePnpPoseEstimator, camera)
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = {
        use clap::Parser;
        Args::parse()
    };

    match args.vehicle {
        Some(addr) => {
            let link = UdpLink::connect(addr).await?;
            link.ping().await?;
            log::info!("Flying vehicle at {addr}");
            fly(&args, link).await
        }
        None => {
            log::info!("No vehicle given, only logging commands");
            fly(&args, LogLink).await
        }
    }
}

async fn fly<L: CommandLink + 'static>(args: &Args, link: L) -> Result<()> {
    let kind = DictionaryKind::try_from(args.dictionary)
        .map_err(|d| anyhow::anyhow!("No dictionary for {d}x{d} markers"))?;

    let config = args.pilot_config();
    let cancel_token = CancellationToken::new();

    let vision = Vision {
        detector: ArucoDetector::new(kind)?,
        hud: if args.gui {
            Some(Hud::new(config.translation_threshold, cancel_token.clone())?)
        } else {
            None
        },
    };

    let mut builder = Builder::new(CameraBoard::new(&args.host, args.quality), vision, link)
        .with_config(config)
        .with_cancellation_token(cancel_token);

    if let Some(pose) = args.pose_source() {
        builder = builder.with_pose(pose);
    }

    let mut control = builder.start();

    let cancel_token = control.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_token.cancel();
        }
    });

    while let Ok(e) = control.get_event().await {
        match e {
            Event::Cycle {
                observations,
                target,
                tracked,
                directives,
            } => {
                for o in observations.values() {
                    let mark = if Some(o.id) == target { '*' } else { ' ' };
                    println!("{mark} {o}");
                }
                if let Some(t) = tracked {
                    println!("  last known {t}");
                }
                println!("  -> {directives:?}");
            }
            Event::PayloadTriggered => println!("payload released"),
            Event::LightSwitchedOn => println!("light on"),
            Event::Docked(at) => match at {
                Some(o) => println!("docked at {o}"),
                None => println!("docked"),
            },
            Event::CycleFailed(reason) => println!("cycle failed: {reason}"),
        }
    }

    control.join().await
}
