pub use dockloc_common::{
    link::MotionCommand, CameraModel, Detection, MarkerId, MarkerObservation, MarkerSpec,
};

pub mod config;
pub mod light;
pub mod link;
pub mod policy;
pub mod selector;
pub mod service;
pub mod session;

pub use config::PilotConfig;
pub use policy::{Decision, Directive};
pub use session::{Cycle, PoseSource, Session};
