use std::time::{Duration, Instant};

#[cfg(feature = "cv")]
pub mod cv;

pub mod camera;
pub mod extract;
pub mod frame;
pub mod geometry;
pub mod link;
pub mod marker;
pub mod pose;

pub use camera::CameraModel;
pub use frame::{Frame, FrameSize};
pub use marker::{Detection, Detector, MarkerCorners, MarkerId, MarkerObservation, MarkerSpec};

/// Gate for side effects that may only run once per `period`.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    last_fired: Option<Instant>,
    pub period: Duration,
}

impl Cooldown {
    /// Ready immediately
    pub const fn new(period: Duration) -> Self {
        Self {
            last_fired: None,
            period,
        }
    }

    pub fn is_ready_at(&self, now: Instant) -> bool {
        match self.last_fired {
            Some(t) => now.saturating_duration_since(t) >= self.period,
            None => true,
        }
    }

    /// Returns whether the gate was open, and if so closes it for another `period`.
    pub fn try_fire_at(&mut self, now: Instant) -> bool {
        if !self.is_ready_at(now) {
            return false;
        }

        self.last_fired = Some(now);
        true
    }

    pub const fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }
}
