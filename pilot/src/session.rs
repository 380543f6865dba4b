use crate::{
    config::PilotConfig,
    policy::{self, Decision},
    selector::{DualMarkerSelector, Selection},
};
use dockloc_common::{
    extract::{ExtractError, PoseContext},
    pose::PoseEstimator,
    CameraModel, Detection, FrameSize, MarkerObservation,
};

/// Last observation with a usable distance proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackedState {
    last: Option<MarkerObservation>,
}

impl TrackedState {
    pub fn last(&self) -> Option<&MarkerObservation> {
        self.last.as_ref()
    }

    /// 0 while nothing has been tracked yet
    pub fn distance(&self) -> f64 {
        self.last.map_or(0., |o| o.distance)
    }

    pub fn is_known(&self) -> bool {
        self.last.is_some()
    }

    /// Returns whether the state was overwritten
    pub fn update(&mut self, observation: Option<&MarkerObservation>) -> bool {
        match observation {
            Some(o) if o.distance != 0. => {
                self.last = Some(*o);
                true
            }
            _ => false,
        }
    }
}

/// Fires once, the first time the precision marker shows up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApproachLatch {
    fired: bool,
}

impl ApproachLatch {
    pub fn is_set(&self) -> bool {
        self.fired
    }

    pub fn try_fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }
}

/// Pose primitive plus the camera it works with.
pub struct PoseSource {
    pub estimator: Box<dyn PoseEstimator>,
    pub camera: CameraModel,
}

impl PoseSource {
    pub fn new(estimator: impl PoseEstimator + 'static, camera: CameraModel) -> Self {
        Self {
            estimator: Box::new(estimator),
            camera,
        }
    }

    fn context(&self) -> PoseContext<'_> {
        PoseContext {
            estimator: self.estimator.as_ref(),
            camera: &self.camera,
        }
    }
}

/// Outcome of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub selection: Selection,
    pub decision: Decision,
    /// The precision marker was seen for the first time
    pub payload_triggered: bool,
}

/// Per-vehicle pipeline state, owned by the control loop.
pub struct Session {
    config: PilotConfig,
    selector: DualMarkerSelector,
    pose: Option<PoseSource>,
    tracked: TrackedState,
    latch: ApproachLatch,
}

impl Session {
    /// Without a `pose` source no yaw is ever measured.
    pub fn new(config: PilotConfig, pose: Option<PoseSource>) -> Self {
        Self {
            selector: DualMarkerSelector::new(&config),
            config,
            pose,
            tracked: TrackedState::default(),
            latch: ApproachLatch::default(),
        }
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }
    pub fn tracked(&self) -> &TrackedState {
        &self.tracked
    }
    pub fn latch(&self) -> &ApproachLatch {
        &self.latch
    }

    pub fn step(&mut self, detections: &[Detection], frame: FrameSize) -> Result<Cycle, ExtractError> {
        let ctx = self.pose.as_ref().map(PoseSource::context);
        let selection = self.selector.select(detections, frame, ctx.as_ref())?;

        let payload_triggered = selection.precision_visible() && self.latch.try_fire();

        let decision = policy::decide(selection.authoritative(), &mut self.tracked, &self.config);

        Ok(Cycle {
            selection,
            decision,
            payload_triggered,
        })
    }
}
