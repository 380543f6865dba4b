use crate::{
    config::PilotConfig,
    light::LightGuard,
    link::{CommandLink, MotionProfile},
    policy::Directive,
    session::{PoseSource, Session},
};
use anyhow::Result;
use async_trait::async_trait;
use dockloc_common::{Detector, Frame, MarkerId, MarkerObservation};
use std::{collections::BTreeMap, time::Instant};
use tokio::{spawn, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Where frames come from; also owns the camera's light.
#[async_trait]
pub trait FrameSource: Send {
    type Frame: Frame + Send;

    /// `None` once the source is exhausted
    async fn next_frame(&mut self) -> Result<Option<Self::Frame>>;

    async fn set_light(&mut self, on: bool) -> Result<()> {
        let _ = on;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    Cycle {
        observations: BTreeMap<MarkerId, MarkerObservation>,
        /// Id of the marker the directives were based on
        target: Option<MarkerId>,
        tracked: Option<MarkerObservation>,
        directives: Vec<Directive>,
    },
    PayloadTriggered,
    LightSwitchedOn,
    Docked(Option<MarkerObservation>),
    CycleFailed(String),
}

struct Inner<S, D, L> {
    event_tx: watch::Sender<Option<Event>>,
    cancel_token: CancellationToken,
    light: Option<LightGuard>,
    profile: MotionProfile,
    session: Session,
    detector: D,
    source: S,
    link: L,
}

pub struct ControlLoop {
    task_handle: Option<JoinHandle<Result<()>>>,
    event_rx: watch::Receiver<Option<Event>>,
    cancel_token: CancellationToken,
}

pub struct Builder<S, D, L> {
    cancel_token: CancellationToken,
    light: Option<LightGuard>,
    pose: Option<PoseSource>,
    profile: MotionProfile,
    config: PilotConfig,
    detector: D,
    source: S,
    link: L,
}

impl<S, D, L> Builder<S, D, L> {
    pub fn new(source: S, detector: D, link: L) -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            light: Some(LightGuard::default()),
            profile: MotionProfile::default(),
            config: PilotConfig::default(),
            pose: None,
            detector,
            source,
            link,
        }
    }

    pub fn with_config(mut self, v: PilotConfig) -> Self {
        self.config = v;
        self
    }
    pub fn with_pose(mut self, v: PoseSource) -> Self {
        self.pose = Some(v);
        self
    }
    pub fn with_motion_profile(mut self, v: MotionProfile) -> Self {
        self.profile = v;
        self
    }
    pub fn with_light_guard(mut self, v: Option<LightGuard>) -> Self {
        self.light = v;
        self
    }
    pub fn with_cancellation_token(mut self, v: CancellationToken) -> Self {
        self.cancel_token = v;
        self
    }
}

impl<S, D, L> Builder<S, D, L>
where
    S: FrameSource + 'static,
    D: Detector<S::Frame> + Send + 'static,
    L: CommandLink + 'static,
{
    /// Spawns the loop on the current tokio runtime.
    pub fn start(self) -> ControlLoop {
        let (event_tx, event_rx) = watch::channel(None);

        let inner = Inner {
            session: Session::new(self.config, self.pose),
            cancel_token: self.cancel_token.clone(),
            detector: self.detector,
            profile: self.profile,
            source: self.source,
            light: self.light,
            link: self.link,
            event_tx,
        };

        ControlLoop {
            task_handle: Some(spawn(inner.run())),
            cancel_token: self.cancel_token,
            event_rx,
        }
    }
}

impl<S, D, L> Inner<S, D, L>
where
    S: FrameSource,
    D: Detector<S::Frame> + Send,
    L: CommandLink,
{
    fn send_event(&self, e: Event) {
        self.event_tx.send_replace(Some(e));
    }

    async fn run(mut self) -> Result<()> {
        let result = self.cycles().await;

        if let Err(e) = &result {
            log::error!("Control loop failed: {e:#}");
        }

        let hold = self.profile.command(Directive::Hold);
        if let Err(e) = self.link.send(hold).await {
            log::warn!("Couldn't send final hold: {e}");
            return result;
        }

        if result.is_ok() {
            if let Err(e) = self.link.release().await {
                log::warn!("Couldn't release the vehicle: {e}");
            }
        }

        result
    }

    /// Logs and reports a failed cycle, then holds position.
    async fn abort_cycle(&mut self, reason: String) -> Result<()> {
        log::error!("Cycle aborted: {reason}");
        self.send_event(Event::CycleFailed(reason));

        self.link.send(self.profile.command(Directive::Hold)).await
    }

    async fn cycles(&mut self) -> Result<()> {
        loop {
            let frame = tokio::select! {
                f = self.source.next_frame() => f?,
                _ = self.cancel_token.cancelled() => return Ok(()),
            };

            let Some(frame) = frame else {
                log::info!("Frame source exhausted");
                return Ok(());
            };

            if let Some(guard) = self.light.as_mut() {
                if guard.poll(Instant::now(), || frame.mean_brightness()) {
                    log::info!("Scene too dark, switching the light on");

                    match self.source.set_light(true).await {
                        Ok(()) => {
                            guard.confirm_on();
                            self.send_event(Event::LightSwitchedOn);
                        }
                        Err(e) => log::warn!("Couldn't switch the light on: {e}"),
                    }
                }
            }

            let detections = match self.detector.detect(&frame) {
                Ok(d) => d,
                Err(e) => {
                    self.abort_cycle(format!("detection failed: {e}")).await?;
                    continue;
                }
            };

            let cycle = match self.session.step(&detections, frame.size()) {
                Ok(c) => c,
                Err(e) => {
                    self.abort_cycle(e.to_string()).await?;
                    continue;
                }
            };

            if cycle.payload_triggered {
                log::info!("Precision marker in view, actuating payload");
                self.link.actuate_payload().await?;
                self.send_event(Event::PayloadTriggered);
            }

            let target = cycle.selection.authoritative().copied();
            if let Some(t) = &target {
                log::debug!("{t} -> {:?}", cycle.decision.directives);
            } else {
                log::debug!("no target -> {:?}", cycle.decision.directives);
            }

            self.send_event(Event::Cycle {
                observations: cycle.selection.telemetry,
                target: target.map(|t| t.id),
                tracked: self.session.tracked().last().copied(),
                directives: cycle.decision.directives.clone(),
            });

            if cycle.decision.docked {
                log::info!("Docked");
                self.send_event(Event::Docked(target));
                return Ok(());
            }

            for d in cycle.decision.directives {
                self.link.send(self.profile.command(d)).await?;
            }
        }
    }
}

impl ControlLoop {
    /// Waits for the next event; intermediate ones may be skipped.
    pub async fn get_event(&mut self) -> Result<Event> {
        loop {
            self.event_rx.changed().await?;

            if let Some(e) = self.event_rx.borrow_and_update().clone() {
                return Ok(e);
            }
        }
    }

    /// Latest event without waiting
    pub fn last_event(&self) -> Option<Event> {
        self.event_rx.borrow().clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Waits for the loop to end by itself (docked, source exhausted or failed).
    pub async fn join(&mut self) -> Result<()> {
        let Some(h) = self.task_handle.take() else {
            return Err(anyhow::Error::msg("Control loop task already joined"));
        };
        h.await?
    }

    pub async fn stop(mut self) -> Result<()> {
        self.cancel_token.cancel();
        self.join().await
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
