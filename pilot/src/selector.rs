use crate::config::PilotConfig;
use dockloc_common::{
    extract::{self, ExtractError, ExtractParams, PoseContext},
    Detection, FrameSize, MarkerId, MarkerObservation, MarkerSpec,
};
use std::collections::BTreeMap;

/// Per-frame measurements, with the one to fly on picked out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub approach: Option<MarkerObservation>,
    pub precision: Option<MarkerObservation>,
    /// Every measured marker, targets included
    pub telemetry: BTreeMap<MarkerId, MarkerObservation>,
}

impl Selection {
    /// Precision if in view, approach otherwise
    pub fn authoritative(&self) -> Option<&MarkerObservation> {
        self.precision.as_ref().or(self.approach.as_ref())
    }

    pub fn precision_visible(&self) -> bool {
        self.precision.is_some()
    }
}

/// Chooses between the approach and the precision marker.
#[derive(Debug, Clone, Copy)]
pub struct DualMarkerSelector {
    approach: MarkerSpec,
    precision: Option<MarkerSpec>,
    params: ExtractParams,
}

impl DualMarkerSelector {
    pub fn new(config: &PilotConfig) -> Self {
        Self {
            approach: config.approach,
            precision: config.precision,
            params: config.extract,
        }
    }

    /// Only the authoritative target gets its attitude estimated. Failing to
    /// measure a target fails the selection, other markers are just skipped.
    pub fn select(
        &self,
        detections: &[Detection],
        frame: FrameSize,
        pose: Option<&PoseContext>,
    ) -> Result<Selection, ExtractError> {
        // first occurrence wins
        let mut unique: Vec<&Detection> = Vec::with_capacity(detections.len());
        for d in detections {
            if !unique.iter().any(|u| u.id == d.id) {
                unique.push(d);
            }
        }

        let find = |spec: &MarkerSpec| unique.iter().copied().find(|d| d.id == spec.id);

        let approach = find(&self.approach);
        let precision = self
            .precision
            .as_ref()
            .and_then(|spec| find(spec).map(|d| (d, spec)));

        let mut selection = Selection::default();

        if let Some((d, spec)) = precision {
            let obs = extract::observe(d, spec, frame, &self.params, pose)?;
            selection.telemetry.insert(obs.id, obs);
            selection.precision = Some(obs);
        }

        if let Some(d) = approach {
            let pose = if precision.is_none() { pose } else { None };
            let obs = extract::observe(d, &self.approach, frame, &self.params, pose)?;
            selection.telemetry.insert(obs.id, obs);
            selection.approach = Some(obs);
        }

        let is_target = |id: MarkerId| {
            id == self.approach.id || self.precision.is_some_and(|p| p.id == id)
        };

        for d in unique.into_iter().filter(|d| !is_target(d.id)) {
            let spec = MarkerSpec {
                id: d.id,
                ..self.approach
            };

            match extract::observe(d, &spec, frame, &self.params, None) {
                Ok(obs) => {
                    selection.telemetry.insert(obs.id, obs);
                }
                Err(e) => log::warn!("Skipping marker #{}: {e}", d.id),
            }
        }

        Ok(selection)
    }
}
