use dockloc_common::{extract::ExtractParams, MarkerSpec};

/// Everything the per-frame pipeline needs to turn detections into directives.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PilotConfig {
    /// Large, long range marker
    pub approach: MarkerSpec,
    /// Small, short range marker; `None` flies on `approach` alone
    pub precision: Option<MarkerSpec>,
    /// Degrees
    pub rotation_threshold: f64,
    /// Frame-centered pixels, per axis
    pub translation_threshold: f64,
    /// Stop once aligned at or below this distance proxy
    pub dock_distance: Option<f64>,
    pub extract: ExtractParams,
}

impl PilotConfig {
    pub const APPROACH_ID: u32 = 81;
    pub const APPROACH_SIZE: f64 = 100.;
    pub const PRECISION_ID: u32 = 88;
    pub const PRECISION_SIZE: f64 = 12.5;
    pub const TRANSLATION_THRESHOLD: f64 = 20.;

    /// Approach marker with a precision marker inside it
    pub fn dual() -> Self {
        Self {
            approach: MarkerSpec::new(Self::APPROACH_ID, Self::APPROACH_SIZE),
            precision: Some(MarkerSpec::new(Self::PRECISION_ID, Self::PRECISION_SIZE)),
            rotation_threshold: 10.,
            translation_threshold: Self::TRANSLATION_THRESHOLD,
            dock_distance: None,
            extract: ExtractParams::default(),
        }
    }

    pub fn single(approach: MarkerSpec) -> Self {
        Self {
            approach,
            precision: None,
            rotation_threshold: 5.,
            translation_threshold: Self::TRANSLATION_THRESHOLD,
            dock_distance: None,
            extract: ExtractParams::default(),
        }
    }

    pub fn with_precision(mut self, v: Option<MarkerSpec>) -> Self {
        self.precision = v;
        self
    }
    pub fn with_rotation_threshold(mut self, v: f64) -> Self {
        self.rotation_threshold = v;
        self
    }
    pub fn with_translation_threshold(mut self, v: f64) -> Self {
        self.translation_threshold = v;
        self
    }
    pub fn with_dock_distance(mut self, v: Option<f64>) -> Self {
        self.dock_distance = v;
        self
    }
    pub fn with_perimeter_divisor(mut self, v: f64) -> Self {
        self.extract.perimeter_divisor = v;
        self
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self::dual()
    }
}
