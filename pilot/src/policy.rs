//! Threshold driven visual servoing.
//!
//! Each cycle yields either a rotation, up to one translation per axis, an
//! ascend, or a hold; rotation always wins over translation.

use crate::{config::PilotConfig, session::TrackedState};
use dockloc_common::MarkerObservation;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Directive {
    RotateLeft,
    RotateRight,
    MoveLeft,
    MoveRight,
    MoveForward,
    MoveBackward,
    Ascend,
    Hold,
}

impl Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RotateLeft => "rotate left",
            Self::RotateRight => "rotate right",
            Self::MoveLeft => "move left",
            Self::MoveRight => "move right",
            Self::MoveForward => "move forward",
            Self::MoveBackward => "move backward",
            Self::Ascend => "ascend",
            Self::Hold => "hold",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    pub directives: Vec<Directive>,
    /// Aligned within the docking distance, nothing left to fly
    pub docked: bool,
}

impl Decision {
    fn fly(directives: Vec<Directive>) -> Self {
        Self {
            directives,
            docked: false,
        }
    }

    fn docked() -> Self {
        Self {
            directives: vec![],
            docked: true,
        }
    }
}

/// Picks this cycle's directives for the selected observation.
///
/// `tracked` is refreshed by every observation with a nonzero distance proxy,
/// whatever gets decided.
pub fn decide(
    observation: Option<&MarkerObservation>,
    tracked: &mut TrackedState,
    config: &PilotConfig,
) -> Decision {
    tracked.update(observation);

    let Some(obs) = observation else {
        return Decision::fly(vec![Directive::Hold]);
    };

    let yaw = obs.yaw.unwrap_or(0.);
    if yaw.abs() > config.rotation_threshold {
        let rotate = if yaw < 0. {
            Directive::RotateLeft
        } else {
            Directive::RotateRight
        };
        return Decision::fly(vec![rotate]);
    }

    let mut directives = Vec::with_capacity(2);

    let t = config.translation_threshold;
    if obs.center.x.abs() > t {
        directives.push(if obs.center.x > 0. {
            Directive::MoveLeft
        } else {
            Directive::MoveRight
        });
    }
    if obs.center.y.abs() > t {
        directives.push(if obs.center.y > 0. {
            Directive::MoveBackward
        } else {
            Directive::MoveForward
        });
    }

    if !directives.is_empty() {
        return Decision::fly(directives);
    }

    match config.dock_distance {
        Some(dock) if obs.distance <= dock => Decision::docked(),
        _ => Decision::fly(vec![Directive::Ascend]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockloc_common::MarkerSpec;
    use nalgebra::Point2;

    fn obs(yaw: Option<f64>, cx: f64, cy: f64) -> MarkerObservation {
        MarkerObservation {
            id: 81,
            center: Point2::new(cx, cy),
            distance: 40.,
            yaw,
        }
    }

    fn run(observation: Option<&MarkerObservation>, config: &PilotConfig) -> Vec<Directive> {
        decide(observation, &mut TrackedState::default(), config).directives
    }

    #[test]
    fn rotation_preempts_translation() {
        let config = PilotConfig::dual();

        assert_eq!(
            run(Some(&obs(Some(12.), 80., -90.)), &config),
            [Directive::RotateRight]
        );
        assert_eq!(
            run(Some(&obs(Some(-12.), 80., -90.)), &config),
            [Directive::RotateLeft]
        );
    }

    #[test]
    fn thresholds_are_strict() {
        let config = PilotConfig::dual();

        assert_eq!(run(Some(&obs(Some(10.), 0., 0.)), &config), [Directive::Ascend]);
        assert_eq!(run(Some(&obs(Some(0.), 20., -20.)), &config), [Directive::Ascend]);
    }

    #[test]
    fn single_marker_rotates_earlier() {
        let config = PilotConfig::single(MarkerSpec::new(81, 100.));
        assert_eq!(
            run(Some(&obs(Some(6.), 0., 0.)), &config),
            [Directive::RotateRight]
        );
    }

    #[test]
    fn translation_axes_fire_independently() {
        let config = PilotConfig::dual();

        assert_eq!(
            run(Some(&obs(Some(0.), 25., 5.)), &config),
            [Directive::MoveLeft]
        );
        assert_eq!(
            run(Some(&obs(Some(0.), -25., 30.)), &config),
            [Directive::MoveRight, Directive::MoveBackward]
        );
        assert_eq!(
            run(Some(&obs(None, 3., -30.)), &config),
            [Directive::MoveForward]
        );
    }

    #[test]
    fn aligned_ascends() {
        let config = PilotConfig::dual();
        assert_eq!(run(Some(&obs(Some(0.), 5., 5.)), &config), [Directive::Ascend]);
        // missing attitude counts as level
        assert_eq!(run(Some(&obs(None, 5., 5.)), &config), [Directive::Ascend]);
    }

    #[test]
    fn nothing_seen_holds_and_keeps_state() {
        let config = PilotConfig::dual();
        let mut tracked = TrackedState::default();

        let seen = obs(Some(0.), 5., 5.);
        decide(Some(&seen), &mut tracked, &config);

        let decision = decide(None, &mut tracked, &config);
        assert_eq!(decision.directives, [Directive::Hold]);
        assert!(!decision.docked);
        assert_eq!(tracked.last(), Some(&seen));
    }

    #[test]
    fn docks_when_aligned_and_close() {
        let config = PilotConfig::dual().with_dock_distance(Some(40.));

        let decision = decide(
            Some(&obs(Some(1.), 2., 2.)),
            &mut TrackedState::default(),
            &config,
        );
        assert_eq!(decision, Decision::docked());

        // still off center
        let decision = decide(
            Some(&obs(Some(1.), 30., 2.)),
            &mut TrackedState::default(),
            &config,
        );
        assert_eq!(decision.directives, [Directive::MoveLeft]);
        assert!(!decision.docked);

        // too far
        let far = MarkerObservation {
            distance: 41.,
            ..obs(Some(1.), 2., 2.)
        };
        let decision = decide(Some(&far), &mut TrackedState::default(), &config);
        assert_eq!(decision.directives, [Directive::Ascend]);
    }
}
