use dockloc_common::Cooldown;
use std::time::{Duration, Instant};

/// Switches the camera light on once the scene gets too dark.
#[derive(Debug, Clone, Copy)]
pub struct LightGuard {
    cooldown: Cooldown,
    /// Mean gray level below which the light is needed
    pub threshold: f64,
    switched_on: bool,
}

impl Default for LightGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 50.)
    }
}

impl LightGuard {
    pub fn new(period: Duration, threshold: f64) -> Self {
        Self {
            cooldown: Cooldown::new(period),
            threshold,
            switched_on: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.switched_on
    }

    /// Returns whether the light should be switched on now. Keeps asking,
    /// one check per period, until [`confirm_on`](Self::confirm_on).
    ///
    /// `brightness` is only evaluated when a check is due.
    pub fn poll(&mut self, now: Instant, brightness: impl FnOnce() -> Option<f64>) -> bool {
        if self.switched_on || !self.cooldown.try_fire_at(now) {
            return false;
        }

        let Some(b) = brightness() else {
            return false;
        };
        log::debug!("scene brightness {b:.1}");

        b < self.threshold
    }

    /// The light was actually switched on.
    pub fn confirm_on(&mut self) {
        self.switched_on = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_at_most_every_period() {
        let start = Instant::now();
        let mut guard = LightGuard::default();
        let mut checks = 0;

        for ms in (0..12_000).step_by(100) {
            guard.poll(start + Duration::from_millis(ms), || {
                checks += 1;
                Some(120.)
            });
        }

        // at 0, 5 and 10 s
        assert_eq!(checks, 3);
        assert!(!guard.is_on());
    }

    #[test]
    fn switches_on_once_when_dark() {
        let start = Instant::now();
        let mut guard = LightGuard::default();

        assert!(!guard.poll(start, || Some(80.)));
        assert!(!guard.poll(start + Duration::from_secs(1), || Some(10.)));
        assert!(guard.poll(start + Duration::from_secs(5), || Some(10.)));
        guard.confirm_on();
        assert!(guard.is_on());
        assert!(!guard.poll(start + Duration::from_secs(10), || Some(10.)));
    }

    #[test]
    fn asks_again_until_confirmed() {
        let start = Instant::now();
        let mut guard = LightGuard::default();

        assert!(guard.poll(start, || Some(10.)));
        assert!(!guard.is_on());
        assert!(!guard.poll(start + Duration::from_secs(1), || Some(10.)));
        assert!(guard.poll(start + Duration::from_secs(5), || Some(10.)));
    }

    #[test]
    fn unknown_brightness_does_nothing() {
        let mut guard = LightGuard::default();
        assert!(!guard.poll(Instant::now(), || None));
        assert!(!guard.is_on());
    }
}
