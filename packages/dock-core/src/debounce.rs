//! Restartable single-shot deadline.
//!
//! Every `trigger` pushes the deadline to `now + interval`; the owner polls
//! `fire(now)` from its timer hook and runs its action once per expiry.
//! A burst of triggers therefore collapses into one action.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debounce {
    interval: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// (Re)start the timer.
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    /// Start the timer only if it is not already running.
    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.trigger(now);
        }
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true exactly once per expiry, disarming the timer.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Earliest of a set of optional deadlines.
pub fn earliest<I>(deadlines: I) -> Option<Instant>
where
    I: IntoIterator<Item = Option<Instant>>,
{
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_into_one_fire() {
        let t0 = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(200));

        d.trigger(t0);
        d.trigger(t0 + Duration::from_millis(50));
        d.trigger(t0 + Duration::from_millis(100));

        assert!(!d.fire(t0 + Duration::from_millis(250)));
        assert!(d.fire(t0 + Duration::from_millis(300)));
        assert!(!d.fire(t0 + Duration::from_millis(400)));
        assert!(!d.is_active());
    }

    #[test]
    fn test_arm_does_not_restart() {
        let t0 = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(100));

        d.arm(t0);
        d.arm(t0 + Duration::from_millis(90));
        assert_eq!(d.deadline(), Some(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_stop_cancels() {
        let t0 = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(10));
        d.trigger(t0);
        d.stop();
        assert!(!d.fire(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_earliest() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(1);
        assert_eq!(earliest([None, Some(later), Some(t0)]), Some(t0));
        assert_eq!(earliest([None, None]), None);
    }
}
