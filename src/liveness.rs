//! Specification monitors and liveness-violation detection.
//!
//! A monitor observes test events and reports whether it currently holds an
//! outstanding obligation (a "hot" state). The scheduler polls hotness after
//! every scheduling step; a monitor that stays hot for more consecutive
//! steps than the configured temperature window has found a potentially
//! infinite fair loop.
//!
//! Invariants:
//! - A cold poll resets that monitor's streak to zero.
//! - A temperature of zero disables the check entirely.

use crate::error::TestError;

/// A user-supplied specification automaton.
///
/// Monitors are created fresh per iteration and receive every event the
/// test body publishes through its context.
pub trait SpecificationMonitor: Send {
    /// Stable name used in violation reports.
    fn name(&self) -> &str;

    /// Observe one test event.
    fn on_event(&mut self, event: &str);

    /// Whether the monitor currently represents an outstanding obligation.
    fn is_hot(&self) -> bool;
}

/// Per-monitor consecutive-hot-step accounting.
#[derive(Debug)]
pub(crate) struct LivenessTracker {
    temperature: u64,
    streaks: Vec<u64>,
}

impl LivenessTracker {
    pub(crate) fn new(temperature: u64) -> Self {
        Self {
            temperature,
            streaks: Vec::new(),
        }
    }

    /// Poll all monitors after a scheduling step.
    ///
    /// Returns the violation for the first monitor whose hot streak exceeds
    /// the temperature window.
    pub(crate) fn observe(
        &mut self,
        monitors: &[Box<dyn SpecificationMonitor>],
    ) -> Option<TestError> {
        if self.temperature == 0 || monitors.is_empty() {
            return None;
        }
        if self.streaks.len() != monitors.len() {
            self.streaks.resize(monitors.len(), 0);
        }
        for (i, monitor) in monitors.iter().enumerate() {
            if monitor.is_hot() {
                self.streaks[i] = self.streaks[i].saturating_add(1);
                if self.streaks[i] > self.temperature {
                    return Some(TestError::LivenessViolation {
                        monitor: monitor.name().to_string(),
                    });
                }
            } else {
                self.streaks[i] = 0;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlagMonitor {
        hot: bool,
    }

    impl SpecificationMonitor for FlagMonitor {
        fn name(&self) -> &str {
            "flag"
        }

        fn on_event(&mut self, event: &str) {
            self.hot = event != "done";
        }

        fn is_hot(&self) -> bool {
            self.hot
        }
    }

    #[test]
    fn continuously_hot_monitor_violates_after_window() {
        let monitors: Vec<Box<dyn SpecificationMonitor>> =
            vec![Box::new(FlagMonitor { hot: true })];
        let mut tracker = LivenessTracker::new(3);
        for _ in 0..3 {
            assert!(tracker.observe(&monitors).is_none());
        }
        match tracker.observe(&monitors) {
            Some(TestError::LivenessViolation { monitor }) => assert_eq!(monitor, "flag"),
            other => panic!("expected liveness violation, got {other:?}"),
        }
    }

    #[test]
    fn cold_visit_resets_the_streak() {
        let mut monitor = FlagMonitor { hot: true };
        let mut tracker = LivenessTracker::new(2);

        let hot: Vec<Box<dyn SpecificationMonitor>> = vec![Box::new(FlagMonitor { hot: true })];
        assert!(tracker.observe(&hot).is_none());
        assert!(tracker.observe(&hot).is_none());

        monitor.on_event("done");
        let cold: Vec<Box<dyn SpecificationMonitor>> = vec![Box::new(monitor)];
        assert!(tracker.observe(&cold).is_none());

        // Streak restarted from zero; the window is available again.
        assert!(tracker.observe(&hot).is_none());
        assert!(tracker.observe(&hot).is_none());
        assert!(tracker.observe(&hot).is_some());
    }

    #[test]
    fn zero_temperature_disables_the_check() {
        let monitors: Vec<Box<dyn SpecificationMonitor>> =
            vec![Box::new(FlagMonitor { hot: true })];
        let mut tracker = LivenessTracker::new(0);
        for _ in 0..128 {
            assert!(tracker.observe(&monitors).is_none());
        }
    }
}
