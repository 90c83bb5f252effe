//! Fairness wrapper over an unfair base strategy.
//!
//! Tracks, per operation, how many consecutive steps it was enabled but not
//! chosen. Once a counter crosses the threshold the starved operation is
//! forced next, overriding the base policy (the base is still consulted so
//! its decision stream stays aligned for replay). A continuously enabled
//! operation is therefore scheduled within twice the threshold.

use std::collections::BTreeMap;

use crate::runtime::operation::OperationId;
use crate::strategy::SchedulingStrategy;

pub struct FairStrategy {
    inner: Box<dyn SchedulingStrategy>,
    threshold: u64,
    skipped: BTreeMap<OperationId, u64>,
}

impl FairStrategy {
    pub fn wrap(inner: Box<dyn SchedulingStrategy>, threshold: u64) -> Self {
        assert!(threshold > 0, "fairness threshold must be positive");
        Self {
            inner,
            threshold,
            skipped: BTreeMap::new(),
        }
    }
}

impl SchedulingStrategy for FairStrategy {
    fn initialize_iteration(&mut self, iteration: u32) -> bool {
        self.skipped.clear();
        self.inner.initialize_iteration(iteration)
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
        is_yielding: bool,
    ) -> Option<OperationId> {
        // Disabled operations are not starved; drop their counters so a
        // long wait does not count against the threshold.
        self.skipped.retain(|id, _| enabled.contains(id));

        let base_pick = self.inner.next_operation(enabled, current, is_yielding)?;
        let forced = self
            .skipped
            .iter()
            .filter(|(_, &count)| count >= self.threshold)
            .map(|(&id, _)| id)
            .next();
        let chosen = forced.unwrap_or(base_pick);

        for &id in enabled {
            if id != chosen {
                *self.skipped.entry(id).or_insert(0) += 1;
            }
        }
        self.skipped.insert(chosen, 0);
        Some(chosen)
    }

    fn next_boolean(&mut self, current: OperationId) -> Option<bool> {
        self.inner.next_boolean(current)
    }

    fn next_integer(&mut self, current: OperationId, max: u32) -> Option<u32> {
        self.inner.next_integer(current, max)
    }

    fn scheduled_steps(&self) -> u64 {
        self.inner.scheduled_steps()
    }

    fn max_steps_reached(&self) -> bool {
        self.inner.max_steps_reached()
    }

    fn is_fair(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "fair"
    }

    fn reset(&mut self) {
        self.skipped.clear();
        self.inner.reset();
    }
}
