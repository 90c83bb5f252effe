//! Trace replay: feed a captured schedule back, step by step.
//!
//! Given an identical test body, replaying a trace reproduces the recorded
//! interleaving bit-for-bit. The strategy itself is pure: it returns
//! whatever the trace recorded. The scheduler validates each answer against
//! the live enabled set, so a divergent body is reported instead of being
//! silently rescheduled.

use crate::runtime::operation::OperationId;
use crate::strategy::SchedulingStrategy;
use crate::trace::{Choice, ExecutionTrace};

pub struct ReplayStrategy {
    trace: ExecutionTrace,
    cursor: usize,
    steps: u64,
}

impl ReplayStrategy {
    pub fn new(trace: ExecutionTrace) -> Self {
        Self {
            trace,
            cursor: 0,
            steps: 0,
        }
    }

    fn next_choice(&mut self) -> Option<Choice> {
        let entry = self.trace.entries().get(self.cursor)?;
        self.cursor += 1;
        self.steps += 1;
        Some(entry.choice)
    }
}

impl SchedulingStrategy for ReplayStrategy {
    fn initialize_iteration(&mut self, iteration: u32) -> bool {
        // A trace describes exactly one iteration.
        if iteration > 0 {
            return false;
        }
        self.cursor = 0;
        self.steps = 0;
        true
    }

    fn next_operation(
        &mut self,
        _enabled: &[OperationId],
        _current: OperationId,
        _is_yielding: bool,
    ) -> Option<OperationId> {
        match self.next_choice()? {
            Choice::Operation { id } => Some(id),
            _ => None,
        }
    }

    fn next_boolean(&mut self, _current: OperationId) -> Option<bool> {
        match self.next_choice()? {
            Choice::Boolean { value } => Some(value),
            _ => None,
        }
    }

    fn next_integer(&mut self, _current: OperationId, _max: u32) -> Option<u32> {
        match self.next_choice()? {
            Choice::Integer { value } => Some(value),
            _ => None,
        }
    }

    fn scheduled_steps(&self) -> u64 {
        self.steps
    }

    fn max_steps_reached(&self) -> bool {
        self.cursor >= self.trace.len()
    }

    fn is_fair(&self) -> bool {
        // Replay reproduces whatever fairness the recording run had.
        true
    }

    fn name(&self) -> &'static str {
        "replay"
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_recorded_choices_in_order() {
        let mut trace = ExecutionTrace::new();
        trace.record_operation(0, OperationId::from_u64(1));
        trace.record_boolean(1, true);
        trace.record_integer(2, 7);

        let mut strategy = ReplayStrategy::new(trace);
        assert!(strategy.initialize_iteration(0));

        let enabled = vec![OperationId::from_u64(0), OperationId::from_u64(1)];
        assert_eq!(
            strategy.next_operation(&enabled, OperationId::from_u64(0), false),
            Some(OperationId::from_u64(1))
        );
        assert_eq!(strategy.next_boolean(OperationId::from_u64(1)), Some(true));
        assert_eq!(
            strategy.next_integer(OperationId::from_u64(1), 10),
            Some(7)
        );
        // Trace exhausted.
        assert!(strategy
            .next_operation(&enabled, OperationId::from_u64(1), false)
            .is_none());
    }

    #[test]
    fn replays_a_single_iteration_only() {
        let mut strategy = ReplayStrategy::new(ExecutionTrace::new());
        assert!(strategy.initialize_iteration(0));
        assert!(!strategy.initialize_iteration(1));
    }
}
