//! Bounded depth-first enumeration of interleavings.
//!
//! Every choice point (operation, boolean, integer) becomes a frame on a
//! persisted stack. Within an iteration the stack is replayed from the
//! root; `initialize_iteration` advances the deepest incrementable frame to
//! the next branch, backtracking when a frame is spent. No randomness: the
//! same test body enumerates the same prefixes in the same order.

use crate::runtime::operation::OperationId;
use crate::strategy::SchedulingStrategy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Operation,
    Boolean,
    Integer,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    kind: FrameKind,
    options: u32,
    index: u32,
}

pub struct DfsStrategy {
    max_steps: u64,
    stack: Vec<Frame>,
    /// Position within `stack` for the current iteration.
    cursor: usize,
    steps: u64,
    started: bool,
    exhausted: bool,
}

impl DfsStrategy {
    pub fn new(max_steps: u64) -> Self {
        Self {
            max_steps,
            stack: Vec::new(),
            cursor: 0,
            steps: 0,
            started: false,
            exhausted: false,
        }
    }

    #[inline]
    fn bound_hit(&self) -> bool {
        self.max_steps != 0 && self.steps >= self.max_steps
    }

    /// Fetch the frame for the current choice point, replaying a prior
    /// prefix when one exists. A kind/arity mismatch means the test body is
    /// not deterministic under the recorded prefix; the stale suffix is
    /// discarded and exploration restarts from here.
    fn frame_at(&mut self, kind: FrameKind, options: u32) -> Frame {
        if self.cursor < self.stack.len() {
            let frame = self.stack[self.cursor];
            if frame.kind == kind && frame.options == options {
                return frame;
            }
            self.stack.truncate(self.cursor);
        }
        let frame = Frame {
            kind,
            options,
            index: 0,
        };
        self.stack.push(frame);
        frame
    }
}

impl SchedulingStrategy for DfsStrategy {
    fn initialize_iteration(&mut self, _iteration: u32) -> bool {
        self.steps = 0;
        self.cursor = 0;
        if self.exhausted {
            return false;
        }
        if !self.started {
            self.started = true;
            return true;
        }
        while let Some(last) = self.stack.last_mut() {
            if last.index + 1 < last.options {
                last.index += 1;
                return true;
            }
            self.stack.pop();
        }
        self.exhausted = true;
        false
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        _current: OperationId,
        _is_yielding: bool,
    ) -> Option<OperationId> {
        if self.bound_hit() {
            return None;
        }
        debug_assert!(!enabled.is_empty());
        let frame = self.frame_at(FrameKind::Operation, enabled.len() as u32);
        self.cursor += 1;
        self.steps += 1;
        let idx = frame.index.min(enabled.len() as u32 - 1) as usize;
        Some(enabled[idx])
    }

    fn next_boolean(&mut self, _current: OperationId) -> Option<bool> {
        if self.bound_hit() {
            return None;
        }
        let frame = self.frame_at(FrameKind::Boolean, 2);
        self.cursor += 1;
        self.steps += 1;
        Some(frame.index == 1)
    }

    fn next_integer(&mut self, _current: OperationId, max: u32) -> Option<u32> {
        if self.bound_hit() {
            return None;
        }
        debug_assert!(max > 0);
        let frame = self.frame_at(FrameKind::Integer, max);
        self.cursor += 1;
        self.steps += 1;
        Some(frame.index.min(max - 1))
    }

    fn scheduled_steps(&self) -> u64 {
        self.steps
    }

    fn max_steps_reached(&self) -> bool {
        self.bound_hit()
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "dfs"
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.cursor = 0;
        self.steps = 0;
        self.started = false;
        self.exhausted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<OperationId> {
        raw.iter().copied().map(OperationId::from_u64).collect()
    }

    /// Drive one iteration of a synthetic schedule with two binary choice
    /// points and collect the picks.
    fn run_two_choice_iteration(strategy: &mut DfsStrategy) -> (u64, u64) {
        let enabled = ids(&[0, 1]);
        let a = strategy
            .next_operation(&enabled, OperationId::from_u64(0), false)
            .unwrap();
        let b = strategy
            .next_operation(&enabled, OperationId::from_u64(0), false)
            .unwrap();
        (a.as_u64(), b.as_u64())
    }

    #[test]
    fn enumerates_every_prefix_then_exhausts() {
        let mut strategy = DfsStrategy::new(0);
        let mut seen = Vec::new();
        let mut iteration = 0;
        while strategy.initialize_iteration(iteration) {
            seen.push(run_two_choice_iteration(&mut strategy));
            iteration += 1;
            assert!(iteration <= 8, "enumeration failed to terminate");
        }
        assert_eq!(seen, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        // Exhaustion is sticky.
        assert!(!strategy.initialize_iteration(iteration));
    }

    #[test]
    fn boolean_and_integer_choices_participate() {
        let mut strategy = DfsStrategy::new(0);
        let mut outcomes = Vec::new();
        let mut iteration = 0;
        while strategy.initialize_iteration(iteration) {
            let flag = strategy.next_boolean(OperationId::from_u64(0)).unwrap();
            let value = strategy.next_integer(OperationId::from_u64(0), 3).unwrap();
            outcomes.push((flag, value));
            iteration += 1;
            assert!(iteration <= 12);
        }
        assert_eq!(
            outcomes,
            vec![
                (false, 0),
                (false, 1),
                (false, 2),
                (true, 0),
                (true, 1),
                (true, 2),
            ]
        );
    }

    #[test]
    fn bound_stops_deep_schedules() {
        let mut strategy = DfsStrategy::new(2);
        strategy.initialize_iteration(0);
        let enabled = ids(&[0]);
        assert!(strategy
            .next_operation(&enabled, OperationId::from_u64(0), false)
            .is_some());
        assert!(strategy
            .next_operation(&enabled, OperationId::from_u64(0), false)
            .is_some());
        assert!(strategy
            .next_operation(&enabled, OperationId::from_u64(0), false)
            .is_none());
    }
}
