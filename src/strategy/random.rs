//! Uniform random exploration.
//!
//! Draws the next operation uniformly from the enabled set and answers
//! boolean/integer choices with independent draws from the same seeded
//! stream. Fair in the probabilistic sense: every enabled operation has
//! probability at least `1/n` per step.

use crate::rng::TestRng;
use crate::runtime::operation::OperationId;
use crate::strategy::SchedulingStrategy;

pub struct RandomStrategy {
    base_seed: u64,
    rng: TestRng,
    steps: u64,
    max_steps: u64,
}

impl RandomStrategy {
    pub fn new(seed: u64, max_steps: u64) -> Self {
        Self {
            base_seed: seed,
            rng: TestRng::new(seed),
            steps: 0,
            max_steps,
        }
    }

    #[inline]
    fn bound_hit(&self) -> bool {
        self.max_steps != 0 && self.steps >= self.max_steps
    }
}

impl SchedulingStrategy for RandomStrategy {
    fn initialize_iteration(&mut self, iteration: u32) -> bool {
        self.rng = TestRng::for_iteration(self.base_seed, iteration);
        self.steps = 0;
        true
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
        self.steps += 1;
        let idx = if enabled.len() == 1 {
            0
        } else {
            self.rng.gen_range(0, enabled.len() as u32) as usize
        };
        Some(enabled[idx])
    }

    fn next_boolean(&mut self, _current: OperationId) -> Option<bool> {
        if self.bound_hit() {
            return None;
        }
        self.steps += 1;
        Some(self.rng.next_bool())
    }

    fn next_integer(&mut self, _current: OperationId, max: u32) -> Option<u32> {
        if self.bound_hit() {
            return None;
        }
        debug_assert!(max > 0);
        self.steps += 1;
        Some(self.rng.gen_range(0, max))
    }

    fn scheduled_steps(&self) -> u64 {
        self.steps
    }

    fn max_steps_reached(&self) -> bool {
        self.bound_hit()
    }

    fn is_fair(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "random"
    }

    fn reset(&mut self) {
        self.rng = TestRng::new(self.base_seed);
        self.steps = 0;
    }
}
