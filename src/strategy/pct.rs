//! Probabilistic concurrency testing (priority-based exploration).
//!
//! Operations get distinct priorities as they first appear; between change
//! points the highest-priority enabled operation always runs. A bounded
//! number of priority change points, placed at random step positions per
//! iteration, demote the currently favored operation; the change-point
//! count controls the depth of ordering bugs the policy can reach. A
//! yielding operation is demoted immediately.

use std::collections::BTreeSet;

use crate::rng::TestRng;
use crate::runtime::operation::OperationId;
use crate::strategy::SchedulingStrategy;

pub struct PctStrategy {
    base_seed: u64,
    change_point_count: u32,
    max_steps: u64,
    rng: TestRng,
    steps: u64,
    /// Priority order: index 0 is the highest priority.
    priorities: Vec<OperationId>,
    change_points: BTreeSet<u64>,
}

impl PctStrategy {
    pub fn new(seed: u64, max_steps: u64, change_points: u32) -> Self {
        Self {
            base_seed: seed,
            change_point_count: change_points,
            max_steps,
            rng: TestRng::new(seed),
            steps: 0,
            priorities: Vec::new(),
            change_points: BTreeSet::new(),
        }
    }

    #[inline]
    fn bound_hit(&self) -> bool {
        self.max_steps != 0 && self.steps >= self.max_steps
    }

    /// Insert operations seen for the first time at a random priority.
    fn admit(&mut self, enabled: &[OperationId]) {
        for &id in enabled {
            if !self.priorities.contains(&id) {
                let pos = if self.priorities.is_empty() {
                    0
                } else {
                    self.rng.gen_range(0, self.priorities.len() as u32 + 1) as usize
                };
                self.priorities.insert(pos, id);
            }
        }
    }

    /// Demote the highest-priority enabled operation to the bottom.
    fn demote_favorite(&mut self, enabled: &[OperationId]) {
        if let Some(pos) = self.priorities.iter().position(|id| enabled.contains(id)) {
            let id = self.priorities.remove(pos);
            self.priorities.push(id);
        }
    }

    fn demote(&mut self, target: OperationId) {
        if let Some(pos) = self.priorities.iter().position(|&id| id == target) {
            let id = self.priorities.remove(pos);
            self.priorities.push(id);
        }
    }
}

impl SchedulingStrategy for PctStrategy {
    fn initialize_iteration(&mut self, iteration: u32) -> bool {
        self.rng = TestRng::for_iteration(self.base_seed, iteration);
        self.steps = 0;
        self.priorities.clear();
        self.change_points.clear();
        if self.max_steps > 0 {
            for _ in 0..self.change_point_count {
                self.change_points.insert(self.rng.next_u64() % self.max_steps);
            }
        }
        true
    }

    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
        is_yielding: bool,
    ) -> Option<OperationId> {
        if self.bound_hit() {
            return None;
        }
        debug_assert!(!enabled.is_empty());
        self.admit(enabled);
        if is_yielding {
            self.demote(current);
        }
        if self.change_points.contains(&self.steps) {
            self.demote_favorite(enabled);
        }
        let chosen = self
            .priorities
            .iter()
            .copied()
            .find(|id| enabled.contains(id))
            .expect("every enabled operation has a priority");
        self.steps += 1;
        Some(chosen)
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
        false
    }

    fn name(&self) -> &'static str {
        "pct"
    }

    fn reset(&mut self) {
        self.rng = TestRng::new(self.base_seed);
        self.steps = 0;
        self.priorities.clear();
        self.change_points.clear();
    }
}
