//! Operation model: the scheduler's atom.
//!
//! An operation is a unit of user-observable concurrent work the scheduler
//! can pause and resume. Ids are monotonic ordinals within one iteration,
//! so iterating an id-ordered map walks operations in creation order; every
//! snapshot handed to a strategy relies on that ordering being stable.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Stable operation identifier, ordinal within one iteration.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OperationId(u64);

impl OperationId {
    #[inline(always)]
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Scheduling status of an operation.
///
/// Progression: `NotStarted → Enabled ↔ Running`, with excursions into the
/// blocked states while a wait condition is pending. `Completed` is
/// absorbing: a completed operation is never re-enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    /// Registered but the backing work has not reached the scheduler yet.
    NotStarted,
    /// Eligible to be chosen by the strategy.
    Enabled,
    /// Currently holding the step token.
    Running,
    /// Waiting until every operation in its wait set completes.
    BlockedOnWaitAll,
    /// Waiting until any operation in its wait set completes.
    BlockedOnWaitAny,
    /// Finished; kept in the scheduler map until iteration end.
    Completed,
}

impl OperationStatus {
    /// Whether the operation sits in a blocked state.
    #[inline]
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::BlockedOnWaitAll | Self::BlockedOnWaitAny)
    }
}

/// Why an operation is currently blocked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WaitCondition {
    /// Not waiting.
    #[default]
    None,
    /// Blocked until all of these operations complete.
    All(BTreeSet<OperationId>),
    /// Blocked until any of these operations completes.
    Any(BTreeSet<OperationId>),
}

/// Scheduler-owned record for one operation.
#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) id: OperationId,
    pub(crate) name: String,
    pub(crate) status: OperationStatus,
    pub(crate) waiting_on: WaitCondition,
}

impl Operation {
    pub(crate) fn new(id: OperationId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            status: OperationStatus::NotStarted,
            waiting_on: WaitCondition::None,
        }
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.status == OperationStatus::Enabled
    }

    /// Update the wait condition after `completed` finished; re-enables this
    /// operation once its condition is satisfied.
    pub(crate) fn notify_completed(&mut self, completed: OperationId) {
        match &mut self.waiting_on {
            WaitCondition::None => {}
            WaitCondition::All(pending) => {
                pending.remove(&completed);
                if pending.is_empty() && self.status == OperationStatus::BlockedOnWaitAll {
                    self.waiting_on = WaitCondition::None;
                    self.status = OperationStatus::Enabled;
                }
            }
            WaitCondition::Any(pending) => {
                if pending.contains(&completed) && self.status == OperationStatus::BlockedOnWaitAny
                {
                    self.waiting_on = WaitCondition::None;
                    self.status = OperationStatus::Enabled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: u64) -> Operation {
        Operation::new(OperationId::from_u64(id), "test-op")
    }

    #[test]
    fn wait_all_enables_only_when_set_drains() {
        let mut waiter = op(0);
        waiter.status = OperationStatus::BlockedOnWaitAll;
        waiter.waiting_on = WaitCondition::All(
            [OperationId::from_u64(1), OperationId::from_u64(2)]
                .into_iter()
                .collect(),
        );

        waiter.notify_completed(OperationId::from_u64(1));
        assert_eq!(waiter.status, OperationStatus::BlockedOnWaitAll);

        waiter.notify_completed(OperationId::from_u64(2));
        assert_eq!(waiter.status, OperationStatus::Enabled);
        assert_eq!(waiter.waiting_on, WaitCondition::None);
    }

    #[test]
    fn wait_any_enables_on_first_member() {
        let mut waiter = op(0);
        waiter.status = OperationStatus::BlockedOnWaitAny;
        waiter.waiting_on = WaitCondition::Any(
            [OperationId::from_u64(1), OperationId::from_u64(2)]
                .into_iter()
                .collect(),
        );

        waiter.notify_completed(OperationId::from_u64(3));
        assert_eq!(waiter.status, OperationStatus::BlockedOnWaitAny);

        waiter.notify_completed(OperationId::from_u64(2));
        assert_eq!(waiter.status, OperationStatus::Enabled);
    }

    #[test]
    fn unrelated_completions_do_not_enable() {
        let mut waiter = op(0);
        waiter.status = OperationStatus::BlockedOnWaitAll;
        waiter.waiting_on =
            WaitCondition::All([OperationId::from_u64(5)].into_iter().collect());

        waiter.notify_completed(OperationId::from_u64(4));
        assert_eq!(waiter.status, OperationStatus::BlockedOnWaitAll);
    }
}
