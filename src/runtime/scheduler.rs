//! Operation scheduler: the serialization kernel.
//!
//! All operation threads are serialized through one mutex + condvar pair:
//! a thread executes user code only while it is the `running` operation and
//! suspends on the condvar otherwise. Handing the step token to another
//! operation means flipping `running` and broadcasting.
//!
//! Invariants:
//! - At most one operation is `Running` at any instant.
//! - Every registered operation stays in the map until iteration end.
//! - The step counter increments on every strategy consultation (operation,
//!   boolean, integer) and each consultation is recorded in the trace.
//! - Termination broadcasts the condvar; every suspended operation unwinds
//!   with the internal cancellation signal.
//!
//! Scheduler state is only mutated under the mutex, and user code only runs
//! while its operation holds the step token, so no further locking is
//! needed anywhere in the engine.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{IterationStatus, TestError};
use crate::liveness::{LivenessTracker, SpecificationMonitor};
use crate::runtime::logger::SchedulerLogger;
use crate::runtime::operation::{Operation, OperationId, OperationStatus, WaitCondition};
use crate::strategy::SharedStrategy;
use crate::trace::ExecutionTrace;

/// Internal unwind payload used to tear down suspended operations when the
/// iteration terminates. Swallowed at each operation's outermost frame and
/// never surfaced to the user driver.
#[derive(Debug)]
pub(crate) struct ExecutionCancelled;

/// Unwind the current operation with the cancellation signal.
pub(crate) fn cancel_unwind() -> ! {
    panic::panic_any(ExecutionCancelled)
}

/// Best-effort text for an arbitrary panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct SchedulerState {
    ops: BTreeMap<OperationId, Operation>,
    next_id: u64,
    running: Option<OperationId>,
    steps: u64,
    hard_step_cap: u64,
    attached: bool,
    termination: Option<IterationStatus>,
    strategy: SharedStrategy,
    trace: ExecutionTrace,
    monitors: Vec<Box<dyn SpecificationMonitor>>,
    liveness: LivenessTracker,
}

impl SchedulerState {
    /// Enabled operations in creation (ascending id) order.
    fn enabled(&self) -> Vec<OperationId> {
        self.ops
            .values()
            .filter(|op| op.is_enabled())
            .map(|op| op.id)
            .collect()
    }

    fn all_completed(&self) -> bool {
        self.ops
            .values()
            .all(|op| op.status == OperationStatus::Completed)
    }

    fn blocked_ids(&self) -> Vec<OperationId> {
        self.ops
            .values()
            .filter(|op| op.status.is_blocked())
            .map(|op| op.id)
            .collect()
    }

    fn is_completed(&self, id: OperationId) -> bool {
        self.ops
            .get(&id)
            .map(|op| op.status == OperationStatus::Completed)
            .unwrap_or(false)
    }

    fn poll_liveness(&mut self) -> Option<TestError> {
        self.liveness.observe(&self.monitors)
    }
}

/// The kernel: owns the operation map, the step mutex, and the termination
/// state of one iteration.
pub(crate) struct OperationScheduler {
    state: Mutex<SchedulerState>,
    cv: Condvar,
    logger: SchedulerLogger,
}

impl OperationScheduler {
    pub(crate) fn new(
        strategy: SharedStrategy,
        hard_step_cap: u64,
        liveness_temperature: u64,
        logger: SchedulerLogger,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                ops: BTreeMap::new(),
                next_id: 0,
                running: None,
                steps: 0,
                hard_step_cap,
                attached: true,
                termination: None,
                strategy,
                trace: ExecutionTrace::new(),
                monitors: Vec::new(),
                liveness: LivenessTracker::new(liveness_temperature),
            }),
            cv: Condvar::new(),
            logger,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().expect("scheduler mutex poisoned")
    }

    /// Lock with poison recovery for teardown paths that must not panic.
    fn lock_or_recover(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Register a fresh operation and return its id.
    ///
    /// Ids are strictly increasing within an iteration.
    pub(crate) fn register_operation(&self, name: &str) -> OperationId {
        let mut st = self.lock();
        if st.termination.is_some() || !st.attached {
            drop(st);
            cancel_unwind();
        }
        let id = OperationId::from_u64(st.next_id);
        st.next_id += 1;
        let previous = st.ops.insert(id, Operation::new(id, name));
        assert!(previous.is_none(), "operation id collision");
        self.logger
            .debug(format_args!("registered op {} ({name})", id.as_u64()));
        id
    }

    /// Register a specification monitor for this iteration.
    pub(crate) fn register_monitor(&self, monitor: Box<dyn SpecificationMonitor>) {
        self.lock().monitors.push(monitor);
    }

    /// Feed one test event to every registered monitor.
    pub(crate) fn monitor_event(&self, caller: OperationId, event: &str) {
        let mut st = self.lock();
        if !self.check_controlled(&mut st, caller) {
            drop(st);
            cancel_unwind();
        }
        for monitor in &mut st.monitors {
            monitor.on_event(event);
        }
    }

    /// Called from the operation's own thread once its work is about to
    /// run: transition to `Enabled` and suspend until chosen.
    pub(crate) fn start_operation(&self, id: OperationId) {
        let mut st = self.lock();
        if st.termination.is_some() || !st.attached {
            drop(st);
            cancel_unwind();
        }
        {
            let op = st.ops.get_mut(&id).expect("operation not registered");
            assert_eq!(
                op.status,
                OperationStatus::NotStarted,
                "operation started twice"
            );
            op.status = OperationStatus::Enabled;
        }
        // Wake the parent blocked in wait_operation_start.
        self.cv.notify_all();
        self.wait_until_scheduled(st, id);
    }

    /// Block the spawning thread until `id` has entered the scheduler.
    ///
    /// Guarantees the parent cannot observe the child as not-yet-registered
    /// and keeps spawn ordering deterministic.
    pub(crate) fn wait_operation_start(&self, id: OperationId) {
        let mut st = self.lock();
        loop {
            if st.termination.is_some() || !st.attached {
                drop(st);
                cancel_unwind();
            }
            let started = st
                .ops
                .get(&id)
                .map(|op| op.status != OperationStatus::NotStarted)
                .unwrap_or(false);
            if started {
                return;
            }
            st = self.cv.wait(st).expect("scheduler condvar poisoned");
        }
    }

    /// The core scheduling step: hand the step token to the next operation
    /// the strategy picks, and suspend the caller until it is picked again.
    pub(crate) fn schedule_next_operation(&self, caller: OperationId, is_yielding: bool) {
        let mut st = self.lock();
        if !self.check_controlled(&mut st, caller) {
            drop(st);
            cancel_unwind();
        }

        // The caller gives up the token; unless a wait condition was
        // installed it stays eligible.
        if let Some(op) = st.ops.get_mut(&caller) {
            if op.status == OperationStatus::Running {
                op.status = OperationStatus::Enabled;
            }
        }

        let next = match self.choose_next(&mut st, caller, is_yielding) {
            Some(id) => id,
            None => {
                drop(st);
                cancel_unwind();
            }
        };

        if next == caller {
            st.ops
                .get_mut(&caller)
                .expect("caller not registered")
                .status = OperationStatus::Running;
            return;
        }

        st.ops
            .get_mut(&next)
            .expect("scheduled operation not registered")
            .status = OperationStatus::Running;
        st.running = Some(next);
        self.cv.notify_all();
        self.wait_until_scheduled(st, caller);
    }

    /// Nondeterministic boolean choice. Counts as a step.
    pub(crate) fn next_boolean_choice(&self, caller: OperationId) -> bool {
        let mut st = self.lock();
        if !self.check_controlled(&mut st, caller) {
            drop(st);
            cancel_unwind();
        }
        if self.hard_cap_hit(&st) {
            self.terminate(&mut st, IterationStatus::BoundReached);
            drop(st);
            cancel_unwind();
        }
        let drawn = {
            let strategy = st.strategy.clone();
            let mut strategy = strategy.lock().expect("strategy mutex poisoned");
            strategy.next_boolean(caller)
        };
        let value = match drawn {
            Some(value) => value,
            None => {
                self.terminate(&mut st, IterationStatus::BoundReached);
                drop(st);
                cancel_unwind();
            }
        };
        let step = st.steps;
        st.steps += 1;
        st.trace.record_boolean(step, value);
        if let Some(err) = st.poll_liveness() {
            self.terminate(&mut st, IterationStatus::Failed(err));
            drop(st);
            cancel_unwind();
        }
        value
    }

    /// Nondeterministic integer choice in `[0, max)`. Counts as a step.
    pub(crate) fn next_integer_choice(&self, caller: OperationId, max: u32) -> u32 {
        assert!(max > 0, "integer choice requires a positive bound");
        let mut st = self.lock();
        if !self.check_controlled(&mut st, caller) {
            drop(st);
            cancel_unwind();
        }
        if self.hard_cap_hit(&st) {
            self.terminate(&mut st, IterationStatus::BoundReached);
            drop(st);
            cancel_unwind();
        }
        let drawn = {
            let strategy = st.strategy.clone();
            let mut strategy = strategy.lock().expect("strategy mutex poisoned");
            strategy.next_integer(caller, max)
        };
        let value = match drawn {
            Some(value) if value < max => value,
            Some(value) => {
                let detail = format!(
                    "replayed integer choice {value} out of range [0, {max}) at step {}",
                    st.steps
                );
                self.terminate(
                    &mut st,
                    IterationStatus::Failed(TestError::UncontrolledConcurrency { detail }),
                );
                drop(st);
                cancel_unwind();
            }
            None => {
                self.terminate(&mut st, IterationStatus::BoundReached);
                drop(st);
                cancel_unwind();
            }
        };
        let step = st.steps;
        st.steps += 1;
        st.trace.record_integer(step, value);
        if let Some(err) = st.poll_liveness() {
            self.terminate(&mut st, IterationStatus::Failed(err));
            drop(st);
            cancel_unwind();
        }
        value
    }

    /// Install a wait condition for `caller`.
    ///
    /// Returns true when the caller was actually blocked (the condition was
    /// not already satisfied); the caller must then reach a scheduling
    /// point to hand off the token.
    pub(crate) fn block_on(&self, caller: OperationId, condition: WaitCondition) -> bool {
        let mut st = self.lock();
        if !self.check_controlled(&mut st, caller) {
            drop(st);
            cancel_unwind();
        }

        let (status, remaining) = match condition {
            WaitCondition::None => return false,
            WaitCondition::All(pending) => {
                let remaining: std::collections::BTreeSet<OperationId> = pending
                    .into_iter()
                    .filter(|id| !st.is_completed(*id))
                    .collect();
                if remaining.is_empty() {
                    return false;
                }
                (OperationStatus::BlockedOnWaitAll, WaitCondition::All(remaining))
            }
            WaitCondition::Any(pending) => {
                debug_assert!(!pending.is_empty());
                if pending.iter().any(|id| st.is_completed(*id)) {
                    return false;
                }
                (OperationStatus::BlockedOnWaitAny, WaitCondition::Any(pending))
            }
        };

        let op = st.ops.get_mut(&caller).expect("caller not registered");
        op.status = status;
        op.waiting_on = remaining;
        true
    }

    /// Whether an operation has completed.
    pub(crate) fn is_operation_completed(&self, id: OperationId) -> bool {
        self.lock().is_completed(id)
    }

    /// Terminate the iteration with an assertion failure and unwind.
    pub(crate) fn notify_assertion_failure(&self, _caller: OperationId, message: &str) -> ! {
        let mut st = self.lock();
        self.terminate(
            &mut st,
            IterationStatus::Failed(TestError::AssertionFailure {
                message: message.to_string(),
            }),
        );
        drop(st);
        cancel_unwind()
    }

    /// Record a user panic that escaped an operation and terminate.
    ///
    /// Called at the operation thread's root after unwinding; must not
    /// panic itself.
    pub(crate) fn notify_unhandled_panic(&self, operation: OperationId, message: String) {
        let mut st = self.lock_or_recover();
        self.terminate(
            &mut st,
            IterationStatus::Failed(TestError::UnhandledPanic { operation, message }),
        );
    }

    /// Mark `caller` completed, release its waiters, and hand the token to
    /// the next chosen operation. Called from the operation thread's root.
    pub(crate) fn on_completed(&self, caller: OperationId) {
        let mut st = self.lock();
        if st.termination.is_some() || !st.attached {
            return;
        }
        if st.running != Some(caller) {
            let detail = format!(
                "operation {} completed while it was not the running operation",
                caller.as_u64()
            );
            self.terminate(
                &mut st,
                IterationStatus::Failed(TestError::UncontrolledConcurrency { detail }),
            );
            return;
        }
        {
            let op = st.ops.get_mut(&caller).expect("caller not registered");
            op.status = OperationStatus::Completed;
            op.waiting_on = WaitCondition::None;
        }
        for op in st.ops.values_mut() {
            op.notify_completed(caller);
        }
        st.running = None;

        if let Some(next) = self.choose_next(&mut st, caller, false) {
            st.ops
                .get_mut(&next)
                .expect("scheduled operation not registered")
                .status = OperationStatus::Running;
            st.running = Some(next);
        }
        self.cv.notify_all();
    }

    /// Hand the token to the first operation once it is visible. Called by
    /// the iteration driver, which is not itself an operation.
    pub(crate) fn launch(&self, root: OperationId) {
        let mut st = self.lock();
        loop {
            if st.termination.is_some() {
                return;
            }
            let ready = st
                .ops
                .get(&root)
                .map(|op| op.status == OperationStatus::Enabled)
                .unwrap_or(false);
            if ready {
                break;
            }
            st = self.cv.wait(st).expect("scheduler condvar poisoned");
        }
        st.ops
            .get_mut(&root)
            .expect("root operation not registered")
            .status = OperationStatus::Running;
        st.running = Some(root);
        self.cv.notify_all();
    }

    /// Block the iteration driver until the iteration terminates.
    pub(crate) fn wait_for_termination(&self) -> IterationStatus {
        let mut st = self.lock();
        loop {
            if let Some(status) = st.termination.clone() {
                return status;
            }
            st = self.cv.wait(st).expect("scheduler condvar poisoned");
        }
    }

    /// Detach: any operation that reaches the scheduler afterwards unwinds
    /// with the cancellation signal.
    pub(crate) fn detach(&self) {
        let mut st = self.lock_or_recover();
        st.attached = false;
        if st.termination.is_none() {
            st.termination = Some(IterationStatus::Cancelled);
        }
        st.running = None;
        self.cv.notify_all();
    }

    /// Steps taken so far (or total, after termination).
    pub(crate) fn steps(&self) -> u64 {
        self.lock_or_recover().steps
    }

    /// Move the recorded trace out of the scheduler.
    pub(crate) fn take_trace(&self) -> ExecutionTrace {
        std::mem::take(&mut self.lock_or_recover().trace)
    }

    /// Reject scheduler calls from anything but the running operation:
    /// that is concurrency outside the controlled surface.
    ///
    /// Returns false when the caller must unwind; the caller drops the
    /// guard first so the unwind never poisons the scheduler mutex.
    fn check_controlled(&self, st: &mut SchedulerState, caller: OperationId) -> bool {
        if st.termination.is_some() || !st.attached {
            return false;
        }
        if st.running != Some(caller) {
            let detail = format!(
                "operation {} invoked the scheduler while it was not the running operation",
                caller.as_u64()
            );
            self.terminate(
                st,
                IterationStatus::Failed(TestError::UncontrolledConcurrency { detail }),
            );
            return false;
        }
        true
    }

    #[inline]
    fn hard_cap_hit(&self, st: &SchedulerState) -> bool {
        st.hard_step_cap != 0 && st.steps >= st.hard_step_cap
    }

    /// Snapshot the enabled set, consult the strategy, and record the
    /// choice. Terminates the iteration (deadlock, bound, liveness,
    /// divergence) and returns `None` when no step can be taken.
    fn choose_next(
        &self,
        st: &mut SchedulerState,
        current: OperationId,
        is_yielding: bool,
    ) -> Option<OperationId> {
        let enabled = st.enabled();
        if enabled.is_empty() {
            if st.all_completed() {
                self.terminate(st, IterationStatus::Passed);
            } else {
                let blocked = st.blocked_ids();
                self.logger.debug(format_args!(
                    "deadlock at step {}: {} blocked operation(s)",
                    st.steps,
                    blocked.len()
                ));
                self.terminate(
                    st,
                    IterationStatus::Failed(TestError::Deadlock { blocked }),
                );
            }
            return None;
        }

        if self.hard_cap_hit(st) {
            self.terminate(st, IterationStatus::BoundReached);
            return None;
        }

        let picked = {
            let strategy = st.strategy.clone();
            let mut strategy = strategy.lock().expect("strategy mutex poisoned");
            strategy.next_operation(&enabled, current, is_yielding)
        };
        let next = match picked {
            Some(id) => id,
            None => {
                self.terminate(st, IterationStatus::BoundReached);
                return None;
            }
        };
        if !enabled.contains(&next) {
            let detail = format!(
                "schedule divergence: operation {} chosen at step {} is not enabled",
                next.as_u64(),
                st.steps
            );
            self.terminate(
                st,
                IterationStatus::Failed(TestError::UncontrolledConcurrency { detail }),
            );
            return None;
        }

        let step = st.steps;
        st.steps += 1;
        st.trace.record_operation(step, next);

        if let Some(err) = st.poll_liveness() {
            self.terminate(st, IterationStatus::Failed(err));
            return None;
        }
        Some(next)
    }

    /// Record the termination reason (first one wins) and wake everyone.
    fn terminate(&self, st: &mut SchedulerState, status: IterationStatus) {
        if st.termination.is_none() {
            self.logger
                .debug(format_args!("iteration terminated: {status:?}"));
            st.termination = Some(status);
        }
        st.running = None;
        self.cv.notify_all();
    }

    /// Suspend until `id` holds the step token again, or unwind if the
    /// iteration terminates first.
    fn wait_until_scheduled(&self, mut st: MutexGuard<'_, SchedulerState>, id: OperationId) {
        loop {
            if st.termination.is_some() || !st.attached {
                drop(st);
                cancel_unwind();
            }
            if st.running == Some(id) {
                return;
            }
            st = self.cv.wait(st).expect("scheduler condvar poisoned");
        }
    }
}
