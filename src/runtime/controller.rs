//! Task controller: the controlled concurrency surface.
//!
//! Adapts user-level task operations (spawn, continuation, yield, delay,
//! when-all, when-any, wait) into scheduler operations so every
//! asynchronous boundary the test body creates is a scheduling decision
//! point. Each operation runs on a dedicated thread; the scheduler's step
//! token guarantees at most one of them executes user code at a time.
//!
//! Spawn protocol: register the operation, start its thread, and block the
//! parent until the child has entered the scheduler. The parent therefore
//! never observes a child as not-yet-registered, and spawn order is
//! deterministic.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::runtime::logger::SchedulerLogger;
use crate::runtime::operation::{OperationId, WaitCondition};
use crate::runtime::scheduler::{panic_message, ExecutionCancelled, OperationScheduler};

/// Cancellation token threaded through spawn options.
///
/// Accepted for API compatibility but best-effort under testing: controlled
/// delays and waits return when the scheduler decides, not when the token
/// fires. Test code may observe it through [`TestContext::is_cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Observed, never enforced.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Options for [`TestContext::spawn_with`].
#[derive(Clone, Debug, Default)]
pub struct SpawnOptions {
    /// Human-readable operation name; defaults to `task`.
    pub name: String,
    /// Operation that must complete before the work runs.
    pub predecessor: Option<OperationId>,
    /// Yield once before running the work.
    pub yield_first: bool,
    /// Best-effort cancellation token.
    pub cancel: Option<CancellationToken>,
}

impl SpawnOptions {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Handle to a controlled task and its eventual result.
///
/// Handles are cheap to clone; the result itself is moved out by whichever
/// wait consumes the handle first.
#[must_use = "a task handle should be joined or waited on; dropping it detaches the task"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: Option<OperationId>,
    result: Arc<Mutex<Option<T>>>,
}

impl<T> TaskHandle<T> {
    /// A pre-completed handle carrying `value`, with no backing operation.
    pub fn ready(value: T) -> Self {
        Self {
            id: None,
            result: Arc::new(Mutex::new(Some(value))),
        }
    }

    /// The backing operation id, if one was registered.
    pub fn id(&self) -> Option<OperationId> {
        self.id
    }

    fn take_result(self) -> T {
        self.result
            .lock()
            .expect("task result mutex poisoned")
            .take()
            .expect("task result already taken or operation did not complete")
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            result: Arc::clone(&self.result),
        }
    }
}

/// Per-iteration owner of operation threads.
pub(crate) struct TaskController {
    scheduler: Arc<OperationScheduler>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    logger: SchedulerLogger,
}

impl TaskController {
    pub(crate) fn new(scheduler: Arc<OperationScheduler>, logger: SchedulerLogger) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            threads: Mutex::new(Vec::new()),
            logger,
        })
    }

    /// Spawn the root operation that runs the test body.
    pub(crate) fn spawn_root<F>(self: &Arc<Self>, body: F) -> OperationId
    where
        F: FnOnce(TestContext) + Send + 'static,
    {
        let handle = self.spawn_operation(SpawnOptions::named("main"), body);
        handle.id.expect("root operation is always registered")
    }

    /// The spawn protocol shared by every controlled task.
    fn spawn_operation<T, F>(self: &Arc<Self>, opts: SpawnOptions, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TestContext) -> T + Send + 'static,
    {
        let name = if opts.name.is_empty() {
            "task".to_string()
        } else {
            opts.name.clone()
        };
        if opts.cancel.is_some() {
            self.logger.warn(format_args!(
                "cancellation token on operation '{name}' is best-effort: controlled delays and waits ignore it"
            ));
        }

        let scheduler = Arc::clone(&self.scheduler);
        let id = scheduler.register_operation(&name);
        let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

        let controller = Arc::clone(self);
        let result_slot = Arc::clone(&slot);
        let token = opts.cancel.unwrap_or_default();
        let predecessor = opts.predecessor;
        let yield_first = opts.yield_first;
        let thread_scheduler = Arc::clone(&scheduler);

        let join_handle = thread::Builder::new()
            .name(format!("op-{}-{name}", id.as_u64()))
            .spawn(move || {
                let sched = thread_scheduler;
                let sched_in_work = Arc::clone(&sched);
                let ctx = TestContext {
                    controller,
                    op: id,
                    cancel: token,
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                    sched_in_work.start_operation(id);
                    if let Some(pred) = predecessor {
                        let waits =
                            WaitCondition::All(BTreeSet::from([pred]));
                        if sched_in_work.block_on(id, waits) {
                            sched_in_work.schedule_next_operation(id, false);
                        }
                    }
                    if yield_first {
                        sched_in_work.schedule_next_operation(id, true);
                    }
                    let value = work(ctx);
                    *result_slot
                        .lock()
                        .expect("task result mutex poisoned") = Some(value);
                }));
                match outcome {
                    Ok(()) => sched.on_completed(id),
                    Err(payload) => {
                        if payload.downcast_ref::<ExecutionCancelled>().is_some() {
                            // Iteration teardown; nothing to report.
                        } else {
                            sched.notify_unhandled_panic(id, panic_message(payload.as_ref()));
                        }
                    }
                }
            })
            .expect("failed to spawn operation thread");

        self.threads
            .lock()
            .expect("thread registry mutex poisoned")
            .push(join_handle);

        scheduler.wait_operation_start(id);
        TaskHandle { id: Some(id), result: slot }
    }

    /// Join every operation thread spawned this iteration.
    ///
    /// Looped because a joining thread may have been mid-spawn when the
    /// iteration terminated; joining it flushes its child into the
    /// registry.
    pub(crate) fn join_all(&self) {
        loop {
            let handles: Vec<thread::JoinHandle<()>> = {
                let mut registry = self
                    .threads
                    .lock()
                    .expect("thread registry mutex poisoned");
                registry.drain(..).collect()
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                // A panicking operation already reported through the
                // scheduler; the join result carries nothing further.
                let _ = handle.join();
            }
        }
    }
}

/// Capability handed to every operation closure: the controlled surface of
/// one operation.
///
/// Each spawned closure receives its own context. Using a context from a
/// different operation (or from an uncontrolled thread) is detected by the
/// scheduler and fails the iteration.
#[derive(Clone)]
pub struct TestContext {
    controller: Arc<TaskController>,
    op: OperationId,
    cancel: CancellationToken,
}

impl TestContext {
    /// Id of the operation this context belongs to.
    pub fn operation_id(&self) -> OperationId {
        self.op
    }

    /// Spawn a controlled task.
    pub fn spawn<T, F>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TestContext) -> T + Send + 'static,
    {
        self.controller.spawn_operation(SpawnOptions::default(), work)
    }

    /// Spawn a controlled task with a human-readable name.
    pub fn spawn_named<T, F>(&self, name: &str, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TestContext) -> T + Send + 'static,
    {
        self.controller.spawn_operation(SpawnOptions::named(name), work)
    }

    /// Spawn with full options (predecessor, initial yield, token).
    pub fn spawn_with<T, F>(&self, opts: SpawnOptions, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TestContext) -> T + Send + 'static,
    {
        self.controller.spawn_operation(opts, work)
    }

    /// Schedule `work` to run after `after` completes.
    pub fn continue_with<T, F, P>(&self, after: &TaskHandle<P>, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TestContext) -> T + Send + 'static,
    {
        let opts = SpawnOptions {
            name: "continuation".to_string(),
            predecessor: after.id(),
            ..SpawnOptions::default()
        };
        self.controller.spawn_operation(opts, work)
    }

    /// Hand the step token back to the scheduler, hinting the yield.
    pub fn yield_now(&self) {
        self.scheduler().schedule_next_operation(self.op, true);
    }

    /// A task that completes after a scheduler-chosen delay.
    ///
    /// A zero-tick delay is already complete and registers no operation.
    /// The tick count is otherwise irrelevant under testing: delays elapse
    /// whenever the scheduler elects to run them.
    pub fn schedule_delay(&self, ticks: u64) -> TaskHandle<()> {
        if ticks == 0 {
            return TaskHandle::ready(());
        }
        self.controller
            .spawn_operation(SpawnOptions::named("delay"), |_ctx| ())
    }

    /// Blocking form of [`TestContext::schedule_delay`].
    pub fn delay(&self, ticks: u64) {
        let handle = self.schedule_delay(ticks);
        self.join(handle);
    }

    /// Wait for a task and take its result.
    pub fn join<T>(&self, handle: TaskHandle<T>) -> T {
        if let Some(id) = handle.id {
            let waits = WaitCondition::All(BTreeSet::from([id]));
            if self.scheduler().block_on(self.op, waits) {
                self.scheduler().schedule_next_operation(self.op, false);
            }
        }
        handle.take_result()
    }

    /// Wait until every task completes; results in input order.
    ///
    /// An empty input fails the iteration: waiting for zero tasks is a
    /// latent bug far more often than a deliberate no-op. (The bare
    /// platform would return a completed task instead - callers that want
    /// that behavior can guard the call.)
    pub fn wait_all<T>(&self, handles: Vec<TaskHandle<T>>) -> Vec<T> {
        if handles.is_empty() {
            self.scheduler()
                .notify_assertion_failure(self.op, "cannot wait for zero tasks");
        }
        let pending: BTreeSet<OperationId> =
            handles.iter().filter_map(|handle| handle.id).collect();
        if !pending.is_empty() {
            if self.scheduler().block_on(self.op, WaitCondition::All(pending)) {
                self.scheduler().schedule_next_operation(self.op, false);
            }
        }
        handles
            .into_iter()
            .map(|handle| handle.take_result())
            .collect()
    }

    /// Wait until any task completes; returns the index of the first
    /// completed handle (lowest index wins for determinism). Results stay
    /// in the handles.
    pub fn wait_any<T>(&self, handles: &[TaskHandle<T>]) -> usize {
        if handles.is_empty() {
            self.scheduler()
                .notify_assertion_failure(self.op, "cannot wait for zero tasks");
        }
        let already_ready = handles.iter().any(|handle| handle.id.is_none());
        if !already_ready {
            let pending: BTreeSet<OperationId> =
                handles.iter().filter_map(|handle| handle.id).collect();
            if self.scheduler().block_on(self.op, WaitCondition::Any(pending)) {
                self.scheduler().schedule_next_operation(self.op, false);
            }
        }
        handles
            .iter()
            .position(|handle| match handle.id {
                None => true,
                Some(id) => self.scheduler().is_operation_completed(id),
            })
            .expect("wait_any resumed without a completed task")
    }

    /// Deterministic nondeterministic boolean.
    pub fn next_bool(&self) -> bool {
        self.scheduler().next_boolean_choice(self.op)
    }

    /// Deterministic nondeterministic integer in `[0, max)`.
    pub fn next_int(&self, max: u32) -> u32 {
        self.scheduler().next_integer_choice(self.op, max)
    }

    /// Fail the iteration unless `condition` holds.
    pub fn assert(&self, condition: bool, message: &str) {
        if !condition {
            self.scheduler().notify_assertion_failure(self.op, message);
        }
    }

    /// Publish one event to every registered specification monitor.
    pub fn monitor_event(&self, event: &str) {
        self.scheduler().monitor_event(self.op, event);
    }

    /// Whether this operation's cancellation token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn scheduler(&self) -> &OperationScheduler {
        &self.controller.scheduler
    }
}
