//! Controlled runtime: one scheduler + one controller per iteration.
//!
//! The façade owns the iteration loop: re-initialize the strategy, build a
//! fresh scheduler/controller pair, run the test body under control, and
//! fold the outcome into the report. The first failing iteration stops the
//! run and carries everything needed to reproduce it: error kind, derived
//! seed, step count, and the full trace.

pub mod controller;
pub(crate) mod logger;
pub mod operation;
pub(crate) mod scheduler;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, Configuration};
use crate::error::{IterationStatus, TestError};
use crate::liveness::SpecificationMonitor;
use crate::rng::iteration_seed;
use crate::strategy::build_strategy;
use crate::trace::ExecutionTrace;

use controller::{TaskController, TestContext};
use logger::SchedulerLogger;
use scheduler::OperationScheduler;

/// Everything needed to reproduce and diagnose one failing iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationFailure {
    /// Zero-based index of the failing iteration.
    pub iteration: u32,
    /// Effective PRNG seed of that iteration.
    pub seed: u64,
    /// Scheduling decisions taken before termination.
    pub steps: u64,
    /// The detected violation.
    pub error: TestError,
    /// Full replayable trace of the iteration.
    pub trace: ExecutionTrace,
}

/// Aggregate outcome of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub iterations_requested: u32,
    pub iterations_run: u32,
    /// Iterations that ran the body to completion without a violation.
    pub passed: u32,
    /// Iterations cut off by the step bound; coverage, not bugs.
    pub bound_reached: u32,
    /// Iterations cancelled by detach.
    pub cancelled: u32,
    /// First detected violation, if any.
    pub failure: Option<IterationFailure>,
}

impl TestReport {
    /// Whether the run found a violation.
    pub fn found_bug(&self) -> bool {
        self.failure.is_some()
    }

    /// Process exit code: 0 all passed, 1 violation found. (Configuration
    /// errors surface as `Err` from the run entry points and map to 2.)
    pub fn exit_code(&self) -> i32 {
        if self.found_bug() {
            1
        } else {
            0
        }
    }
}

type MonitorFactory = Box<dyn Fn() -> Box<dyn SpecificationMonitor> + Send + Sync>;

/// Builder-style façade over the iteration loop.
pub struct ControlledRuntime {
    config: Configuration,
    monitor_factories: Vec<MonitorFactory>,
}

impl ControlledRuntime {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            monitor_factories: Vec::new(),
        }
    }

    /// Register a specification monitor; the factory runs once per
    /// iteration so every iteration observes a fresh automaton.
    pub fn with_monitor<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SpecificationMonitor> + Send + Sync + 'static,
    {
        self.monitor_factories.push(Box::new(factory));
        self
    }

    /// Run `body` for the configured number of iterations.
    pub fn run<F>(&self, body: F) -> Result<TestReport, ConfigError>
    where
        F: Fn(TestContext) + Send + Sync + 'static,
    {
        self.config.validate()?;
        let logger = SchedulerLogger::new(self.config.verbosity);

        let replay = match &self.config.replay_trace {
            Some(path) => {
                Some(ExecutionTrace::load(path).map_err(|source| ConfigError::ReplayTrace {
                    path: path.clone(),
                    source,
                })?)
            }
            None => None,
        };
        let replaying = replay.is_some();
        let iterations = if replaying { 1 } else { self.config.iterations };
        let strategy = build_strategy(&self.config, replay)?;

        let body = Arc::new(body);
        let mut report = TestReport {
            iterations_requested: iterations,
            ..TestReport::default()
        };

        for iteration in 0..iterations {
            let fresh = strategy
                .lock()
                .expect("strategy mutex poisoned")
                .initialize_iteration(iteration);
            if !fresh {
                logger.info(format_args!(
                    "search space exhausted after {iteration} iteration(s)"
                ));
                break;
            }

            let scheduler = Arc::new(OperationScheduler::new(
                Arc::clone(&strategy),
                self.config.max_steps.hard,
                self.config.liveness_temperature,
                logger,
            ));
            for factory in &self.monitor_factories {
                scheduler.register_monitor(factory());
            }

            let task_controller = TaskController::new(Arc::clone(&scheduler), logger);
            let body = Arc::clone(&body);
            let root = task_controller.spawn_root(move |ctx| (*body)(ctx));
            scheduler.launch(root);

            let status = scheduler.wait_for_termination();
            scheduler.detach();
            task_controller.join_all();

            report.iterations_run += 1;
            match status {
                IterationStatus::Passed => report.passed += 1,
                IterationStatus::BoundReached => report.bound_reached += 1,
                IterationStatus::Cancelled => report.cancelled += 1,
                IterationStatus::Failed(error) => {
                    let failure = IterationFailure {
                        iteration,
                        seed: iteration_seed(self.config.seed, iteration),
                        steps: scheduler.steps(),
                        error,
                        trace: scheduler.take_trace(),
                    };
                    logger.info(format_args!(
                        "iteration {iteration} failed after {} step(s): {}",
                        failure.steps, failure.error
                    ));
                    if let Some(path) = &self.config.trace_output {
                        match failure.trace.save(path) {
                            Ok(()) => logger.info(format_args!(
                                "repro trace written to {}",
                                path.display()
                            )),
                            Err(err) => logger.warn(format_args!(
                                "cannot write repro trace to {}: {err}",
                                path.display()
                            )),
                        }
                    }
                    report.failure = Some(failure);
                    break;
                }
            }
        }

        Ok(report)
    }
}

/// Run `body` under the controlled scheduler per `config`.
///
/// The body is invoked once per iteration with a fresh [`TestContext`]; all
/// concurrency inside it must go through that context.
pub fn run_test<F>(config: Configuration, body: F) -> Result<TestReport, ConfigError>
where
    F: Fn(TestContext) + Send + Sync + 'static,
{
    ControlledRuntime::new(config).run(body)
}
