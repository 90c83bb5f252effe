#![allow(dead_code)]
//! Systematic concurrency testing engine.
//!
//! A controlled scheduler takes an asynchronous test body and, across many
//! replayable iterations, drives its concurrent operations through diverse
//! interleavings to expose safety and liveness bugs that stress testing
//! rarely reaches.
//!
//! Building blocks, leaves first:
//! - Exploration strategies: pure decision policies (random, PCT, bounded
//!   DFS, fair and replay wrappers, portfolio) that pick which enabled
//!   operation runs next and resolve nondeterministic choices.
//! - Operation scheduler: the kernel. Owns the operation map, the single
//!   step mutex that serializes execution, the step counter, and the
//!   recorded trace.
//! - Task controller: adapts spawn / yield / delay / when-all / when-any /
//!   wait into scheduler operations, so every asynchronous boundary is a
//!   scheduling decision point.
//! - Controlled runtime: the `run_test` façade driving iterations and
//!   producing reports with replayable traces.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use interleave_rs::{run_test, Configuration};
//!
//! let cell = Arc::new(AtomicU32::new(0));
//! let report = run_test(Configuration::default(), move |ctx| {
//!     cell.store(0, Ordering::SeqCst);
//!     let writer = {
//!         let cell = Arc::clone(&cell);
//!         ctx.spawn(move |_| cell.store(3, Ordering::SeqCst))
//!     };
//!     cell.store(5, Ordering::SeqCst);
//!     ctx.join(writer);
//!     ctx.assert(cell.load(Ordering::SeqCst) == 5, "lost update");
//! })
//! .unwrap();
//! if let Some(failure) = &report.failure {
//!     eprintln!("bug found: {} (seed {})", failure.error, failure.seed);
//! }
//! ```

pub mod config;
pub mod error;
pub mod liveness;
pub mod rng;
pub mod runtime;
pub mod strategy;
pub mod trace;

pub use config::{ConfigError, Configuration, StepBound, StrategyKind, Verbosity};
pub use error::{IterationStatus, TestError};
pub use liveness::SpecificationMonitor;
pub use runtime::controller::{CancellationToken, SpawnOptions, TaskHandle, TestContext};
pub use runtime::operation::{OperationId, OperationStatus, WaitCondition};
pub use runtime::{run_test, ControlledRuntime, IterationFailure, TestReport};
pub use strategy::SchedulingStrategy;
pub use trace::{Choice, ExecutionTrace, TraceEntry};
