//! Error taxonomy and per-iteration outcomes.
//!
//! Errors are kept as data (serde-serializable) because they travel inside
//! failure reports and persisted artifacts. The enum is `#[non_exhaustive]`
//! to allow adding violation kinds without breaking callers; consumers
//! should include a fallback match arm.
//!
//! A bound-reached iteration is an outcome, not an error: it contributes to
//! coverage accounting but is never reported as a bug.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::runtime::operation::OperationId;

/// A violation detected during one iteration of a controlled test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TestError {
    /// A user or engine assertion did not hold.
    AssertionFailure { message: String },
    /// No operation is enabled and the test has not completed.
    Deadlock { blocked: Vec<OperationId> },
    /// A specification monitor stayed hot past the temperature window.
    LivenessViolation { monitor: String },
    /// Concurrency escaped the controlled surface.
    UncontrolledConcurrency { detail: String },
    /// User code panicked inside a scheduled operation.
    UnhandledPanic {
        operation: OperationId,
        message: String,
    },
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssertionFailure { message } => write!(f, "assertion failed: {message}"),
            Self::Deadlock { blocked } => {
                write!(f, "deadlock: {} operation(s) blocked forever (", blocked.len())?;
                for (i, id) in blocked.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "op {}", id.as_u64())?;
                }
                write!(f, ")")
            }
            Self::LivenessViolation { monitor } => {
                write!(f, "liveness violation: monitor '{monitor}' stayed hot")
            }
            Self::UncontrolledConcurrency { detail } => {
                write!(f, "uncontrolled concurrency: {detail}")
            }
            Self::UnhandledPanic { operation, message } => {
                write!(
                    f,
                    "unhandled panic in operation {}: {message}",
                    operation.as_u64()
                )
            }
        }
    }
}

impl std::error::Error for TestError {}

/// Terminal state of one iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationStatus {
    /// The test body and every spawned operation completed.
    Passed,
    /// The scheduling-step bound was hit before completion.
    BoundReached,
    /// A violation was detected.
    Failed(TestError),
    /// The scheduler was detached mid-iteration.
    Cancelled,
}

impl IterationStatus {
    /// Whether this outcome reports a bug.
    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
