//! Execution trace for deterministic replay and failure forensics.
//!
//! A trace is the ordered sequence of answers the active strategy gave
//! during one iteration: which operation ran next, and the outcome of every
//! nondeterministic boolean/integer choice. Together with the test body it
//! is sufficient to reproduce an interleaving bit-for-bit.
//!
//! Traces are serialized to JSON so failing runs can be persisted and fed
//! back through the replay strategy.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::runtime::operation::OperationId;

/// A single recorded strategy answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    /// The operation chosen to run next.
    Operation { id: OperationId },
    /// A nondeterministic boolean draw.
    Boolean { value: bool },
    /// A nondeterministic integer draw in `[0, max)`.
    Integer { value: u32 },
}

/// One trace entry: the step counter value and the choice taken at it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: u64,
    pub choice: Choice,
}

/// Ordered list of every choice made during one iteration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    entries: Vec<TraceEntry>,
}

impl ExecutionTrace {
    /// Create an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded choices.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no choices were recorded.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded entries in step order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub(crate) fn record_operation(&mut self, step: u64, id: OperationId) {
        self.entries.push(TraceEntry {
            step,
            choice: Choice::Operation { id },
        });
    }

    pub(crate) fn record_boolean(&mut self, step: u64, value: bool) {
        self.entries.push(TraceEntry {
            step,
            choice: Choice::Boolean { value },
        });
    }

    pub(crate) fn record_integer(&mut self, step: u64, value: u32) {
        self.entries.push(TraceEntry {
            step,
            choice: Choice::Integer { value },
        });
    }

    /// Persist the trace as JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    /// Load a trace previously written by [`ExecutionTrace::save`].
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(io::Error::other)
    }
}
