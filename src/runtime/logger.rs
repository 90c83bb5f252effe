//! Verbosity-gated stderr logging for the scheduler.
//!
//! The engine logs operationally (plain stderr lines); the gate exists so
//! replay-with-verbose-logging can be turned on without recompiling.

use std::fmt;

use crate::config::Verbosity;

/// Cheap, cloneable logger handle shared by scheduler and controller.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SchedulerLogger {
    verbosity: Verbosity,
}

impl SchedulerLogger {
    pub(crate) fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    #[inline]
    pub(crate) fn warn(&self, args: fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Warnings {
            eprintln!("[interleave] warning: {args}");
        }
    }

    #[inline]
    pub(crate) fn info(&self, args: fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("[interleave] {args}");
        }
    }

    #[inline]
    pub(crate) fn debug(&self, args: fmt::Arguments<'_>) {
        if self.verbosity >= Verbosity::Debug {
            eprintln!("[interleave] debug: {args}");
        }
    }
}
