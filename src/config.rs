//! Run configuration for the controlled testing engine.
//!
//! Plain-field config structs with serde derives so a configuration can be
//! embedded in reproduction artifacts. Validation happens once at the start
//! of a run; a rejected configuration is the exit-code-2 path and never
//! reaches the scheduler.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scheduling-step caps for one iteration.
///
/// `soft` bounds the strategy (it stops answering once hit); `hard` is the
/// scheduler's backstop for strategies that keep answering, e.g. wrappers
/// that replay or force choices. Zero disables the respective cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBound {
    pub soft: u64,
    pub hard: u64,
}

impl Default for StepBound {
    fn default() -> Self {
        Self {
            soft: 10_000,
            hard: 100_000,
        }
    }
}

/// Which exploration strategy drives the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Uniform random choice over the enabled set.
    Random,
    /// Probabilistic concurrency testing with `change_points` priority
    /// change points per iteration.
    Pct { change_points: u32 },
    /// Bounded depth-first enumeration of interleavings.
    Dfs,
    /// Round-robin over member strategies, one per iteration.
    Portfolio(Vec<StrategyKind>),
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::Random
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    /// Parse `random`, `pct:<k>`, `dfs`, or `portfolio:[a,b,...]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidStrategy { spec: s.to_string() };
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("random") {
            return Ok(Self::Random);
        }
        if trimmed.eq_ignore_ascii_case("dfs") {
            return Ok(Self::Dfs);
        }
        if trimmed.eq_ignore_ascii_case("pct") {
            return Ok(Self::Pct { change_points: 3 });
        }
        if let Some(rest) = trimmed.strip_prefix("pct:") {
            let change_points = rest.trim().parse::<u32>().map_err(|_| invalid())?;
            return Ok(Self::Pct { change_points });
        }
        if let Some(rest) = trimmed.strip_prefix("portfolio:") {
            let inner = rest
                .trim()
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or_else(invalid)?;
            let mut members = Vec::new();
            for part in inner.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let member = Self::from_str(part)?;
                if matches!(member, Self::Portfolio(_)) {
                    return Err(invalid());
                }
                members.push(member);
            }
            if members.is_empty() {
                return Err(ConfigError::EmptyPortfolio);
            }
            return Ok(Self::Portfolio(members));
        }
        Err(invalid())
    }
}

/// Debug log gate for the scheduler's stderr stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verbosity {
    Quiet,
    #[default]
    Warnings,
    Info,
    Debug,
}

/// Options recognized by the run entry point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    /// Number of fresh runs of the test body.
    pub iterations: u32,
    /// Exploration strategy.
    pub strategy: StrategyKind,
    /// Base PRNG seed; each iteration derives its own seed from it.
    pub seed: u64,
    /// Scheduling-step caps per iteration.
    pub max_steps: StepBound,
    /// Wrap an unfair strategy so every continuously enabled operation is
    /// eventually scheduled.
    pub fairness: bool,
    /// Consecutive steps an operation may be skipped while enabled before
    /// the fair wrapper forces it.
    pub fairness_threshold: u64,
    /// Consecutive hot steps a specification monitor may accumulate before
    /// a liveness violation is declared. Zero disables the check.
    pub liveness_temperature: u64,
    /// Replay a previously captured trace instead of exploring.
    pub replay_trace: Option<PathBuf>,
    /// Write the trace of the first failing iteration to this path.
    pub trace_output: Option<PathBuf>,
    /// Scheduler debug log gate.
    pub verbosity: Verbosity,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            iterations: 100,
            strategy: StrategyKind::Random,
            seed: 0,
            max_steps: StepBound::default(),
            fairness: false,
            fairness_threshold: 64,
            liveness_temperature: 1_000,
            replay_trace: None,
            trace_output: None,
            verbosity: Verbosity::Warnings,
        }
    }
}

impl Configuration {
    /// Reject configurations the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.max_steps.soft != 0
            && self.max_steps.hard != 0
            && self.max_steps.hard < self.max_steps.soft
        {
            return Err(ConfigError::InvalidStepBound {
                detail: "hard cap is smaller than the soft cap",
            });
        }
        if self.fairness && self.fairness_threshold == 0 {
            return Err(ConfigError::InvalidStepBound {
                detail: "fairness requires a non-zero threshold",
            });
        }
        validate_strategy(&self.strategy)
    }
}

fn validate_strategy(kind: &StrategyKind) -> Result<(), ConfigError> {
    if let StrategyKind::Portfolio(members) = kind {
        if members.is_empty() {
            return Err(ConfigError::EmptyPortfolio);
        }
        for member in members {
            if matches!(member, StrategyKind::Portfolio(_)) {
                return Err(ConfigError::InvalidStrategy {
                    spec: "nested portfolio".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Errors from configuration validation and replay-trace loading.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// `iterations` must be positive.
    ZeroIterations,
    /// Unrecognized or malformed strategy specification.
    InvalidStrategy { spec: String },
    /// A portfolio needs at least one member.
    EmptyPortfolio,
    /// Step caps are inconsistent.
    InvalidStepBound { detail: &'static str },
    /// The replay trace could not be read or decoded.
    ReplayTrace { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroIterations => write!(f, "iterations must be positive"),
            Self::InvalidStrategy { spec } => write!(f, "invalid strategy spec: '{spec}'"),
            Self::EmptyPortfolio => write!(f, "portfolio strategy has no members"),
            Self::InvalidStepBound { detail } => write!(f, "invalid step bound: {detail}"),
            Self::ReplayTrace { path, source } => {
                write!(f, "cannot load replay trace {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReplayTrace { source, .. } => Some(source),
            _ => None,
        }
    }
}
