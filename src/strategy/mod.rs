//! Exploration strategies: pluggable scheduling decision policies.
//!
//! A strategy answers one question per step: given the enabled operations
//! (always presented in ascending id order) and the current operation,
//! which runs next? It also resolves nondeterministic boolean and bounded
//! integer choices. Strategies are pure decision objects; they never call
//! back into the scheduler, and given the same seed they answer the same
//! way. That is the replay contract.

pub mod dfs;
pub mod fair;
pub mod pct;
pub mod portfolio;
pub mod random;
pub mod replay;

use std::sync::{Arc, Mutex};

use crate::config::{ConfigError, Configuration, StrategyKind};
use crate::runtime::operation::OperationId;
use crate::trace::ExecutionTrace;

pub use dfs::DfsStrategy;
pub use fair::FairStrategy;
pub use pct::PctStrategy;
pub use portfolio::PortfolioStrategy;
pub use random::RandomStrategy;
pub use replay::ReplayStrategy;

/// Decision policy consulted by the scheduler at every step.
pub trait SchedulingStrategy: Send {
    /// Prepare for iteration `iteration`. Returns false when the search
    /// space is exhausted and no fresh interleaving remains.
    fn initialize_iteration(&mut self, iteration: u32) -> bool;

    /// Choose the next operation from `enabled` (non-empty, ascending id
    /// order). `current` is the operation that reached the scheduling
    /// point; `is_yielding` hints that it volunteered. Returning `None`
    /// ends the iteration with a reached bound.
    fn next_operation(
        &mut self,
        enabled: &[OperationId],
        current: OperationId,
        is_yielding: bool,
    ) -> Option<OperationId>;

    /// Resolve a nondeterministic boolean choice.
    fn next_boolean(&mut self, current: OperationId) -> Option<bool>;

    /// Resolve a nondeterministic integer choice in `[0, max)`.
    fn next_integer(&mut self, current: OperationId, max: u32) -> Option<u32>;

    /// Steps answered so far in this iteration.
    fn scheduled_steps(&self) -> u64;

    /// Whether the soft step bound has been hit.
    fn max_steps_reached(&self) -> bool;

    /// Whether the policy guarantees every continuously enabled operation
    /// is eventually scheduled.
    fn is_fair(&self) -> bool;

    /// Short policy name for reports and logs.
    fn name(&self) -> &'static str;

    /// Drop all per-iteration state.
    fn reset(&mut self);
}

/// Strategy handle shared between the runtime (which re-initializes it per
/// iteration) and the scheduler (which consults it under its own lock).
pub(crate) type SharedStrategy = Arc<Mutex<Box<dyn SchedulingStrategy>>>;

/// Build the configured strategy stack, applying the fair wrapper when
/// requested and the base policy is unfair.
pub(crate) fn build_strategy(
    config: &Configuration,
    replay: Option<ExecutionTrace>,
) -> Result<SharedStrategy, ConfigError> {
    let soft = config.max_steps.soft;
    let mut strategy: Box<dyn SchedulingStrategy> = match replay {
        Some(trace) => Box::new(ReplayStrategy::new(trace)),
        None => build_kind(&config.strategy, config.seed, soft),
    };
    if config.fairness && !strategy.is_fair() {
        strategy = Box::new(FairStrategy::wrap(strategy, config.fairness_threshold));
    }
    Ok(Arc::new(Mutex::new(strategy)))
}

fn build_kind(kind: &StrategyKind, seed: u64, soft_bound: u64) -> Box<dyn SchedulingStrategy> {
    match kind {
        StrategyKind::Random => Box::new(RandomStrategy::new(seed, soft_bound)),
        StrategyKind::Pct { change_points } => {
            Box::new(PctStrategy::new(seed, soft_bound, *change_points))
        }
        StrategyKind::Dfs => Box::new(DfsStrategy::new(soft_bound)),
        StrategyKind::Portfolio(members) => {
            let built = members
                .iter()
                .map(|member| build_kind(member, seed, soft_bound))
                .collect();
            Box::new(PortfolioStrategy::new(built))
        }
    }
}
