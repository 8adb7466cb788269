//! Tuning knobs of a cross-match session.

use crate::errors::{CrossmatchError, CrossmatchResult};

/// Default bound on pages walked through right links for one logical node.
pub const DEFAULT_MAX_SIBLING_CHAIN: usize = 4096;

/// Order in which pending page pairs are taken off the frontier.
///
/// Only the memory and latency shape of a session depends on it; the result
/// set is the same either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontierOrder {
    /// Newest pair first. Keeps the frontier narrow and yields results early.
    #[default]
    DepthFirst,
    /// Oldest pair first. Finishes each level before descending.
    BreadthFirst,
}

/// How entries of two pages are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingStrategy {
    /// Tests every entry against every entry.
    #[default]
    NestedLoop,
    /// Sorts both sides by the lower bound of the first dimension and sweeps.
    PlaneSweep,
}

/// Configuration of a [`CrossmatchSession`](crate::CrossmatchSession).
///
/// # Examples
///
/// ```rust
/// use spatial_crossmatch::{CrossmatchConfig, FrontierOrder, PairingStrategy};
///
/// let config = CrossmatchConfig::new()
///     .with_frontier_order(FrontierOrder::BreadthFirst)
///     .with_pairing(PairingStrategy::PlaneSweep);
/// assert_eq!(config.pairing(), PairingStrategy::PlaneSweep);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossmatchConfig {
    frontier_order: FrontierOrder,
    pairing: PairingStrategy,
    max_sibling_chain: usize,
}

impl Default for CrossmatchConfig {
    fn default() -> Self {
        Self {
            frontier_order: FrontierOrder::default(),
            pairing: PairingStrategy::default(),
            max_sibling_chain: DEFAULT_MAX_SIBLING_CHAIN,
        }
    }
}

impl CrossmatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn frontier_order(&self) -> FrontierOrder {
        self.frontier_order
    }

    #[inline]
    pub fn pairing(&self) -> PairingStrategy {
        self.pairing
    }

    #[inline]
    pub fn max_sibling_chain(&self) -> usize {
        self.max_sibling_chain
    }

    pub fn with_frontier_order(mut self, order: FrontierOrder) -> Self {
        self.frontier_order = order;
        self
    }

    pub fn with_pairing(mut self, pairing: PairingStrategy) -> Self {
        self.pairing = pairing;
        self
    }

    /// Sets how many right siblings may be chained behind one page before
    /// the chain is reported as corrupt.
    pub fn with_max_sibling_chain(mut self, max_sibling_chain: usize) -> Self {
        self.max_sibling_chain = max_sibling_chain;
        self
    }

    pub(crate) fn validate(&self) -> CrossmatchResult<()> {
        if self.max_sibling_chain == 0 {
            return Err(CrossmatchError::InvalidOperation(
                "max_sibling_chain must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
