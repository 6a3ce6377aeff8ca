//! Stopping policies.
//!
//! The builder asks twice per node: once before the split search (only
//! structural limits can apply) and once after the search has been
//! recorded on the state.

use super::state::GrowthState;

pub trait StoppingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the builder should run a significance test on the best split.
    fn requires_significance(&self) -> bool;

    fn should_stop(&self, state: &GrowthState) -> bool;
}

/// Stops at the depth limit, below the minimum instance weight, or when the
/// search found no significant split.
#[derive(Debug, Clone, Copy)]
pub struct DefaultStopping {
    pub max_depth: usize,
    pub min_instances: f64,
}

impl Default for DefaultStopping {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_instances: 2.0,
        }
    }
}

impl StoppingPolicy for DefaultStopping {
    fn name(&self) -> &'static str {
        "default"
    }

    fn requires_significance(&self) -> bool {
        true
    }

    fn should_stop(&self, state: &GrowthState) -> bool {
        state.depth() >= self.max_depth
            || state.total_weight() < self.min_instances
            || (state.searched() && !state.has_significant_split())
    }
}

/// Stops on depth and size only; any non-degenerate split is taken.
#[derive(Debug, Clone, Copy)]
pub struct DepthSizeStopping {
    pub max_depth: usize,
    pub min_instances: f64,
}

impl StoppingPolicy for DepthSizeStopping {
    fn name(&self) -> &'static str {
        "depth_size"
    }

    fn requires_significance(&self) -> bool {
        false
    }

    fn should_stop(&self, state: &GrowthState) -> bool {
        state.depth() >= self.max_depth
            || state.total_weight() < self.min_instances
            || (state.searched() && state.best().is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ItemId;
    use crate::rpt::scoring::ScoreResult;
    use crate::rpt::state::{BestSplit, Instance};

    fn state(n: u64) -> GrowthState {
        let instances = (1..=n)
            .map(|i| Instance {
                id: ItemId::new(i).unwrap(),
                weight: 1.0,
            })
            .collect();
        let labels: Vec<String> = (1..=n).map(|i| (i % 2).to_string()).collect();
        GrowthState::root(instances, &labels, 1)
    }

    fn best() -> BestSplit {
        BestSplit {
            candidate: 0,
            score: ScoreResult {
                statistic: 9.0,
                df: 1,
                p_value: 0.003,
                exact: true,
            },
        }
    }

    #[test]
    fn structural_limits_apply_before_search() {
        let policy = DefaultStopping::default();
        assert!(!policy.should_stop(&state(10)));
        assert!(policy.should_stop(&state(1)));
        let deep = DefaultStopping {
            max_depth: 0,
            min_instances: 2.0,
        };
        assert!(deep.should_stop(&state(10)));
    }

    #[test]
    fn default_requires_a_significant_split() {
        let policy = DefaultStopping::default();
        let mut s = state(10);
        s.record_search(Some(best()), false);
        assert!(policy.should_stop(&s));
        s.record_search(Some(best()), true);
        assert!(!policy.should_stop(&s));
        s.record_search(None, true);
        assert!(policy.should_stop(&s));
    }

    #[test]
    fn depth_size_ignores_significance() {
        let policy = DepthSizeStopping {
            max_depth: 3,
            min_instances: 2.0,
        };
        assert!(!policy.requires_significance());
        let mut s = state(10);
        s.record_search(Some(best()), false);
        assert!(!policy.should_stop(&s));
        s.record_search(None, false);
        assert!(policy.should_stop(&s));
    }
}
