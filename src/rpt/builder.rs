//! Depth-first tree induction as a per-node state machine.
//!
//! ```text
//! Evaluating ──► Splitting ──► (two children, each starting at Evaluating)
//!     │
//!     └────────► Leafifying ──► leaf
//! ```
//!
//! Each node evaluation runs in its own storage scope. A stop request is
//! honoured at the next `Evaluating` step by turning the node into a leaf,
//! so the returned tree is always well formed.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::SplitOrder;
use crate::error::LearnResult;
use crate::graph::{RelationalStore, Scope};
use crate::profile::Profiler;
use crate::stop::StopToken;

use super::node::RptNode;
use super::scoring::SplitScorer;
use super::significance::{Resampling, SignificanceTester};
use super::state::{BestSplit, Candidate, GrowthState};
use super::stopping::StoppingPolicy;

/// Where a node is in its construction.
#[derive(Debug)]
pub enum BuildStep {
    Evaluating(GrowthState),
    /// Split on the pool candidate at this index.
    Splitting(GrowthState, usize),
    Leafifying(GrowthState),
}

pub struct TreeBuilder<'a> {
    store: &'a dyn RelationalStore,
    scorer: &'a dyn SplitScorer,
    significance: &'a dyn SignificanceTester,
    stopping: &'a dyn StoppingPolicy,
    stop: StopToken,
    order: SplitOrder,
    rng: StdRng,
    profiler: Profiler,
    nodes: usize,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        store: &'a dyn RelationalStore,
        scorer: &'a dyn SplitScorer,
        significance: &'a dyn SignificanceTester,
        stopping: &'a dyn StoppingPolicy,
    ) -> Self {
        Self {
            store,
            scorer,
            significance,
            stopping,
            stop: StopToken::new(),
            order: SplitOrder::Deterministic,
            rng: StdRng::seed_from_u64(0),
            profiler: Profiler::new(),
            nodes: 0,
        }
    }

    pub fn with_order(mut self, order: SplitOrder, seed: u64) -> Self {
        self.order = order;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn into_profiler(self) -> Profiler {
        self.profiler
    }

    /// Number of nodes built so far.
    pub fn nodes_built(&self) -> usize {
        self.nodes
    }

    /// Grow a tree from `root` over the candidate `pool`.
    pub fn build(&mut self, pool: &[Candidate], root: GrowthState) -> LearnResult<RptNode> {
        let mut step = BuildStep::Evaluating(root);
        loop {
            step = match step {
                BuildStep::Evaluating(state) => self.evaluate(pool, state)?,
                BuildStep::Splitting(state, chosen) => {
                    let candidate = &pool[chosen];
                    tracing::debug!(
                        depth = state.depth(),
                        instances = state.instance_count(),
                        feature = %candidate.feature,
                        "splitting node"
                    );
                    let (yes, no) = state.partition(&candidate.vector, chosen);
                    let yes = self.build(pool, yes)?;
                    let no = self.build(pool, no)?;
                    self.nodes += 1;
                    return Ok(RptNode::internal(
                        state.distribution(),
                        state.instance_count(),
                        state.depth(),
                        candidate.feature.clone(),
                        yes,
                        no,
                    ));
                }
                BuildStep::Leafifying(state) => {
                    self.nodes += 1;
                    return Ok(RptNode::leaf(
                        state.distribution(),
                        state.instance_count(),
                        state.depth(),
                    ));
                }
            };
        }
    }

    fn evaluate(&mut self, pool: &[Candidate], mut state: GrowthState) -> LearnResult<BuildStep> {
        if self.stop.is_stopped() {
            tracing::info!(depth = state.depth(), "stop requested, closing node as leaf");
            return Ok(BuildStep::Leafifying(state));
        }
        if self.stopping.should_stop(&state) {
            return Ok(BuildStep::Leafifying(state));
        }
        let scope = Scope::open(self.store)?;

        let mut order: Vec<usize> = state.candidates().to_vec();
        if self.order == SplitOrder::Shuffled {
            order.shuffle(&mut self.rng);
        }

        self.profiler.start_call("score")?;
        let mut best: Option<BestSplit> = None;
        for idx in order {
            let candidate = &pool[idx];
            let key = candidate.feature.key();
            let score = match state.cached_score(&key) {
                Some(cached) => *cached,
                None => {
                    let prior = best.as_ref().map(|b| &b.score);
                    let score = self
                        .scorer
                        .score(&state, state.labels(), &candidate.vector, prior);
                    if score.exact {
                        state.cache_score(key, score);
                    }
                    score
                }
            };
            if !score.is_degenerate() && score.is_better_than(best.as_ref().map(|b| &b.score)) {
                best = Some(BestSplit {
                    candidate: idx,
                    score,
                });
            }
        }
        self.profiler.end_call("score")?;

        let significant = match &best {
            None => false,
            Some(b) if self.stopping.requires_significance() => {
                self.profiler.start_call("significance")?;
                let mut ctx = Resampling {
                    store: self.store,
                    scorer: self.scorer,
                    pool,
                    rng: &mut self.rng,
                };
                let verdict = self.significance.is_significant(&state, &b.score, &mut ctx);
                self.profiler.end_call("significance")?;
                verdict?
            }
            Some(_) => true,
        };
        let chosen = best.as_ref().map(|b| b.candidate);
        state.record_search(best, significant);
        scope.close()?;

        match chosen {
            Some(idx) if !self.stopping.should_stop(&state) => Ok(BuildStep::Splitting(state, idx)),
            _ => Ok(BuildStep::Leafifying(state)),
        }
    }
}
