//! Significance tests for the best split at a node.

use rand::rngs::StdRng;

use crate::error::LearnResult;
use crate::graph::{RelationalStore, Scope};

use super::scoring::{ScoreResult, SplitScorer};
use super::state::{Candidate, GrowthState};

/// What a significance test may use beyond the node and its best score.
pub struct Resampling<'a> {
    pub store: &'a dyn RelationalStore,
    pub scorer: &'a dyn SplitScorer,
    pub pool: &'a [Candidate],
    pub rng: &'a mut StdRng,
}

pub trait SignificanceTester: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_significant(
        &self,
        state: &GrowthState,
        score: &ScoreResult,
        ctx: &mut Resampling<'_>,
    ) -> LearnResult<bool>;
}

/// Accepts scores whose p-value is below a threshold.
#[derive(Debug, Clone, Copy)]
pub struct ParametricTester {
    pub threshold: f64,
}

impl ParametricTester {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn accepts(&self, score: &ScoreResult) -> bool {
        !score.is_degenerate() && score.p_value < self.threshold
    }
}

impl Default for ParametricTester {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl SignificanceTester for ParametricTester {
    fn name(&self) -> &'static str {
        "parametric"
    }

    fn is_significant(
        &self,
        _state: &GrowthState,
        score: &ScoreResult,
        _ctx: &mut Resampling<'_>,
    ) -> LearnResult<bool> {
        Ok(self.accepts(score))
    }
}

/// Permutation test over the whole candidate search.
///
/// Requires parametric significance first. Each trial permutes the node's
/// label column, re-runs the search over every live candidate, and counts
/// the trial if its best score beats the original. The split is rejected as
/// soon as `count > samples - samples * threshold`.
#[derive(Debug, Clone, Copy)]
pub struct RandomizationTester {
    pub parametric: ParametricTester,
    pub samples: usize,
    pub threshold: f64,
}

impl RandomizationTester {
    pub fn new(p_value: f64, samples: usize, threshold: f64) -> Self {
        Self {
            parametric: ParametricTester::new(p_value),
            samples,
            threshold,
        }
    }

    fn best_permuted(
        &self,
        state: &GrowthState,
        labels: &[usize],
        ctx: &Resampling<'_>,
    ) -> Option<ScoreResult> {
        let mut best: Option<ScoreResult> = None;
        for &idx in state.candidates() {
            let candidate = &ctx.pool[idx];
            // Degeneracy is invariant under label permutation.
            if state
                .cached_score(&candidate.feature.key())
                .is_some_and(ScoreResult::is_degenerate)
            {
                continue;
            }
            let score = ctx
                .scorer
                .score(state, labels, &candidate.vector, best.as_ref());
            if !score.is_degenerate() && score.is_better_than(best.as_ref()) {
                best = Some(score);
            }
        }
        best
    }
}

impl Default for RandomizationTester {
    fn default() -> Self {
        Self::new(0.05, 50, 0.9)
    }
}

impl SignificanceTester for RandomizationTester {
    fn name(&self) -> &'static str {
        "randomization"
    }

    fn is_significant(
        &self,
        state: &GrowthState,
        score: &ScoreResult,
        ctx: &mut Resampling<'_>,
    ) -> LearnResult<bool> {
        if !self.parametric.accepts(score) {
            return Ok(false);
        }
        let n = self.samples as f64;
        let limit = n - n * self.threshold;
        let mut better = 0usize;
        for trial in 0..self.samples {
            let scope = Scope::open(ctx.store)?;
            let permuted = state.permuted_labels(&mut *ctx.rng);
            if self
                .best_permuted(state, &permuted, ctx)
                .is_some_and(|b| b.is_better_than(Some(score)))
            {
                better += 1;
            }
            scope.close()?;
            if better as f64 > limit {
                tracing::debug!(trial, better, "randomization test rejected split");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rand::{Rng, SeedableRng};

    use crate::feature::{CompareOp, FeatureSetting, FeatureVector};
    use crate::graph::index::GraphStore;
    use crate::graph::{ItemId, Value};
    use crate::rpt::scoring::ChiSquareScorer;
    use crate::rpt::state::Instance;

    fn id(raw: u64) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    fn candidate(name: &str, passing: impl IntoIterator<Item = u64>) -> Candidate {
        Candidate {
            feature: FeatureSetting::new(
                format!("[self].{name}").parse().unwrap(),
                "nop",
                None,
                CompareOp::Eq,
                Value::from("y"),
            )
            .unwrap(),
            vector: Arc::new(FeatureVector::from_passing(passing.into_iter().map(id), 40)),
        }
    }

    fn state(pool: usize) -> GrowthState {
        let instances = (1..=40).map(|i| Instance { id: id(i), weight: 1.0 }).collect();
        let labels: Vec<String> = (1..=40)
            .map(|i| if i <= 20 { "a".into() } else { "b".into() })
            .collect();
        GrowthState::root(instances, &labels, pool)
    }

    #[test]
    fn randomization_rejects_when_parametric_rejects() {
        let store = GraphStore::new();
        let pool = vec![candidate("x", 1..=20)];
        let state = state(1);
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = Resampling {
            store: &store,
            scorer: &ChiSquareScorer,
            pool: &pool,
            rng: &mut rng,
        };
        let weak = ScoreResult {
            statistic: 1.0,
            df: 1,
            p_value: 0.3,
            exact: true,
        };
        let tester = RandomizationTester::default();
        assert!(!tester.is_significant(&state, &weak, &mut ctx).unwrap());
        // No permutation trial ran.
        assert_eq!(store.scopes_opened(), 0);
    }

    #[test]
    fn strong_split_survives_permutation() {
        let store = GraphStore::new();
        let pool = vec![candidate("x", 1..=20), candidate("z", (1..=40).step_by(2))];
        let state = state(2);
        let best = ChiSquareScorer.score(&state, state.labels(), &pool[0].vector, None);
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = Resampling {
            store: &store,
            scorer: &ChiSquareScorer,
            pool: &pool,
            rng: &mut rng,
        };
        let tester = RandomizationTester::default();
        assert!(tester.is_significant(&state, &best, &mut ctx).unwrap());
        assert_eq!(store.scopes_opened(), 50);
        assert_eq!(store.open_scope_count(), 0);
    }

    #[test]
    fn search_artifact_is_rejected_early() {
        // Thirty unrelated random features: under permuted labels the best
        // of them usually beats a marginal original score.
        let store = GraphStore::new();
        let mut gen_rng = StdRng::seed_from_u64(99);
        let pool: Vec<Candidate> = (0..30)
            .map(|k| {
                let passing: Vec<u64> = (1..=40).filter(|_| gen_rng.gen_bool(0.5)).collect();
                candidate(&format!("r{k}"), passing)
            })
            .collect();
        let state = state(pool.len());
        let marginal = ScoreResult {
            statistic: 4.0,
            df: 1,
            p_value: 0.045,
            exact: true,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut ctx = Resampling {
            store: &store,
            scorer: &ChiSquareScorer,
            pool: &pool,
            rng: &mut rng,
        };
        let tester = RandomizationTester::new(0.05, 50, 0.9);
        assert!(!tester.is_significant(&state, &marginal, &mut ctx).unwrap());
        assert!(store.scopes_opened() < 50);
        assert_eq!(store.open_scope_count(), 0);
    }

    /// Beats any score on its first `wins` calls, then loses.
    struct ScriptedScorer {
        wins: usize,
        calls: AtomicUsize,
    }

    impl SplitScorer for ScriptedScorer {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn score(
            &self,
            _state: &GrowthState,
            _labels: &[usize],
            _feature: &FeatureVector,
            _prior: Option<&ScoreResult>,
        ) -> ScoreResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let p_value = if call < self.wins { 1e-6 } else { 0.5 };
            ScoreResult {
                statistic: 1.0,
                df: 1,
                p_value,
                exact: true,
            }
        }
    }

    fn scripted_trials(wins: usize) -> (bool, u64) {
        let store = GraphStore::new();
        let pool = vec![candidate("x", 1..=20)];
        let state = state(1);
        let scorer = ScriptedScorer {
            wins,
            calls: AtomicUsize::new(0),
        };
        let mut rng = StdRng::seed_from_u64(11);
        let mut ctx = Resampling {
            store: &store,
            scorer: &scorer,
            pool: &pool,
            rng: &mut rng,
        };
        let original = ScoreResult {
            statistic: 10.0,
            df: 1,
            p_value: 0.001,
            exact: true,
        };
        let significant = RandomizationTester::default()
            .is_significant(&state, &original, &mut ctx)
            .unwrap();
        (significant, store.scopes_opened())
    }

    #[test]
    fn five_better_permutations_of_fifty_still_accept() {
        assert_eq!(scripted_trials(5), (true, 50));
    }

    #[test]
    fn sixth_better_permutation_rejects_immediately() {
        assert_eq!(scripted_trials(6), (false, 6));
    }

    #[test]
    fn parametric_threshold() {
        let tester = ParametricTester::default();
        let mut s = ScoreResult {
            statistic: 5.0,
            df: 1,
            p_value: 0.049,
            exact: true,
        };
        assert!(tester.accepts(&s));
        s.p_value = 0.05;
        assert!(!tester.accepts(&s));
        assert!(!tester.accepts(&ScoreResult::degenerate()));
    }
}
