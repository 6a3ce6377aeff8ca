//! Per-node growth state threaded through induction.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::distribution::DiscreteDistribution;
use crate::feature::{FeatureSetting, FeatureVector};
use crate::graph::ItemId;

use super::scoring::ScoreResult;

/// A training instance and its weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instance {
    pub id: ItemId,
    pub weight: f64,
}

/// A candidate feature with its precomputed vector over the training population.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub feature: FeatureSetting,
    pub vector: Arc<FeatureVector>,
}

/// The best split found at a node.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSplit {
    /// Index into the candidate pool.
    pub candidate: usize,
    pub score: ScoreResult,
}

/// Context for one node: the instances reaching it, their labels, the
/// candidates still available, and what the search found.
///
/// Created when a node begins evaluation and consumed when it splits or
/// becomes a leaf.
#[derive(Debug, Clone)]
pub struct GrowthState {
    depth: usize,
    instances: Vec<Instance>,
    /// Label of each instance, as an index into `class_values`.
    labels: Vec<usize>,
    class_values: Arc<[String]>,
    /// Indices into the candidate pool; never grows down the tree.
    candidates: Vec<usize>,
    score_cache: HashMap<String, ScoreResult>,
    best: Option<BestSplit>,
    significant: Option<bool>,
}

impl GrowthState {
    /// The root state. `labels` is aligned with `instances`.
    pub fn root(instances: Vec<Instance>, labels: &[String], pool_size: usize) -> Self {
        let mut values: Vec<String> = labels.to_vec();
        values.sort();
        values.dedup();
        let class_values: Arc<[String]> = values.into();
        let labels = labels
            .iter()
            .map(|l| class_values.binary_search(l).unwrap_or(0))
            .collect();
        Self {
            depth: 0,
            instances,
            labels,
            class_values,
            candidates: (0..pool_size).collect(),
            score_cache: HashMap::new(),
            best: None,
            significant: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.instances.iter().map(|i| i.weight).sum()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn class_values(&self) -> &[String] {
        &self.class_values
    }

    pub fn candidates(&self) -> &[usize] {
        &self.candidates
    }

    /// Weighted label distribution of the instances at this node.
    pub fn distribution(&self) -> DiscreteDistribution {
        let mut dist = DiscreteDistribution::new();
        for (instance, label) in self.instances.iter().zip(&self.labels) {
            dist.add(self.class_values[*label].clone(), instance.weight);
        }
        dist
    }

    /// Number of distinct labels present at this node.
    pub fn label_count(&self) -> usize {
        let mut seen = vec![false; self.class_values.len()];
        for l in &self.labels {
            seen[*l] = true;
        }
        seen.into_iter().filter(|s| *s).count()
    }

    /// The label column randomly permuted over the same instances.
    pub fn permuted_labels<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut labels = self.labels.clone();
        labels.shuffle(rng);
        labels
    }

    pub fn cached_score(&self, key: &str) -> Option<&ScoreResult> {
        self.score_cache.get(key)
    }

    pub fn cache_score(&mut self, key: String, score: ScoreResult) {
        self.score_cache.insert(key, score);
    }

    pub fn best(&self) -> Option<&BestSplit> {
        self.best.as_ref()
    }

    /// Whether the split search has run at this node.
    pub fn searched(&self) -> bool {
        self.significant.is_some()
    }

    /// Whether the search found a split and it was judged significant.
    pub fn has_significant_split(&self) -> bool {
        self.best.is_some() && self.significant == Some(true)
    }

    pub fn record_search(&mut self, best: Option<BestSplit>, significant: bool) {
        self.best = best;
        self.significant = Some(significant);
    }

    /// Partition into (yes, no) child states by a feature vector. The
    /// used candidate is removed from both children.
    pub fn partition(&self, vector: &FeatureVector, used: usize) -> (GrowthState, GrowthState) {
        let candidates: Vec<usize> = self
            .candidates
            .iter()
            .copied()
            .filter(|c| *c != used)
            .collect();
        let mut yes = self.child(candidates.clone());
        let mut no = self.child(candidates);
        for (instance, label) in self.instances.iter().zip(&self.labels) {
            let side = if vector.passes(instance.id) {
                &mut yes
            } else {
                &mut no
            };
            side.instances.push(*instance);
            side.labels.push(*label);
        }
        (yes, no)
    }

    fn child(&self, candidates: Vec<usize>) -> GrowthState {
        GrowthState {
            depth: self.depth + 1,
            instances: Vec::new(),
            labels: Vec::new(),
            class_values: Arc::clone(&self.class_values),
            candidates,
            score_cache: HashMap::new(),
            best: None,
            significant: None,
        }
    }
}
