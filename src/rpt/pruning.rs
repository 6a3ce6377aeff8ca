//! Cost-complexity (weakest-link) pruning.
//!
//! For an internal node `t` over a training set of total weight `n`:
//!
//! ```text
//! alpha(t) = (R(t) - R(T_t)) / (|leaves(T_t)| - 1)
//! ```
//!
//! where `R(t)` is the resubstitution error of `t` collapsed to a leaf and
//! `R(T_t)` that of the subtree rooted at `t`, both divided by `n`.
//!
//! Pruning never edits a tree in place. Every step deep-copies its input and
//! collapses nodes in the copy, so the caller's tree and every earlier
//! element of a pruning sequence stay intact.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{LearnError, LearnResult};
use crate::feature::FeatureCache;
use crate::graph::ItemId;
use crate::predictions::Predictions;

use super::node::RptNode;
use super::{LearningTask, Rpt, RptLearner};

/// Tolerance for comparing resubstitution errors and alphas.
const EPS: f64 = 1e-12;

/// One element of a pruning sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PruningRptNode {
    root: RptNode,
    alpha: f64,
}

impl PruningRptNode {
    pub fn new(root: RptNode, alpha: f64) -> Self {
        Self { root, alpha }
    }

    pub fn root(&self) -> &RptNode {
        &self.root
    }

    pub fn into_root(self) -> RptNode {
        self.root
    }

    /// The complexity parameter at which this tree becomes optimal.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    pub fn tree_resub_error(&self) -> f64 {
        self.root.tree_resub_error(self.root.distribution().total())
    }

    pub fn node_resub_error(&self) -> f64 {
        self.root.node_resub_error(self.root.distribution().total())
    }
}

/// Weakest-link coefficient of `node`; infinite for leaves.
pub fn alpha(node: &RptNode, total: f64) -> f64 {
    let leaves = node.leaf_count();
    if leaves <= 1 {
        return f64::INFINITY;
    }
    (node.node_resub_error(total) - node.tree_resub_error(total)) / (leaves - 1) as f64
}

/// The smallest subtree of `tree` with the same resubstitution error.
///
/// Collapses, bottom-up, every node whose two leaf children misclassify
/// exactly as much as the node would on its own.
pub fn get_t1(tree: &RptNode) -> RptNode {
    let total = tree.distribution().total();
    let mut t1 = tree.clone();
    collapse_redundant(&mut t1, total);
    t1
}

fn collapse_redundant(node: &mut RptNode, total: f64) {
    let Some(split) = node.split_mut() else {
        return;
    };
    collapse_redundant(&mut split.yes, total);
    collapse_redundant(&mut split.no, total);
    if !(split.yes.is_leaf() && split.no.is_leaf()) {
        return;
    }
    let children = split.yes.node_resub_error(total) + split.no.node_resub_error(total);
    if (children - node.node_resub_error(total)).abs() <= EPS {
        node.collapse();
    }
}

fn min_alpha(node: &RptNode, total: f64) -> Option<f64> {
    let split = node.split()?;
    let here = alpha(node, total);
    [min_alpha(&split.yes, total), min_alpha(&split.no, total)]
        .into_iter()
        .flatten()
        .fold(Some(here), |acc, a| acc.map(|m| m.min(a)))
}

fn collapse_at(node: &mut RptNode, total: f64, target: f64) {
    if node.is_leaf() {
        return;
    }
    if alpha(node, total) <= target + EPS {
        node.collapse();
        return;
    }
    if let Some(split) = node.split_mut() {
        collapse_at(&mut split.yes, total, target);
        collapse_at(&mut split.no, total, target);
    }
}

/// Collapse the internal node(s) with the smallest alpha in a copy of `tree`.
///
/// Nodes tied at the minimum are collapsed together, in pre-order; a node
/// collapsed this way takes its tied descendants with it. Returns `None`
/// when `tree` is already a leaf.
pub fn find_and_remove_weakest_link(tree: &RptNode, total: f64) -> Option<(RptNode, f64)> {
    let weakest = min_alpha(tree, total)?;
    let mut pruned = tree.clone();
    collapse_at(&mut pruned, total, weakest);
    Some((pruned, weakest))
}

/// Nested subtrees from T1 down to the root leaf, with strictly increasing
/// alpha and strictly decreasing leaf count.
pub fn get_pruning_sequence(tree: &RptNode) -> Vec<PruningRptNode> {
    let total = tree.distribution().total();
    let mut sequence = vec![PruningRptNode::new(get_t1(tree), 0.0)];
    loop {
        let Some(last) = sequence.last() else {
            break;
        };
        let Some((next, a)) = find_and_remove_weakest_link(&last.root, total) else {
            break;
        };
        // Collapsing can lower an ancestor's alpha below the previous step's;
        // such a step replaces the previous element rather than extending.
        if sequence.len() > 1 && a <= last.alpha + EPS {
            let alpha = last.alpha;
            sequence.pop();
            sequence.push(PruningRptNode::new(next, alpha));
        } else {
            sequence.push(PruningRptNode::new(next, a));
        }
    }
    tracing::debug!(
        length = sequence.len(),
        alphas = ?sequence.iter().map(PruningRptNode::alpha).collect::<Vec<_>>(),
        "pruning sequence"
    );
    sequence
}

/// Chooses one tree from a pruning sequence.
pub trait TreeSelection {
    fn name(&self) -> &'static str;

    /// Index into `sequence` of the selected tree.
    fn select(
        &self,
        learner: &RptLearner<'_>,
        task: &LearningTask,
        tree: &Rpt,
        sequence: &[PruningRptNode],
    ) -> LearnResult<usize>;
}

/// Index of the lowest loss. Ties go to the later, smaller tree.
fn pick_lowest(losses: &[f64]) -> usize {
    let mut best = 0;
    for (i, loss) in losses.iter().enumerate() {
        if *loss <= losses[best] + EPS {
            best = i;
        }
    }
    best
}

/// Scores every tree on a held-out population by zero-one loss.
///
/// Ties go to the tree with fewer leaves.
#[derive(Debug, Clone)]
pub struct TestSampleSelection {
    pub population: Vec<ItemId>,
}

impl TreeSelection for TestSampleSelection {
    fn name(&self) -> &'static str {
        "test_sample"
    }

    fn select(
        &self,
        learner: &RptLearner<'_>,
        task: &LearningTask,
        tree: &Rpt,
        sequence: &[PruningRptNode],
    ) -> LearnResult<usize> {
        if sequence.is_empty() {
            return Err(LearnError::EmptySequence);
        }
        if self.population.is_empty() {
            return Err(LearnError::EmptyPopulation {
                item_kind: task.class_label.item_kind.clone(),
                attr: task.class_label.attr.clone(),
            });
        }
        let mut cache = FeatureCache::new(self.population.clone());
        let mut losses = Vec::with_capacity(sequence.len());
        for candidate in sequence {
            let rpt = tree.with_root(candidate.root.clone());
            let mut predictions = rpt.predict(learner.store(), learner.registry(), &mut cache)?;
            predictions.attach_truth(learner.store(), &task.class_label.attr)?;
            losses.push(predictions.zero_one_loss().unwrap_or(1.0));
        }
        let chosen = pick_lowest(&losses);
        tracing::info!(chosen, loss = losses[chosen], "selected tree on test sample");
        Ok(chosen)
    }
}

/// k-fold cross-validation over the training population.
///
/// Each fold grows its own tree and pruning sequence. Main-sequence tree `i`
/// is matched in each fold to the first tree whose alpha reaches the
/// geometric midpoint of alphas `i` and `i + 1`.
#[derive(Debug, Clone, Copy)]
pub struct CrossValidationSelection {
    pub folds: usize,
    pub seed: u64,
}

impl CrossValidationSelection {
    fn split_folds(&self, population: &[ItemId]) -> Vec<Vec<ItemId>> {
        let mut shuffled = population.to_vec();
        shuffled.shuffle(&mut StdRng::seed_from_u64(self.seed));
        let mut folds = vec![Vec::new(); self.folds];
        for (i, id) in shuffled.into_iter().enumerate() {
            folds[i % self.folds].push(id);
        }
        folds
    }
}

impl TreeSelection for CrossValidationSelection {
    fn name(&self) -> &'static str {
        "cross_validation"
    }

    fn select(
        &self,
        learner: &RptLearner<'_>,
        task: &LearningTask,
        tree: &Rpt,
        sequence: &[PruningRptNode],
    ) -> LearnResult<usize> {
        if sequence.is_empty() {
            return Err(LearnError::EmptySequence);
        }
        let n = task.population.len();
        if self.folds < 2 || self.folds > n {
            return Err(LearnError::InvalidFolds {
                folds: self.folds,
                population: n,
            });
        }
        let targets: Vec<f64> = (0..sequence.len())
            .map(|i| match sequence.get(i + 1) {
                Some(next) => (sequence[i].alpha * next.alpha).sqrt(),
                None => f64::INFINITY,
            })
            .collect();

        let folds = self.split_folds(&task.population);
        let mut pooled = vec![Predictions::new(); sequence.len()];
        for (k, test) in folds.iter().enumerate() {
            let train: Vec<ItemId> = folds
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != k)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            let fold_tree = learner.learn(&task.with_population(train))?;
            let fold_sequence = get_pruning_sequence(fold_tree.root());
            tracing::debug!(fold = k, length = fold_sequence.len(), "fold pruning sequence");
            let Some(fallback) = fold_sequence.last() else {
                return Err(LearnError::EmptySequence);
            };

            let mut cache = FeatureCache::new(test.clone());
            for (i, target) in targets.iter().enumerate() {
                let matched = fold_sequence
                    .iter()
                    .find(|t| t.alpha >= *target)
                    .unwrap_or(fallback);
                let rpt = tree.with_root(matched.root.clone());
                let mut predictions =
                    rpt.predict(learner.store(), learner.registry(), &mut cache)?;
                predictions.attach_truth(learner.store(), &task.class_label.attr)?;
                pooled[i].merge(&predictions);
            }
        }

        let losses: Vec<f64> = pooled
            .iter()
            .map(|p| p.zero_one_loss().unwrap_or(1.0))
            .collect();
        let chosen = pick_lowest(&losses);
        tracing::info!(
            chosen,
            folds = self.folds,
            loss = losses[chosen],
            "selected tree by cross-validation"
        );
        Ok(chosen)
    }
}

/// Prune `tree` to the member of its pruning sequence chosen by `selection`.
///
/// A tree that is already a single leaf is returned unchanged.
pub fn prune(
    tree: &Rpt,
    selection: &dyn TreeSelection,
    learner: &RptLearner<'_>,
    task: &LearningTask,
) -> LearnResult<Rpt> {
    if tree.root().is_leaf() {
        return Ok(tree.clone());
    }
    let mut sequence = get_pruning_sequence(tree.root());
    let chosen = selection.select(learner, task, tree, &sequence)?;
    if chosen >= sequence.len() {
        return Err(LearnError::EmptySequence);
    }
    let picked = sequence.swap_remove(chosen);
    tracing::info!(
        selection = selection.name(),
        leaves_before = tree.leaf_count(),
        leaves_after = picked.leaf_count(),
        alpha = picked.alpha,
        "pruned tree"
    );
    Ok(tree.with_root(picked.into_root()))
}
