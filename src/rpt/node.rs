//! Tree nodes.
//!
//! A node is either a leaf (no split) or internal (a split with exactly two
//! owned children). Every node records the class-label distribution of the
//! instances that reached it, so collapsing a subtree into a leaf never
//! needs the training data again.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distribution::DiscreteDistribution;
use crate::feature::FeatureSetting;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub feature: FeatureSetting,
    /// Instances that pass the feature.
    pub yes: Box<RptNode>,
    /// Instances that fail it, including those with no aggregate value.
    pub no: Box<RptNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RptNode {
    distribution: DiscreteDistribution,
    instance_count: usize,
    depth: usize,
    split: Option<Split>,
}

impl RptNode {
    pub fn leaf(distribution: DiscreteDistribution, instance_count: usize, depth: usize) -> Self {
        Self {
            distribution,
            instance_count,
            depth,
            split: None,
        }
    }

    pub fn internal(
        distribution: DiscreteDistribution,
        instance_count: usize,
        depth: usize,
        feature: FeatureSetting,
        yes: RptNode,
        no: RptNode,
    ) -> Self {
        Self {
            distribution,
            instance_count,
            depth,
            split: Some(Split {
                feature,
                yes: Box::new(yes),
                no: Box::new(no),
            }),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.split.is_none()
    }

    pub fn split(&self) -> Option<&Split> {
        self.split.as_ref()
    }

    pub fn split_feature(&self) -> Option<&FeatureSetting> {
        self.split.as_ref().map(|s| &s.feature)
    }

    pub fn yes_branch(&self) -> Option<&RptNode> {
        self.split.as_ref().map(|s| s.yes.as_ref())
    }

    pub fn no_branch(&self) -> Option<&RptNode> {
        self.split.as_ref().map(|s| s.no.as_ref())
    }

    pub fn distribution(&self) -> &DiscreteDistribution {
        &self.distribution
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Turn this node into a leaf, dropping its subtree.
    pub fn collapse(&mut self) {
        self.split = None;
    }

    /// Redirect every split reading a mapped attribute. Returns the number
    /// of splits changed.
    pub fn rename_attr(&mut self, renames: &BTreeMap<String, String>) -> usize {
        match &mut self.split {
            None => 0,
            Some(s) => {
                usize::from(s.feature.rename_attr(renames))
                    + s.yes.rename_attr(renames)
                    + s.no.rename_attr(renames)
            }
        }
    }

    pub(crate) fn split_mut(&mut self) -> Option<&mut Split> {
        self.split.as_mut()
    }

    pub fn leaf_count(&self) -> usize {
        match &self.split {
            None => 1,
            Some(s) => s.yes.leaf_count() + s.no.leaf_count(),
        }
    }

    pub fn node_count(&self) -> usize {
        match &self.split {
            None => 1,
            Some(s) => 1 + s.yes.node_count() + s.no.node_count(),
        }
    }

    /// Length of the longest root-to-leaf path; a single leaf has height 0.
    pub fn height(&self) -> usize {
        match &self.split {
            None => 0,
            Some(s) => 1 + s.yes.height().max(s.no.height()),
        }
    }

    /// Leaves in pre-order (yes before no).
    pub fn leaves(&self) -> Vec<&RptNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a RptNode>) {
        match &self.split {
            None => out.push(self),
            Some(s) => {
                s.yes.collect_leaves(out);
                s.no.collect_leaves(out);
            }
        }
    }

    /// Split features in pre-order.
    pub fn features(&self) -> Vec<&FeatureSetting> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(s) = &node.split {
                out.push(&s.feature);
                stack.push(&s.no);
                stack.push(&s.yes);
            }
        }
        out
    }

    /// Misclassification cost of predicting this node's majority label for
    /// all of its instances, as a fraction of `total`.
    pub fn node_resub_error(&self, total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        (self.distribution.total() - self.distribution.max_count()) / total
    }

    /// Sum of the leaf errors of the subtree rooted here.
    pub fn tree_resub_error(&self, total: f64) -> f64 {
        match &self.split {
            None => self.node_resub_error(total),
            Some(s) => s.yes.tree_resub_error(total) + s.no.tree_resub_error(total),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match &self.split {
            None => {
                write!(f, "{pad}leaf n={} [", self.instance_count)?;
                for (i, (value, count)) in self.distribution.counts().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}: {count}")?;
                }
                writeln!(f, "]")
            }
            Some(s) => {
                writeln!(f, "{pad}{} (n={})", s.feature, self.instance_count)?;
                writeln!(f, "{pad}  yes:")?;
                s.yes.write_indented(f, indent + 2)?;
                writeln!(f, "{pad}  no:")?;
                s.no.write_indented(f, indent + 2)
            }
        }
    }
}

impl fmt::Display for RptNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
