//! Per-entity predicted label distributions and the metrics over them.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::distribution::DiscreteDistribution;
use crate::error::DataResult;
use crate::graph::{ItemId, RelationalStore};

/// Predicted distributions keyed by entity, with optional true labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    dists: BTreeMap<ItemId, DiscreteDistribution>,
    truth: BTreeMap<ItemId, String>,
}

impl Predictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: ItemId, dist: DiscreteDistribution) {
        self.dists.insert(id, dist);
    }

    pub fn get(&self, id: ItemId) -> Option<&DiscreteDistribution> {
        self.dists.get(&id)
    }

    /// Add one observation of `label` to the entity's distribution.
    pub fn add_sample(&mut self, id: ItemId, label: &str) {
        self.dists.entry(id).or_default().add(label, 1.0);
    }

    /// Add every count of `dist` to the entity's distribution.
    pub fn accumulate(&mut self, id: ItemId, dist: &DiscreteDistribution) {
        self.dists.entry(id).or_default().merge(dist);
    }

    pub fn len(&self) -> usize {
        self.dists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dists.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.dists.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &DiscreteDistribution)> {
        self.dists.iter().map(|(id, d)| (*id, d))
    }

    /// Read true labels for every predicted entity from `attr`.
    ///
    /// Entities without a value are left without a true label.
    pub fn attach_truth(&mut self, store: &dyn RelationalStore, attr: &str) -> DataResult<usize> {
        let mut attached = 0;
        for id in self.dists.keys() {
            if let Some(value) = store.attribute(*id, attr)? {
                self.truth.insert(*id, value.to_string());
                attached += 1;
            }
        }
        Ok(attached)
    }

    pub fn set_true_label(&mut self, id: ItemId, label: impl Into<String>) {
        self.truth.insert(id, label.into());
    }

    pub fn true_label(&self, id: ItemId) -> Option<&str> {
        self.truth.get(&id).map(String::as_str)
    }

    /// The argmax label for `id`; ties go to the smallest label.
    pub fn predicted_label(&self, id: ItemId) -> Option<&str> {
        self.dists.get(&id).and_then(DiscreteDistribution::mode)
    }

    fn labelled(&self) -> impl Iterator<Item = (&DiscreteDistribution, &str)> {
        self.dists
            .iter()
            .filter_map(|(id, d)| self.truth.get(id).map(|t| (d, t.as_str())))
    }

    /// Fraction of labelled entities whose argmax differs from the truth.
    pub fn zero_one_loss(&self) -> Option<f64> {
        let mut total = 0usize;
        let mut wrong = 0usize;
        for (dist, truth) in self.labelled() {
            total += 1;
            if dist.mode() != Some(truth) {
                wrong += 1;
            }
        }
        (total > 0).then(|| wrong as f64 / total as f64)
    }

    /// Mean log probability of the true label.
    ///
    /// Entities whose true label has probability zero are skipped.
    pub fn conditional_log_likelihood(&self) -> Option<f64> {
        let mut sum = 0.0;
        let mut n = 0usize;
        let mut skipped = 0usize;
        for (dist, truth) in self.labelled() {
            let p = dist.probability(truth);
            if p <= 0.0 {
                skipped += 1;
                continue;
            }
            sum += p.ln();
            n += 1;
        }
        if skipped > 0 {
            tracing::warn!(skipped, "true label had zero probability for some entities");
        }
        (n > 0).then(|| sum / n as f64)
    }

    /// Area under the ROC curve for `positive`, with ties given their
    /// average rank.
    ///
    /// `None` unless both positive and negative entities are present.
    pub fn auc(&self, positive: &str) -> Option<f64> {
        let mut scored: Vec<(f64, bool)> = self
            .labelled()
            .map(|(dist, truth)| (dist.probability(positive), truth == positive))
            .collect();
        let positives = scored.iter().filter(|(_, p)| *p).count();
        let negatives = scored.len() - positives;
        if positives == 0 || negatives == 0 {
            return None;
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut rank_sum = 0.0;
        let mut i = 0;
        while i < scored.len() {
            let mut j = i;
            while j + 1 < scored.len() && scored[j + 1].0 == scored[i].0 {
                j += 1;
            }
            // Ranks are 1-based; the tie group i..=j shares their mean.
            let avg_rank = (i + j) as f64 / 2.0 + 1.0;
            rank_sum += avg_rank * scored[i..=j].iter().filter(|(_, p)| *p).count() as f64;
            i = j + 1;
        }
        let p = positives as f64;
        Some((rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
    }

    /// Merge another prediction set in; distributions for shared entities
    /// are summed.
    pub fn merge(&mut self, other: &Predictions) {
        for (id, dist) in &other.dists {
            self.accumulate(*id, dist);
        }
        for (id, truth) in &other.truth {
            self.truth.entry(*id).or_insert_with(|| truth.clone());
        }
    }

    /// Draw one label per entity from its distribution.
    pub fn sample_classes<R: Rng + ?Sized>(&self, rng: &mut R) -> BTreeMap<ItemId, String> {
        self.dists
            .iter()
            .filter_map(|(id, d)| d.sample(rng).map(|v| (*id, v.to_string())))
            .collect()
    }

    /// Per-entity probability differences `self - other`.
    pub fn compare(&self, other: &Predictions) -> PredictionComparison {
        let mut deltas = BTreeMap::new();
        let mut disagreements = 0;
        let mut only_in_one = 0;
        let ids: BTreeSet<ItemId> = self.dists.keys().chain(other.dists.keys()).copied().collect();
        for id in ids {
            let (Some(a), Some(b)) = (self.dists.get(&id), other.dists.get(&id)) else {
                only_in_one += 1;
                continue;
            };
            let labels: BTreeSet<&str> = a.values().chain(b.values()).collect();
            let per_label: BTreeMap<String, f64> = labels
                .into_iter()
                .map(|l| (l.to_string(), a.probability(l) - b.probability(l)))
                .collect();
            if a.mode() != b.mode() {
                disagreements += 1;
            }
            deltas.insert(id, per_label);
        }
        PredictionComparison {
            deltas,
            disagreements,
            only_in_one,
        }
    }
}

/// Result of [`Predictions::compare`].
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionComparison {
    /// For each entity in both sets, probability of each label in the first
    /// set minus the second.
    pub deltas: BTreeMap<ItemId, BTreeMap<String, f64>>,
    /// Entities whose argmax labels differ.
    pub disagreements: usize,
    /// Entities predicted by only one of the two sets.
    pub only_in_one: usize,
}

impl PredictionComparison {
    /// Largest absolute probability difference.
    pub fn max_abs_delta(&self) -> f64 {
        self.deltas
            .values()
            .flat_map(|m| m.values())
            .fold(0.0, |acc, d| acc.max(d.abs()))
    }
}
