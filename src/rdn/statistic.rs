//! Accumulating post-burn-in samples into empirical distributions.

use std::collections::BTreeMap;

use crate::graph::ItemId;
use crate::predictions::Predictions;

pub trait Statistic: Send {
    fn name(&self) -> &'static str;

    fn is_record_iteration(&self, iteration: usize) -> bool;

    /// Add one sampled label per entity to the model's running distribution.
    fn record(&mut self, model: &str, labels: &BTreeMap<ItemId, String>);

    /// Iterations recorded so far, ascending.
    fn recorded(&self) -> &[usize];

    fn mark_recorded(&mut self, iteration: usize);

    fn predictions(&self) -> BTreeMap<String, Predictions>;
}

/// Records at `burn_in`, then every `skip + 1` iterations.
#[derive(Debug, Clone)]
pub struct DefaultStatistic {
    burn_in: usize,
    skip: usize,
    samples: BTreeMap<String, Predictions>,
    recorded: Vec<usize>,
}

impl DefaultStatistic {
    pub fn new(burn_in: usize, skip: usize) -> Self {
        Self {
            burn_in,
            skip,
            samples: BTreeMap::new(),
            recorded: Vec::new(),
        }
    }

    pub fn burn_in(&self) -> usize {
        self.burn_in
    }

    pub fn skip(&self) -> usize {
        self.skip
    }
}

impl Default for DefaultStatistic {
    fn default() -> Self {
        Self::new(5, 2)
    }
}

impl Statistic for DefaultStatistic {
    fn name(&self) -> &'static str {
        "default"
    }

    fn is_record_iteration(&self, iteration: usize) -> bool {
        iteration >= self.burn_in && (iteration - self.burn_in) % (self.skip + 1) == 0
    }

    fn record(&mut self, model: &str, labels: &BTreeMap<ItemId, String>) {
        let predictions = self.samples.entry(model.to_string()).or_default();
        for (id, label) in labels {
            predictions.add_sample(*id, label);
        }
    }

    fn recorded(&self) -> &[usize] {
        &self.recorded
    }

    fn mark_recorded(&mut self, iteration: usize) {
        self.recorded.push(iteration);
    }

    fn predictions(&self) -> BTreeMap<String, Predictions> {
        self.samples
            .iter()
            .map(|(name, p)| {
                let mut normalized = Predictions::new();
                for (id, dist) in p.iter() {
                    normalized.set(id, dist.normalized());
                }
                (name.clone(), normalized)
            })
            .collect()
    }
}
