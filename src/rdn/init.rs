//! Initial label assignment before the first sampling iteration.

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use crate::aggregator::AggregatorRegistry;
use crate::error::{InferError, InferResult};
use crate::graph::{ItemId, RelationalStore};
use crate::rpt::Rpt;

use super::RdnModel;

pub trait InitModule: Send {
    fn name(&self) -> &'static str;

    /// A starting label for every entity of the model's population.
    fn initialize(
        &self,
        model: &RdnModel,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        rng: &mut StdRng,
    ) -> InferResult<BTreeMap<ItemId, String>>;
}

/// Samples each label from the root distribution of the model's own tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootDistributionInit;

impl InitModule for RootDistributionInit {
    fn name(&self) -> &'static str {
        "root_distribution"
    }

    fn initialize(
        &self,
        model: &RdnModel,
        _store: &dyn RelationalStore,
        _registry: &AggregatorRegistry,
        rng: &mut StdRng,
    ) -> InferResult<BTreeMap<ItemId, String>> {
        let root = model.rpt.root().distribution();
        let mut labels = BTreeMap::new();
        for &id in &model.population {
            if let Some(label) = root.sample(rng) {
                labels.insert(id, label.to_string());
            }
        }
        Ok(labels)
    }
}

/// Samples each label from the predictions of a separate, usually
/// non-relational, tree registered under the model's name.
#[derive(Debug, Clone, Default)]
pub struct FromPredictionsInit {
    models: BTreeMap<String, Rpt>,
}

impl FromPredictionsInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, name: impl Into<String>, rpt: Rpt) -> Self {
        self.models.insert(name.into(), rpt);
        self
    }
}

impl InitModule for FromPredictionsInit {
    fn name(&self) -> &'static str {
        "from_predictions"
    }

    fn initialize(
        &self,
        model: &RdnModel,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        rng: &mut StdRng,
    ) -> InferResult<BTreeMap<ItemId, String>> {
        let init = self
            .models
            .get(&model.name)
            .ok_or_else(|| InferError::MissingInitModel {
                model: model.name.clone(),
            })?;
        let predictions = init.apply(store, registry, &model.population)?;
        Ok(predictions.sample_classes(rng))
    }
}
