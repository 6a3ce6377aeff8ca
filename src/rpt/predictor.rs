//! Applying a tree to a population.

use crate::aggregator::AggregatorRegistry;
use crate::error::LearnResult;
use crate::feature::FeatureCache;
use crate::graph::{ItemId, RelationalStore, Scope};
use crate::predictions::Predictions;

use super::Rpt;
use super::node::RptNode;

impl Rpt {
    /// Predict a label distribution for every entity of `population`.
    pub fn apply(
        &self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        population: &[ItemId],
    ) -> LearnResult<Predictions> {
        let mut cache = FeatureCache::new(population.to_vec());
        self.predict(store, registry, &mut cache)
    }

    /// Predict over the cache's population, reusing any vectors it holds.
    ///
    /// Collective inference keeps one cache per model across iterations and
    /// only invalidates what the last write touched.
    pub fn predict(
        &self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        cache: &mut FeatureCache,
    ) -> LearnResult<Predictions> {
        let scope = Scope::open(store)?;
        let mut predictions = Predictions::new();
        let population = cache.population().to_vec();
        for id in population {
            let leaf = self.leaf_for(store, registry, cache, id)?;
            predictions.set(id, leaf.distribution().normalized());
        }
        scope.close()?;
        Ok(predictions)
    }

    /// The leaf `id` reaches, following yes/no branches by feature value.
    pub fn leaf_for(
        &self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        cache: &mut FeatureCache,
        id: ItemId,
    ) -> LearnResult<&RptNode> {
        let mut node = self.root();
        while let Some(split) = node.split() {
            let vector = cache.vector(store, registry, &split.feature)?;
            node = if vector.passes(id) {
                split.yes.as_ref()
            } else {
                split.no.as_ref()
            };
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearnerConfig;
    use crate::distribution::DiscreteDistribution;
    use crate::feature::{CompareOp, FeatureSetting, ValueFilter};
    use crate::graph::index::GraphStore;
    use crate::graph::Value;
    use crate::source::ClassLabel;

    fn id(raw: u64) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    fn tree() -> Rpt {
        let feature = FeatureSetting::new(
            "[<acted_in:actor].famous".parse().unwrap(),
            "count",
            Some(ValueFilter::eq("y".into())),
            CompareOp::Ge,
            Value::Num(1.0),
        )
        .unwrap();
        let root = RptNode::internal(
            DiscreteDistribution::from_counts([("drama", 5.0), ("comedy", 5.0)]),
            10,
            0,
            feature,
            RptNode::leaf(
                DiscreteDistribution::from_counts([("drama", 4.0), ("comedy", 1.0)]),
                5,
                1,
            ),
            RptNode::leaf(
                DiscreteDistribution::from_counts([("drama", 1.0), ("comedy", 4.0)]),
                5,
                1,
            ),
        );
        Rpt::new(root, ClassLabel::new("movie", "genre"), LearnerConfig::default())
    }

    fn store() -> GraphStore {
        let store = GraphStore::new();
        store.add_item(id(1), "movie").unwrap();
        store.add_item(id(2), "movie").unwrap();
        store.add_item(id(3), "movie").unwrap();
        store.add_item(id(10), "actor").unwrap();
        store.add_item(id(11), "actor").unwrap();
        store.set_attribute(id(10), "famous", "y".into()).unwrap();
        store.set_attribute(id(11), "famous", "n".into()).unwrap();
        store.add_link(id(10), id(1), "acted_in").unwrap();
        store.add_link(id(11), id(2), "acted_in").unwrap();
        store
    }

    #[test]
    fn routes_entities_to_leaves() {
        let store = store();
        let registry = AggregatorRegistry::standard();
        let predictions = tree().apply(&store, &registry, &[id(1), id(2), id(3)]).unwrap();
        assert!((predictions.get(id(1)).unwrap().probability("drama") - 0.8).abs() < 1e-12);
        assert!((predictions.get(id(2)).unwrap().probability("drama") - 0.2).abs() < 1e-12);
        // No actors at all: the count is zero, so the test fails.
        assert_eq!(predictions.predicted_label(id(3)), Some("comedy"));
        assert_eq!(store.open_scope_count(), 0);
    }

    #[test]
    fn distributions_sum_to_one() {
        let store = store();
        let registry = AggregatorRegistry::standard();
        let predictions = tree().apply(&store, &registry, &[id(1), id(2), id(3)]).unwrap();
        for (_, dist) in predictions.iter() {
            let sum: f64 = dist.counts().values().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }
}
