//! Relational probability trees.
//!
//! [`RptLearner`] grows a tree over a labelled population:
//!
//! 1. read the class label for every instance,
//! 2. enumerate candidate features over the configured sources
//!    (see [`selection`]),
//! 3. compute every candidate's feature vector once,
//! 4. run the [`builder::TreeBuilder`] state machine from the root.
//!
//! The resulting [`Rpt`] is immutable. Pruning (see [`pruning`]) produces
//! new trees instead of editing this one.

pub mod builder;
pub mod node;
pub mod predictor;
pub mod pruning;
pub mod scoring;
pub mod selection;
pub mod significance;
pub mod state;
pub mod stopping;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatorRegistry;
use crate::config::{LearnerConfig, SignificanceKind, StoppingKind};
use crate::error::{LearnError, LearnResult};
use crate::feature::FeatureCache;
use crate::graph::{ItemId, RelationalStore, Scope};
use crate::profile::Profiler;
use crate::source::{ClassLabel, Source};
use crate::stop::StopToken;

use builder::TreeBuilder;
use node::RptNode;
use scoring::ChiSquareScorer;
use selection::{DefaultAggregatorSelection, enumerate_features};
use significance::{ParametricTester, RandomizationTester, SignificanceTester};
use state::{Candidate, GrowthState, Instance};
use stopping::{DefaultStopping, DepthSizeStopping, StoppingPolicy};

/// A learned tree with the label it predicts and the modules that built it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rpt {
    root: RptNode,
    class_label: ClassLabel,
    config: LearnerConfig,
}

impl Rpt {
    pub fn new(root: RptNode, class_label: ClassLabel, config: LearnerConfig) -> Self {
        Self {
            root,
            class_label,
            config,
        }
    }

    pub fn root(&self) -> &RptNode {
        &self.root
    }

    pub fn class_label(&self) -> &ClassLabel {
        &self.class_label
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    /// The same model reading and predicting renamed attributes: the class
    /// label and every split source whose attribute `renames` maps.
    pub fn with_renamed_attrs(&self, renames: &BTreeMap<String, String>) -> Rpt {
        let mut rpt = self.clone();
        if let Some(to) = renames.get(&rpt.class_label.attr) {
            rpt.class_label.attr = to.clone();
        }
        let splits = rpt.root.rename_attr(renames);
        tracing::debug!(label = %rpt.class_label, splits, "remapped tree attributes");
        rpt
    }

    /// The same model with a different root, e.g. a pruned subtree.
    pub fn with_root(&self, root: RptNode) -> Rpt {
        Rpt {
            root,
            class_label: self.class_label.clone(),
            config: self.config.clone(),
        }
    }
}

/// What to learn: the label, the labelled population, and the sources
/// features may aggregate over.
#[derive(Debug, Clone)]
pub struct LearningTask {
    pub class_label: ClassLabel,
    pub population: Vec<ItemId>,
    /// Instance weights; instances not listed weigh 1.
    pub weights: BTreeMap<ItemId, f64>,
    pub sources: Vec<Source>,
}

impl LearningTask {
    pub fn new(class_label: ClassLabel, population: Vec<ItemId>, sources: Vec<Source>) -> Self {
        Self {
            class_label,
            population,
            weights: BTreeMap::new(),
            sources,
        }
    }

    /// Every item of the label's kind that carries the label attribute.
    pub fn labelled(
        store: &dyn RelationalStore,
        class_label: ClassLabel,
        sources: Vec<Source>,
    ) -> LearnResult<Self> {
        let mut population = Vec::new();
        for id in store.items_of_kind(&class_label.item_kind)? {
            if store.attribute(id, &class_label.attr)?.is_some() {
                population.push(id);
            }
        }
        Ok(Self::new(class_label, population, sources))
    }

    /// The same task over a different population.
    pub fn with_population(&self, population: Vec<ItemId>) -> Self {
        Self {
            class_label: self.class_label.clone(),
            population,
            weights: self.weights.clone(),
            sources: self.sources.clone(),
        }
    }

    pub fn weight(&self, id: ItemId) -> f64 {
        self.weights.get(&id).copied().unwrap_or(1.0)
    }
}

/// Learns trees against one store with one configuration.
pub struct RptLearner<'a> {
    store: &'a dyn RelationalStore,
    registry: &'a AggregatorRegistry,
    config: LearnerConfig,
    stop: StopToken,
}

impl<'a> RptLearner<'a> {
    pub fn new(
        store: &'a dyn RelationalStore,
        registry: &'a AggregatorRegistry,
        config: LearnerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            stop: StopToken::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn store(&self) -> &'a dyn RelationalStore {
        self.store
    }

    pub fn registry(&self) -> &'a AggregatorRegistry {
        self.registry
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn learn(&self, task: &LearningTask) -> LearnResult<Rpt> {
        self.learn_profiled(task).map(|(rpt, _)| rpt)
    }

    /// Learn a tree and return the profile of the build.
    pub fn learn_profiled(&self, task: &LearningTask) -> LearnResult<(Rpt, Profiler)> {
        let label = &task.class_label;
        if task.population.is_empty() {
            return Err(LearnError::EmptyPopulation {
                item_kind: label.item_kind.clone(),
                attr: label.attr.clone(),
            });
        }

        let scope = Scope::open(self.store)?;
        let mut labels = Vec::with_capacity(task.population.len());
        let mut instances = Vec::with_capacity(task.population.len());
        for &id in &task.population {
            let value = self
                .store
                .attribute(id, &label.attr)?
                .ok_or_else(|| LearnError::MissingLabel {
                    id: id.get(),
                    attr: label.attr.clone(),
                })?;
            labels.push(value.to_string());
            instances.push(Instance {
                id,
                weight: task.weight(id),
            });
        }

        let mut cache = FeatureCache::new(task.population.clone());
        let selection = DefaultAggregatorSelection::new(self.config.invalid_for_core.clone());
        let features = enumerate_features(
            self.store,
            self.registry,
            &selection,
            label,
            &task.sources,
            &mut cache,
            self.config.num_thresholds,
        )?;
        let mut pool = Vec::with_capacity(features.len());
        for feature in features {
            let vector = cache.vector(self.store, self.registry, &feature)?;
            pool.push(Candidate { feature, vector });
        }
        scope.close()?;
        tracing::info!(
            label = %label,
            instances = instances.len(),
            candidates = pool.len(),
            "enumerated candidate features"
        );

        let root = GrowthState::root(instances, &labels, pool.len());
        let significance = self.significance();
        let stopping = self.stopping();
        let mut builder = TreeBuilder::new(
            self.store,
            &ChiSquareScorer,
            significance.as_ref(),
            stopping.as_ref(),
        )
        .with_order(self.config.split_order, self.config.seed)
        .with_stop(self.stop.clone());
        let tree = builder.build(&pool, root)?;
        tracing::info!(
            label = %label,
            leaves = tree.leaf_count(),
            height = tree.height(),
            "learned tree"
        );
        Ok((
            Rpt::new(tree, label.clone(), self.config.clone()),
            builder.into_profiler(),
        ))
    }

    fn significance(&self) -> Arc<dyn SignificanceTester> {
        match self.config.significance {
            SignificanceKind::Parametric => Arc::new(ParametricTester::new(self.config.p_value)),
            SignificanceKind::Randomization => Arc::new(RandomizationTester::new(
                self.config.p_value,
                self.config.randomization_samples,
                self.config.randomization_threshold,
            )),
        }
    }

    fn stopping(&self) -> Arc<dyn StoppingPolicy> {
        match self.config.stopping {
            StoppingKind::Default => Arc::new(DefaultStopping {
                max_depth: self.config.max_depth,
                min_instances: self.config.min_instances,
            }),
            StoppingKind::DepthSize => Arc::new(DepthSizeStopping {
                max_depth: self.config.max_depth,
                min_instances: self.config.min_instances,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::index::GraphStore;
    use crate::graph::Value;

    fn id(raw: u64) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    /// Movies 1..=30; drama iff the studio is in the north. Budget is noise.
    fn store() -> GraphStore {
        let store = GraphStore::new();
        store.add_item(id(100), "studio").unwrap();
        store.add_item(id(101), "studio").unwrap();
        store.set_attribute(id(100), "region", "north".into()).unwrap();
        store.set_attribute(id(101), "region", "south".into()).unwrap();
        for m in 1..=30 {
            store.add_item(id(m), "movie").unwrap();
            let north = m % 3 != 0;
            store
                .add_link(id(m), id(if north { 100 } else { 101 }), "made_by")
                .unwrap();
            let genre = if north { "drama" } else { "comedy" };
            store.set_attribute(id(m), "genre", genre.into()).unwrap();
            store
                .set_attribute(id(m), "budget", Value::Num(((m * 7) % 11) as f64))
                .unwrap();
        }
        store
    }

    fn task(store: &GraphStore) -> LearningTask {
        LearningTask::labelled(
            store,
            ClassLabel::new("movie", "genre"),
            vec![
                "[self].budget".parse().unwrap(),
                "[>made_by:studio].region".parse().unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn learns_relational_split() {
        let store = store();
        let registry = AggregatorRegistry::standard();
        let learner = RptLearner::new(&store, &registry, LearnerConfig::default());
        let rpt = learner.learn(&task(&store)).unwrap();
        let feature = rpt.root().split_feature().unwrap();
        assert_eq!(feature.source().to_string(), "[>made_by:studio].region");
        assert_eq!(rpt.root().instance_count(), 30);
        assert_eq!(store.open_scope_count(), 0);
    }

    #[test]
    fn empty_population_is_an_error() {
        let store = store();
        let registry = AggregatorRegistry::standard();
        let learner = RptLearner::new(&store, &registry, LearnerConfig::default());
        let task = task(&store).with_population(vec![]);
        assert!(matches!(
            learner.learn(&task),
            Err(LearnError::EmptyPopulation { .. })
        ));
    }

    #[test]
    fn unlabelled_instance_is_an_error() {
        let store = store();
        store.add_item(id(99), "movie").unwrap();
        let registry = AggregatorRegistry::standard();
        let learner = RptLearner::new(&store, &registry, LearnerConfig::default());
        let task = task(&store).with_population(vec![id(1), id(99)]);
        assert!(matches!(
            learner.learn(&task),
            Err(LearnError::MissingLabel { id: 99, .. })
        ));
        // The scope opened for reading labels was released on the error path.
        assert_eq!(store.open_scope_count(), 0);
    }

    #[test]
    fn learning_is_deterministic() {
        let store = store();
        let registry = AggregatorRegistry::standard();
        let config = LearnerConfig {
            significance: SignificanceKind::Randomization,
            ..Default::default()
        };
        let learner = RptLearner::new(&store, &registry, config);
        let a = learner.learn(&task(&store)).unwrap();
        let b = learner.learn(&task(&store)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn profile_records_scoring() {
        let store = store();
        let registry = AggregatorRegistry::standard();
        let learner = RptLearner::new(&store, &registry, LearnerConfig::default());
        let (_, profile) = learner.learn_profiled(&task(&store)).unwrap();
        assert!(profile.stats("score").is_some());
    }
}
