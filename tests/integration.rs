//! End-to-end tests over the synthetic movie graph.
//!
//! These exercise learning, pruning, prediction and collective inference
//! together against one generated store.

use relprob::aggregator::AggregatorRegistry;
use relprob::config::{LearnerConfig, RdnConfig, SignificanceKind, StoppingKind};
use relprob::graph::index::GraphStore;
use relprob::graph::{ItemId, RelationalStore, Value};
use relprob::rdn::{DbModule, DeltaDbModule, Rdn, RdnModel};
use relprob::rpt::node::RptNode;
use relprob::rpt::pruning::{
    self, CrossValidationSelection, TestSampleSelection, TreeSelection, get_pruning_sequence,
};
use relprob::rpt::{LearningTask, Rpt, RptLearner};
use relprob::stop::StopToken;
use relprob::synthetic::{MovieDataset, train_test_split};
use std::collections::BTreeMap;

fn dataset() -> MovieDataset {
    MovieDataset {
        studios: 4,
        movies: 80,
        actors: 50,
        max_cast: 3,
        seed: 3,
    }
}

fn growing_config() -> LearnerConfig {
    LearnerConfig {
        max_depth: 3,
        stopping: StoppingKind::DepthSize,
        ..Default::default()
    }
}

fn labelled_task(store: &GraphStore) -> LearningTask {
    LearningTask::labelled(
        store,
        MovieDataset::label(),
        MovieDataset::default_sources().unwrap(),
    )
    .unwrap()
}

fn learn(store: &GraphStore, config: LearnerConfig, population: Vec<ItemId>) -> Rpt {
    let registry = AggregatorRegistry::standard();
    let task = labelled_task(store).with_population(population);
    RptLearner::new(store, &registry, config).learn(&task).unwrap()
}

fn assert_partitions(node: &RptNode) {
    if let (Some(yes), Some(no)) = (node.yes_branch(), node.no_branch()) {
        assert_eq!(
            yes.instance_count() + no.instance_count(),
            node.instance_count(),
            "children must partition the parent's instances"
        );
        let totals = yes.distribution().total() + no.distribution().total();
        assert!((totals - node.distribution().total()).abs() < 1e-9);
        assert_eq!(yes.depth(), node.depth() + 1);
        assert_eq!(no.depth(), node.depth() + 1);
        assert_partitions(yes);
        assert_partitions(no);
    }
}

#[test]
fn learning_the_same_task_twice_gives_the_same_tree() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let a = learn(&store, growing_config(), population.clone());
    let b = learn(&store, growing_config(), population);
    assert_eq!(a, b);
}

#[test]
fn randomization_learning_is_seeded() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let config = LearnerConfig {
        significance: SignificanceKind::Randomization,
        randomization_samples: 10,
        max_depth: 2,
        seed: 9,
        ..Default::default()
    };
    let a = learn(&store, config.clone(), population.clone());
    let b = learn(&store, config, population);
    assert_eq!(a, b);
}

#[test]
fn learned_tree_splits_and_partitions_every_node() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let rpt = learn(&store, growing_config(), population.clone());

    assert!(rpt.leaf_count() > 1, "budget alone separates the genres");
    assert!(rpt.root().height() <= 3);
    assert_eq!(rpt.root().instance_count(), population.len());
    assert_partitions(rpt.root());
    assert_eq!(store.open_scope_count(), 0);
}

#[test]
fn predictions_are_normalized_and_cover_the_population() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let (train, test) = train_test_split(&population, 0.3, 1);
    let rpt = learn(&store, growing_config(), train);
    let registry = AggregatorRegistry::standard();

    let mut predictions = rpt.apply(&store, &registry, &test).unwrap();
    assert_eq!(predictions.len(), test.len());
    for (_, dist) in predictions.iter() {
        assert!((dist.total() - 1.0).abs() < 1e-9);
    }

    assert_eq!(predictions.attach_truth(&store, "genre").unwrap(), test.len());
    let loss = predictions.zero_one_loss().unwrap();
    assert!((0.0..=1.0).contains(&loss));
    let auc = predictions.auc("drama").unwrap();
    assert!((0.0..=1.0).contains(&auc));
}

#[test]
fn pruning_sequence_is_nested_and_leaves_the_tree_alone() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let rpt = learn(&store, growing_config(), population);
    let before = rpt.clone();

    let sequence = get_pruning_sequence(rpt.root());
    assert_eq!(rpt, before);

    let first = &sequence[0];
    assert!(first.leaf_count() <= rpt.leaf_count());
    let total = rpt.root().distribution().total();
    assert!((first.tree_resub_error() - rpt.root().tree_resub_error(total)).abs() < 1e-9);
    assert_eq!(sequence.last().map(|p| p.leaf_count()), Some(1));

    for pair in sequence.windows(2) {
        assert!(pair[1].leaf_count() < pair[0].leaf_count());
        assert!(pair[1].alpha() >= pair[0].alpha());
    }
    for pair in sequence[1..].windows(2) {
        assert!(pair[1].alpha() > pair[0].alpha());
    }
}

#[test]
fn test_sample_pruning_returns_a_sequence_member() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let (train, test) = train_test_split(&population, 0.3, 2);
    let registry = AggregatorRegistry::standard();
    let learner = RptLearner::new(&store, &registry, growing_config());
    let task = labelled_task(&store).with_population(train);
    let rpt = learner.learn(&task).unwrap();

    let pruned = pruning::prune(
        &rpt,
        &TestSampleSelection { population: test },
        &learner,
        &task,
    )
    .unwrap();
    let sequence = get_pruning_sequence(rpt.root());
    assert!(sequence.iter().any(|p| p.root() == pruned.root()));
    assert!(pruned.leaf_count() <= rpt.leaf_count());
    assert_eq!(pruned.class_label(), rpt.class_label());
}

#[test]
fn cross_validation_pruning_picks_a_sequence_member() {
    let store = dataset().generate().unwrap();
    let registry = AggregatorRegistry::standard();
    let learner = RptLearner::new(&store, &registry, growing_config());
    let task = labelled_task(&store);
    let rpt = learner.learn(&task).unwrap();
    let sequence = get_pruning_sequence(rpt.root());
    assert!(sequence.len() > 1);

    let selection = CrossValidationSelection { folds: 3, seed: 6 };
    let chosen = selection.select(&learner, &task, &rpt, &sequence).unwrap();
    assert!(chosen < sequence.len());
    assert_eq!(
        selection.select(&learner, &task, &rpt, &sequence).unwrap(),
        chosen,
        "fold assignment is seeded"
    );

    let pruned = pruning::prune(&rpt, &selection, &learner, &task).unwrap();
    assert_eq!(pruned.root(), sequence[chosen].root());
    assert_eq!(pruned.class_label(), rpt.class_label());
    assert_eq!(store.open_scope_count(), 0);
}

#[test]
fn collective_inference_records_on_schedule() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let (train, test) = train_test_split(&population, 0.3, 4);
    let rpt = learn(&store, growing_config(), train);
    let registry = AggregatorRegistry::standard();

    let truth: Vec<_> = test
        .iter()
        .map(|id| store.attribute(*id, "genre").unwrap())
        .collect();

    let models = [RdnModel::new("genre", rpt, test.clone())];
    let config = RdnConfig {
        iterations: 14,
        burn_in: 4,
        skip: 3,
        seed: 5,
        log_every: 0,
        ..Default::default()
    };
    let outcome = Rdn::new(config)
        .apply(&store, &registry, &models, &StopToken::new())
        .unwrap();

    assert_eq!(outcome.iterations_run, 14);
    assert_eq!(outcome.recorded, vec![4, 8, 12]);
    let genre = &outcome.predictions["genre"];
    assert_eq!(genre.len(), test.len());
    for (_, dist) in genre.iter() {
        assert!((dist.total() - 1.0).abs() < 1e-9);
    }
    assert_eq!(store.open_scope_count(), 0);

    let after: Vec<_> = test
        .iter()
        .map(|id| store.attribute(*id, "genre").unwrap())
        .collect();
    assert_eq!(after, truth, "sampling leaves the stored labels alone");
}

#[test]
fn stopped_token_halts_collective_inference() {
    let store = dataset().generate().unwrap();
    let population = labelled_task(&store).population;
    let rpt = learn(&store, growing_config(), population.clone());
    let registry = AggregatorRegistry::standard();
    let stop = StopToken::new();
    stop.stop();

    let models = [RdnModel::new("genre", rpt, population)];
    let outcome = Rdn::new(RdnConfig::default())
        .apply(&store, &registry, &models, &stop)
        .unwrap();
    assert_eq!(outcome.iterations_run, 0);
    assert!(outcome.recorded.is_empty());
    assert!(
        outcome
            .predictions
            .get("genre")
            .is_none_or(|p| p.is_empty())
    );
}

#[test]
fn delta_writes_skip_unchanged_labels() {
    let store = dataset().generate().unwrap();
    let movies: Vec<ItemId> = store.items_of_kind("movie").unwrap();
    let mut labels: BTreeMap<ItemId, String> = BTreeMap::new();
    for id in &movies {
        let genre = store.attribute(*id, "genre").unwrap().unwrap();
        labels.insert(*id, genre.to_string());
    }

    let mut db = DeltaDbModule::new();
    assert_eq!(db.write(&store, "genre", &labels).unwrap(), 0);

    let flipped = movies[0];
    labels.insert(flipped, "musical".to_string());
    assert_eq!(db.write(&store, "genre", &labels).unwrap(), 1);
    assert_eq!(db.write(&store, "genre", &labels).unwrap(), 0);
    assert_eq!(
        store.attribute(flipped, "genre").unwrap(),
        Some(Value::Str("musical".into()))
    );
}
