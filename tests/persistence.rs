//! Persistence tests: models, graphs and project files survive a write and
//! reload through the filesystem.

use relprob::aggregator::AggregatorRegistry;
use relprob::config::{LearnerConfig, ProjectConfig, RdnConfig, StoppingKind, TaskConfig};
use relprob::graph::RelationalStore;
use relprob::graph::load::GraphDocument;
use relprob::persist;
use relprob::rpt::{LearningTask, Rpt, RptLearner};
use relprob::synthetic::MovieDataset;

fn dataset() -> MovieDataset {
    MovieDataset {
        studios: 3,
        movies: 50,
        actors: 30,
        max_cast: 3,
        seed: 8,
    }
}

fn learned(store: &dyn RelationalStore) -> (Rpt, Vec<relprob::ItemId>) {
    let registry = AggregatorRegistry::standard();
    let task = LearningTask::labelled(
        store,
        MovieDataset::label(),
        MovieDataset::default_sources().unwrap(),
    )
    .unwrap();
    let config = LearnerConfig {
        stopping: StoppingKind::DepthSize,
        ..Default::default()
    };
    let rpt = RptLearner::new(store, &registry, config).learn(&task).unwrap();
    (rpt, task.population)
}

#[test]
fn model_survives_json_and_binary_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = dataset().generate().unwrap();
    let registry = AggregatorRegistry::standard();
    let (rpt, population) = learned(&store);
    let expected = rpt.apply(&store, &registry, &population).unwrap();

    for name in ["model.json", "nested/model.rpt"] {
        let path = dir.path().join(name);
        persist::save(&rpt, &path).unwrap();
        let reloaded = persist::load(&path).unwrap();
        assert_eq!(reloaded, rpt, "{name}");

        let predictions = reloaded.apply(&store, &registry, &population).unwrap();
        assert_eq!(predictions, expected, "{name}");
    }
}

#[test]
fn loading_a_missing_model_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(persist::load(&dir.path().join("absent.json")).is_err());
}

#[test]
fn graph_document_round_trips_through_a_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    let store = dataset().generate().unwrap();

    GraphDocument::from_store(&store).unwrap().save(&path).unwrap();
    let reloaded = GraphDocument::load(&path).unwrap().into_store().unwrap();

    assert_eq!(reloaded.item_count(), store.item_count());
    assert_eq!(reloaded.link_count(), store.link_count());
    for id in store.all_items() {
        assert_eq!(reloaded.attributes_of(id), store.attributes_of(id));
    }

    // A model learned on the reloaded graph is the same model.
    let (a, _) = learned(&store);
    let (b, _) = learned(&reloaded);
    assert_eq!(a, b);
}

#[test]
fn project_file_round_trips() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("project.toml");
    let project = ProjectConfig {
        learner: LearnerConfig {
            max_depth: 5,
            ..Default::default()
        },
        rdn: RdnConfig {
            iterations: 30,
            parallel: true,
            ..Default::default()
        },
        task: TaskConfig {
            item_kind: "movie".into(),
            attr: "genre".into(),
            sources: vec!["[self].budget".into(), "[<acted_in:actor].gender".into()],
            positive_class: Some("drama".into()),
            test_fraction: 0.25,
        },
    };
    project.save(&path).unwrap();
    assert_eq!(ProjectConfig::load(&path).unwrap(), project);
}
