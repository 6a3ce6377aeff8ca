//! Benchmarks for tree induction, pruning and collective inference.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use relprob::aggregator::AggregatorRegistry;
use relprob::config::{LearnerConfig, RdnConfig, StoppingKind};
use relprob::graph::index::GraphStore;
use relprob::rdn::{Rdn, RdnModel};
use relprob::rpt::pruning::get_pruning_sequence;
use relprob::rpt::{LearningTask, RptLearner};
use relprob::stop::StopToken;
use relprob::synthetic::MovieDataset;

fn setup() -> (GraphStore, LearningTask) {
    let store = MovieDataset::default().generate().unwrap();
    let task = LearningTask::labelled(
        &store,
        MovieDataset::label(),
        MovieDataset::default_sources().unwrap(),
    )
    .unwrap();
    (store, task)
}

fn config() -> LearnerConfig {
    LearnerConfig {
        stopping: StoppingKind::DepthSize,
        max_depth: 4,
        ..Default::default()
    }
}

fn bench_learn(c: &mut Criterion) {
    let (store, task) = setup();
    let registry = AggregatorRegistry::standard();
    let learner = RptLearner::new(&store, &registry, config());

    c.bench_function("learn_movies_200", |bench| {
        bench.iter(|| black_box(learner.learn(&task).unwrap()))
    });
}

fn bench_pruning_sequence(c: &mut Criterion) {
    let (store, task) = setup();
    let registry = AggregatorRegistry::standard();
    let rpt = RptLearner::new(&store, &registry, config())
        .learn(&task)
        .unwrap();

    c.bench_function("pruning_sequence", |bench| {
        bench.iter(|| black_box(get_pruning_sequence(rpt.root())))
    });
}

fn bench_rdn(c: &mut Criterion) {
    let (store, task) = setup();
    let registry = AggregatorRegistry::standard();
    let rpt = RptLearner::new(&store, &registry, config())
        .learn(&task)
        .unwrap();
    let models = [RdnModel::new("genre", rpt, task.population.clone())];

    for parallel in [false, true] {
        let name = if parallel { "rdn_20_parallel" } else { "rdn_20_sequential" };
        c.bench_function(name, |bench| {
            bench.iter(|| {
                let config = RdnConfig {
                    iterations: 20,
                    parallel,
                    log_every: 0,
                    ..Default::default()
                };
                black_box(
                    Rdn::new(config)
                        .apply(&store, &registry, &models, &StopToken::new())
                        .unwrap(),
                )
            })
        });
    }
}

criterion_group!(benches, bench_learn, bench_pruning_sequence, bench_rdn);
criterion_main!(benches);
