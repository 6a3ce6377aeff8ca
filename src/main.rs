//! relprob CLI: learn, prune, evaluate and run relational probability trees.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use relprob::aggregator::AggregatorRegistry;
use relprob::config::{ProjectConfig, TaskConfig};
use relprob::graph::RelationalStore;
use relprob::graph::index::GraphStore;
use relprob::graph::load::GraphDocument;
use relprob::persist;
use relprob::predictions::Predictions;
use relprob::rdn::{Rdn, RdnModel};
use relprob::rpt::pruning::{self, CrossValidationSelection, TestSampleSelection};
use relprob::rpt::{LearningTask, RptLearner};
use relprob::source::{ClassLabel, Source};
use relprob::stop::StopToken;
use relprob::synthetic::{MovieDataset, train_test_split};

#[derive(Parser)]
#[command(name = "relprob", version, about = "Relational probability trees")]
struct Cli {
    /// Project file (TOML) with learner, inference and task settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic movie graph as a JSON document.
    Generate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "200")]
        movies: usize,
        #[arg(long, default_value = "120")]
        actors: usize,
        #[arg(long, default_value = "6")]
        studios: usize,
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Learn a tree on the training split and save it.
    Learn {
        #[arg(long)]
        graph: PathBuf,
        /// Model file; `.json` is written as JSON, anything else as bincode.
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "none")]
        prune: PruneMode,
        /// Folds for cross-validated pruning.
        #[arg(long, default_value = "5")]
        folds: usize,
    },

    /// Report loss, log-likelihood and AUC of a model on the test split.
    Evaluate {
        #[arg(long)]
        graph: PathBuf,
        #[arg(long)]
        model: PathBuf,
    },

    /// Run collective inference over the test split.
    Infer {
        #[arg(long)]
        graph: PathBuf,
        #[arg(long)]
        model: PathBuf,
    },

    /// Print a saved tree.
    Show {
        #[arg(long)]
        model: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PruneMode {
    None,
    TestSample,
    CrossValidation,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let project = load_project(cli.config.as_deref())?;
    let stop = StopToken::new();
    stop.stop_on_sigint().into_diagnostic()?;
    let registry = AggregatorRegistry::standard();

    match cli.command {
        Commands::Generate {
            out,
            movies,
            actors,
            studios,
            seed,
        } => {
            let dataset = MovieDataset {
                studios,
                movies,
                actors,
                seed,
                ..Default::default()
            };
            let store = dataset.generate().into_diagnostic()?;
            GraphDocument::from_store(&store)
                .into_diagnostic()?
                .save(&out)
                .into_diagnostic()?;
            println!(
                "Wrote {} items and {} links to {}",
                store.item_count(),
                store.link_count(),
                out.display()
            );
        }

        Commands::Learn {
            graph,
            out,
            prune,
            folds,
        } => {
            let store = load_graph(&graph)?;
            let (train, test) = split(&store, &project)?;
            let learner =
                RptLearner::new(&store, &registry, project.learner.clone()).with_stop(stop);
            let task = task(&store, &project.task)?.with_population(train);
            let (mut rpt, profile) = learner.learn_profiled(&task).into_diagnostic()?;
            for (name, stats) in profile.report() {
                println!("  {name}: {} calls, {:?}", stats.calls, stats.total);
            }
            println!("Learned tree with {} leaves", rpt.leaf_count());

            rpt = match prune {
                PruneMode::None => rpt,
                PruneMode::TestSample => {
                    let selection = TestSampleSelection { population: test };
                    pruning::prune(&rpt, &selection, &learner, &task).into_diagnostic()?
                }
                PruneMode::CrossValidation => {
                    let selection = CrossValidationSelection {
                        folds,
                        seed: project.learner.seed,
                    };
                    pruning::prune(&rpt, &selection, &learner, &task).into_diagnostic()?
                }
            };
            println!("Saved tree has {} leaves", rpt.leaf_count());
            persist::save(&rpt, &out).into_diagnostic()?;
            println!("Saved model to {}", out.display());
        }

        Commands::Evaluate { graph, model } => {
            let store = load_graph(&graph)?;
            let rpt = persist::load(&model).into_diagnostic()?;
            let (_, test) = split(&store, &project)?;
            let mut predictions = rpt.apply(&store, &registry, &test).into_diagnostic()?;
            predictions
                .attach_truth(&store, &rpt.class_label().attr)
                .into_diagnostic()?;
            report(&predictions, project.task.positive_class.as_deref());
        }

        Commands::Infer { graph, model } => {
            let store = load_graph(&graph)?;
            let rpt = persist::load(&model).into_diagnostic()?;
            let (_, test) = split(&store, &project)?;
            let attr = rpt.class_label().attr.clone();
            let models = [RdnModel::new(attr.clone(), rpt, test)];
            let outcome = Rdn::new(project.rdn.clone())
                .apply(&store, &registry, &models, &stop)
                .into_diagnostic()?;
            println!(
                "Ran {} iterations, recorded {}, {} writes",
                outcome.iterations_run,
                outcome.recorded.len(),
                outcome.writes
            );
            if let Some(mut predictions) = outcome.predictions.get(&attr).cloned() {
                predictions.attach_truth(&store, &attr).into_diagnostic()?;
                report(&predictions, project.task.positive_class.as_deref());
            } else {
                println!("No samples recorded; increase iterations past burn-in.");
            }
        }

        Commands::Show { model } => {
            let rpt = persist::load(&model).into_diagnostic()?;
            println!(
                "RPT for {} ({} leaves, height {})",
                rpt.class_label(),
                rpt.leaf_count(),
                rpt.root().height()
            );
            print!("{}", rpt.root());
        }
    }

    Ok(())
}

fn load_project(path: Option<&Path>) -> Result<ProjectConfig> {
    match path {
        Some(path) => ProjectConfig::load(path).into_diagnostic(),
        None => {
            let label = MovieDataset::label();
            let sources = MovieDataset::default_sources()
                .into_diagnostic()?
                .iter()
                .map(Source::to_string)
                .collect();
            Ok(ProjectConfig {
                learner: Default::default(),
                rdn: Default::default(),
                task: TaskConfig {
                    item_kind: label.item_kind,
                    attr: label.attr,
                    sources,
                    positive_class: Some("drama".to_string()),
                    test_fraction: 0.3,
                },
            })
        }
    }
}

fn load_graph(path: &Path) -> Result<GraphStore> {
    let store = GraphDocument::load(path)
        .into_diagnostic()?
        .into_store()
        .into_diagnostic()?;
    tracing::info!(
        items = store.item_count(),
        links = store.link_count(),
        path = %path.display(),
        "loaded graph"
    );
    Ok(store)
}

fn task(store: &dyn RelationalStore, task: &TaskConfig) -> Result<LearningTask> {
    let sources = task
        .sources
        .iter()
        .map(|s| s.parse::<Source>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .into_diagnostic()?;
    LearningTask::labelled(store, ClassLabel::new(&task.item_kind, &task.attr), sources)
        .into_diagnostic()
}

fn split(
    store: &dyn RelationalStore,
    project: &ProjectConfig,
) -> Result<(Vec<relprob::ItemId>, Vec<relprob::ItemId>)> {
    let labelled = task(store, &project.task)?;
    Ok(train_test_split(
        &labelled.population,
        project.task.test_fraction,
        project.learner.seed,
    ))
}

fn report(predictions: &Predictions, positive: Option<&str>) {
    println!("Entities: {}", predictions.len());
    match predictions.zero_one_loss() {
        Some(loss) => println!("Zero-one loss: {loss:.4}"),
        None => println!("Zero-one loss: n/a"),
    }
    if let Some(cll) = predictions.conditional_log_likelihood() {
        println!("Conditional log-likelihood: {cll:.4}");
    }
    if let Some(positive) = positive {
        match predictions.auc(positive) {
            Some(auc) => println!("AUC ({positive}): {auc:.4}"),
            None => println!("AUC ({positive}): n/a"),
        }
    }
}
