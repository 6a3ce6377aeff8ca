// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # relprob
//!
//! Relational probability trees (RPTs) and relational dependency networks
//! (RDNs) over typed, linked graph data.
//!
//! ## Architecture
//!
//! - **Graph access** (`graph`): the [`RelationalStore`](graph::RelationalStore)
//!   trait, an in-memory petgraph store, and JSON graph documents
//! - **Features** (`source`, `aggregator`, `feature`): relational paths,
//!   aggregation functions, and threshold tests over their results
//! - **Induction** (`rpt`): chi-square split scoring, parametric and
//!   randomization significance tests, pluggable stopping, pruning
//! - **Collective inference** (`rdn`): Gibbs-style resampling across models
//! - **Persistence** (`persist`): JSON and bincode model files
//!
//! ## Library usage
//!
//! ```no_run
//! use relprob::aggregator::AggregatorRegistry;
//! use relprob::config::LearnerConfig;
//! use relprob::rpt::{LearningTask, RptLearner};
//! use relprob::synthetic::MovieDataset;
//!
//! let dataset = MovieDataset::default();
//! let store = dataset.generate().unwrap();
//! let registry = AggregatorRegistry::standard();
//! let task = LearningTask::labelled(
//!     &store,
//!     MovieDataset::label(),
//!     MovieDataset::default_sources().unwrap(),
//! )
//! .unwrap();
//! let rpt = RptLearner::new(&store, &registry, LearnerConfig::default())
//!     .learn(&task)
//!     .unwrap();
//! println!("{}", rpt.root());
//! ```

pub mod aggregator;
pub mod config;
pub mod distribution;
pub mod error;
pub mod feature;
pub mod graph;
pub mod persist;
pub mod predictions;
pub mod profile;
pub mod rdn;
pub mod rpt;
pub mod source;
pub mod stop;
pub mod synthetic;
pub mod table;

pub use error::{RelError, RelResult};
pub use graph::{ItemId, RelationalStore, Value};
pub use predictions::Predictions;
pub use rpt::{LearningTask, Rpt, RptLearner};
