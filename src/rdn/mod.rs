//! Relational dependency networks: collective inference over several RPTs
//! whose features read each other's labels.
//!
//! One run of [`Rdn::apply`]:
//!
//! 0. every label attribute is copied to a working attribute and the models
//!    are remapped onto the copies (see [`mapping`]), so sampling never
//!    overwrites the labels already in the store;
//! 1. every model's population is labelled by the [`InitModule`] and the
//!    labels are written through the [`DbModule`];
//! 2. each iteration, every model samples a fresh label per entity from the
//!    leaf its tree routes that entity to, all against the store as it was
//!    at the start of the iteration;
//! 3. the sampled labels are written (only those that changed), feature
//!    caches reading a written attribute are dropped, listeners fire, and
//!    the [`Statistic`] records the sample on recording iterations.
//!
//! Writes happen only after every model has sampled, so model order and
//! parallel sampling do not change the outcome. Each model draws from its
//! own RNG stream seeded from the run seed and the model name. The working
//! attributes are deleted when the run ends, also when it fails.

pub mod db;
pub mod init;
pub mod listener;
pub mod mapping;
pub mod statistic;

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::aggregator::AggregatorRegistry;
use crate::config::RdnConfig;
use crate::error::{InferError, InferResult};
use crate::feature::FeatureCache;
use crate::graph::{ItemId, RelationalStore};
use crate::predictions::Predictions;
use crate::rpt::Rpt;
use crate::stop::StopToken;

pub use db::{DbModule, DeltaDbModule};
pub use init::{FromPredictionsInit, InitModule, RootDistributionInit};
pub use listener::{IterationReport, Listener, LoggingListener, SnapshotListener};
pub use mapping::{AttrMapper, LabelAttr};
pub use statistic::{DefaultStatistic, Statistic};

/// A tree bound to the entities whose labels it resamples.
#[derive(Debug, Clone)]
pub struct RdnModel {
    pub name: String,
    pub rpt: Rpt,
    pub population: Vec<ItemId>,
}

impl RdnModel {
    pub fn new(name: impl Into<String>, rpt: Rpt, population: Vec<ItemId>) -> Self {
        Self {
            name: name.into(),
            rpt,
            population,
        }
    }

    /// The attribute this model predicts.
    pub fn attr(&self) -> &str {
        &self.rpt.class_label().attr
    }
}

/// Result of a collective inference run.
#[derive(Debug, Clone)]
pub struct RdnOutcome {
    /// Empirical label distributions per model name.
    pub predictions: BTreeMap<String, Predictions>,
    pub iterations_run: usize,
    pub recorded: Vec<usize>,
    /// Total store writes, including initialization.
    pub writes: usize,
}

pub struct Rdn {
    config: RdnConfig,
    init: Box<dyn InitModule>,
    db: Box<dyn DbModule>,
    mapper: AttrMapper,
    listeners: Vec<Box<dyn Listener>>,
    statistic: Box<dyn Statistic>,
}

impl Rdn {
    /// Root-distribution init, delta writes, and the default statistic, plus
    /// logging and snapshot listeners when the config enables them.
    pub fn new(config: RdnConfig) -> Self {
        let mut listeners: Vec<Box<dyn Listener>> = Vec::new();
        if config.log_every > 0 {
            listeners.push(Box::new(LoggingListener {
                every: config.log_every,
            }));
        }
        if config.snapshot_every > 0 {
            listeners.push(Box::new(SnapshotListener::new(
                config.snapshot_every,
                config.snapshot_prefix.clone(),
            )));
        }
        let statistic = Box::new(DefaultStatistic::new(config.burn_in, config.skip));
        Self {
            config,
            init: Box::new(RootDistributionInit),
            db: Box::new(DeltaDbModule::new()),
            mapper: AttrMapper::default(),
            listeners,
            statistic,
        }
    }

    pub fn with_init(mut self, init: Box<dyn InitModule>) -> Self {
        self.init = init;
        self
    }

    pub fn with_db(mut self, db: Box<dyn DbModule>) -> Self {
        self.db = db;
        self
    }

    pub fn with_mapper(mut self, mapper: AttrMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_listener(mut self, listener: Box<dyn Listener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_statistic(mut self, statistic: Box<dyn Statistic>) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn config(&self) -> &RdnConfig {
        &self.config
    }

    pub fn apply(
        &mut self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        models: &[RdnModel],
        stop: &StopToken,
    ) -> InferResult<RdnOutcome> {
        if models.is_empty() {
            return Err(InferError::NoModels);
        }
        let mut names = BTreeSet::new();
        for model in models {
            if !names.insert(model.name.as_str()) {
                return Err(InferError::DuplicateModel {
                    model: model.name.clone(),
                });
            }
        }

        let result = self.mapper.startup(store, models).and_then(|mapped| {
            let attrs: BTreeMap<String, LabelAttr> = models
                .iter()
                .zip(&mapped)
                .map(|(model, working)| {
                    let label = LabelAttr {
                        attr: model.attr().to_string(),
                        working: working.attr().to_string(),
                    };
                    (model.name.clone(), label)
                })
                .collect();
            self.run_observed(store, registry, &mapped, &attrs, stop)
        });
        let cleanup = self.mapper.cleanup(store);
        match result {
            Ok(outcome) => cleanup.map(|()| outcome),
            Err(e) => {
                if let Err(cleanup) = cleanup {
                    tracing::warn!(error = %cleanup, "failed to delete working labels");
                }
                Err(e)
            }
        }
    }

    fn run_observed(
        &mut self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        models: &[RdnModel],
        attrs: &BTreeMap<String, LabelAttr>,
        stop: &StopToken,
    ) -> InferResult<RdnOutcome> {
        for listener in &mut self.listeners {
            listener.on_startup(store)?;
        }
        let result = self.run(store, registry, models, attrs, stop);
        for listener in &mut self.listeners {
            listener.on_cleanup(store);
        }
        result
    }

    fn run(
        &mut self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        models: &[RdnModel],
        attrs: &BTreeMap<String, LabelAttr>,
        stop: &StopToken,
    ) -> InferResult<RdnOutcome> {
        // The working attributes are fresh copies; nothing written by an
        // earlier run is in them.
        self.db.reset();
        let mut rngs: Vec<StdRng> = models
            .iter()
            .map(|m| StdRng::seed_from_u64(stream_seed(self.config.seed, &m.name)))
            .collect();
        let mut caches: Vec<FeatureCache> = models
            .iter()
            .map(|m| FeatureCache::new(m.population.clone()))
            .collect();

        let mut labels: BTreeMap<String, BTreeMap<ItemId, String>> = BTreeMap::new();
        for (i, model) in models.iter().enumerate() {
            let initial = self.init.initialize(model, store, registry, &mut rngs[i])?;
            labels.insert(model.name.clone(), initial);
        }
        let mut writes = self.write_all(store, models, &labels, &mut caches)?;
        tracing::info!(
            models = models.len(),
            init = self.init.name(),
            writes,
            "initialized labels"
        );

        let mut iterations_run = 0;
        for iteration in 0..self.config.iterations {
            if stop.is_stopped() {
                tracing::info!(iteration, "stop requested, ending inference");
                break;
            }
            let sampled = self.sample_all(store, registry, models, &mut caches, &mut rngs)?;
            for (model, fresh) in models.iter().zip(sampled) {
                labels.insert(model.name.clone(), fresh);
            }
            let iteration_writes = self.write_all(store, models, &labels, &mut caches)?;
            writes += iteration_writes;

            let report = IterationReport {
                iteration,
                writes: iteration_writes,
                labels: &labels,
                attrs,
            };
            for listener in &mut self.listeners {
                listener.on_iteration(store, &report)?;
            }

            if self.statistic.is_record_iteration(iteration) {
                for model in models {
                    if let Some(current) = labels.get(&model.name) {
                        self.statistic.record(&model.name, current);
                    }
                }
                self.statistic.mark_recorded(iteration);
            }
            iterations_run = iteration + 1;
        }

        Ok(RdnOutcome {
            predictions: self.statistic.predictions(),
            iterations_run,
            recorded: self.statistic.recorded().to_vec(),
            writes,
        })
    }

    /// One fresh label per entity for every model, read against the
    /// current store without writing anything.
    fn sample_all(
        &self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        models: &[RdnModel],
        caches: &mut [FeatureCache],
        rngs: &mut [StdRng],
    ) -> InferResult<Vec<BTreeMap<ItemId, String>>> {
        let sample = |model: &RdnModel,
                      cache: &mut FeatureCache,
                      rng: &mut StdRng|
         -> InferResult<BTreeMap<ItemId, String>> {
            let predictions = model.rpt.predict(store, registry, cache)?;
            Ok(predictions.sample_classes(rng))
        };
        if self.config.parallel {
            use rayon::prelude::*;

            models
                .par_iter()
                .zip(caches.par_iter_mut())
                .zip(rngs.par_iter_mut())
                .map(|((model, cache), rng)| sample(model, cache, rng))
                .collect()
        } else {
            models
                .iter()
                .zip(caches.iter_mut())
                .zip(rngs.iter_mut())
                .map(|((model, cache), rng)| sample(model, cache, rng))
                .collect()
        }
    }

    /// Write every model's labels and drop cached features that read a
    /// written attribute.
    fn write_all(
        &mut self,
        store: &dyn RelationalStore,
        models: &[RdnModel],
        labels: &BTreeMap<String, BTreeMap<ItemId, String>>,
        caches: &mut [FeatureCache],
    ) -> InferResult<usize> {
        let mut total = 0;
        let mut touched = BTreeSet::new();
        for model in models {
            let Some(current) = labels.get(&model.name) else {
                continue;
            };
            let written = self.db.write(store, model.attr(), current)?;
            if written > 0 {
                touched.insert(model.attr());
            }
            total += written;
        }
        for attr in touched {
            let dropped: usize = caches
                .iter_mut()
                .map(|cache| cache.invalidate_matching(attr))
                .sum();
            tracing::trace!(attr, dropped, "invalidated cached features");
        }
        Ok(total)
    }
}

/// Per-model RNG seed: FNV-1a of the model name mixed with the run seed.
fn stream_seed(seed: u64, name: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash ^ seed
}
