//! Aggregator selection and candidate feature enumeration.

use std::collections::BTreeSet;

use crate::aggregator::{Aggregator, AggregatorRegistry};
use crate::error::LearnResult;
use crate::feature::{FeatureCache, FeatureSetting};
use crate::graph::RelationalStore;
use crate::source::{ClassLabel, Source, SourceProfile};

pub trait AggregatorSelection: Send + Sync {
    fn is_valid(&self, aggregator: &dyn Aggregator, profile: &SourceProfile) -> bool;
}

/// Any aggregator that applies to the source, except those listed as
/// invalid over the core item.
///
/// Mode and proportion over a single core row are always-true or
/// always-false tests, so they are excluded there by default.
#[derive(Debug, Clone)]
pub struct DefaultAggregatorSelection {
    invalid_for_core: BTreeSet<String>,
}

impl DefaultAggregatorSelection {
    pub fn new<I, S>(invalid_for_core: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            invalid_for_core: invalid_for_core.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for DefaultAggregatorSelection {
    fn default() -> Self {
        Self::new(["mode", "proportion"])
    }
}

impl AggregatorSelection for DefaultAggregatorSelection {
    fn is_valid(&self, aggregator: &dyn Aggregator, profile: &SourceProfile) -> bool {
        aggregator.applies_to(profile)
            && !(profile.is_core && self.invalid_for_core.contains(aggregator.id()))
    }
}

/// Every candidate feature over `sources`, sorted by canonical string.
///
/// The class label read off the core item is never a source.
pub fn enumerate_features(
    store: &dyn RelationalStore,
    registry: &AggregatorRegistry,
    selection: &dyn AggregatorSelection,
    class_label: &ClassLabel,
    sources: &[Source],
    cache: &mut FeatureCache,
    num_thresholds: usize,
) -> LearnResult<Vec<FeatureSetting>> {
    let label_source = class_label.core_source();
    let mut features: Vec<FeatureSetting> = Vec::new();
    for source in sources {
        if *source == label_source {
            tracing::warn!(source = %source, "skipping class label as a source");
            continue;
        }
        let data = cache.source_data(store, source)?;
        for aggregator in registry.iter() {
            if !selection.is_valid(aggregator, &data.profile) {
                continue;
            }
            features.extend(aggregator.settings(
                source,
                &data,
                cache.population(),
                num_thresholds,
            )?);
        }
    }
    features.sort_by_cached_key(FeatureSetting::key);
    features.dedup_by(|a, b| a.key() == b.key());
    Ok(features)
}
