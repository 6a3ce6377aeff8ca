//! Aggregators: pluggable capabilities that reduce an entity's related rows
//! to one value.
//!
//! Each aggregator decides which sources it applies to and how its candidate
//! thresholds are chosen. The [`AggregatorRegistry`] maps capability ids to
//! implementations; feature settings store only the id.

pub mod basic;
pub mod counting;
pub mod numeric;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{FeatureError, FeatureResult};
use crate::feature::{CompareOp, FeatureSetting, ValueFilter};
use crate::graph::{ItemId, Value};
use crate::source::{Source, SourceData, SourceProfile};

/// Number of binned filter values tried for continuous value-filtered sources.
pub const CONTINUOUS_FILTER_VALUES: usize = 2;

pub trait Aggregator: Send + Sync {
    /// Capability id, e.g. `"count"`.
    fn id(&self) -> &'static str;

    /// Whether this aggregator can be used over the profiled source.
    fn applies_to(&self, profile: &SourceProfile) -> bool;

    /// Whether features built with this aggregator carry a value filter.
    fn is_value_filtered(&self) -> bool {
        false
    }

    /// Operator used to compare the aggregate against thresholds.
    fn threshold_op(&self, _profile: &SourceProfile) -> CompareOp {
        CompareOp::Ge
    }

    /// Reduce one entity's related values. `None` means missing.
    fn aggregate(&self, values: &[&Value], filter: Option<&ValueFilter>) -> Option<Value>;

    /// Enumerate candidate feature settings for a source over a population.
    fn settings(
        &self,
        source: &Source,
        data: &SourceData,
        population: &[ItemId],
        num_thresholds: usize,
    ) -> FeatureResult<Vec<FeatureSetting>> {
        let filters: Vec<Option<ValueFilter>> = if self.is_value_filtered() {
            filter_values(&data.profile).into_iter().map(Some).collect()
        } else {
            vec![None]
        };
        let op = self.threshold_op(&data.profile);
        let groups = data.table.group_by_entity();
        let mut settings = Vec::new();
        for filter in filters {
            let aggregates: Vec<Value> = population
                .iter()
                .filter_map(|id| {
                    let values = groups.get(id).map(Vec::as_slice).unwrap_or(&[]);
                    self.aggregate(values, filter.as_ref())
                })
                .collect();
            let thresholds = match op {
                CompareOp::Eq => distinct(aggregates),
                CompareOp::Gt | CompareOp::Ge => binned_thresholds(aggregates, num_thresholds),
            };
            for threshold in thresholds {
                settings.push(FeatureSetting::new(
                    source.clone(),
                    self.id(),
                    filter.clone(),
                    op,
                    threshold,
                )?);
            }
        }
        Ok(settings)
    }
}

/// Filter values for a value-filtered aggregator: every distinct value for
/// discrete sources, a few binned cut points for continuous ones.
pub fn filter_values(profile: &SourceProfile) -> Vec<ValueFilter> {
    if profile.continuous {
        binned_thresholds(profile.distinct_values.clone(), CONTINUOUS_FILTER_VALUES)
            .into_iter()
            .map(ValueFilter::gt)
            .collect()
    } else {
        profile
            .distinct_values
            .iter()
            .cloned()
            .map(ValueFilter::eq)
            .collect()
    }
}

/// Up to `n` equal-frequency cut points of `values`, ascending and distinct.
///
/// When there are no more than `n` distinct values, the distinct values
/// themselves are returned.
pub fn binned_thresholds(mut values: Vec<Value>, n: usize) -> Vec<Value> {
    values.sort();
    let unique = distinct(values.clone());
    if unique.len() <= n {
        return unique;
    }
    let mut cuts: Vec<Value> = Vec::with_capacity(n);
    for i in 1..=n {
        let v = &values[i * values.len() / (n + 1)];
        if cuts.last() != Some(v) {
            cuts.push(v.clone());
        }
    }
    cuts
}

fn distinct(mut values: Vec<Value>) -> Vec<Value> {
    values.sort();
    values.dedup();
    values
}

/// Aggregators by capability id.
#[derive(Clone, Default)]
pub struct AggregatorRegistry {
    aggregators: BTreeMap<&'static str, Arc<dyn Aggregator>>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in aggregator.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(basic::Nop));
        registry.register(Arc::new(basic::Mode));
        registry.register(Arc::new(basic::Degree));
        registry.register(Arc::new(counting::Count));
        registry.register(Arc::new(counting::Proportion));
        registry.register(Arc::new(counting::CountDistinct));
        registry.register(Arc::new(numeric::Average));
        registry.register(Arc::new(numeric::Min));
        registry.register(Arc::new(numeric::Max));
        registry.register(Arc::new(numeric::Sum));
        registry
    }

    /// Register an aggregator, replacing any with the same id.
    pub fn register(&mut self, aggregator: Arc<dyn Aggregator>) {
        self.aggregators.insert(aggregator.id(), aggregator);
    }

    pub fn get(&self, id: &str) -> FeatureResult<&dyn Aggregator> {
        self.aggregators
            .get(id)
            .map(|a| a.as_ref())
            .ok_or_else(|| FeatureError::UnknownAggregator { id: id.to_string() })
    }

    /// All aggregators in id order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Aggregator> {
        self.aggregators.values().map(|a| a.as_ref())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.aggregators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.aggregators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}

impl std::fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
