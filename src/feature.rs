//! Feature settings: one candidate split test.
//!
//! A [`FeatureSetting`] combines a [`Source`], an aggregator capability id,
//! an optional value filter, and a threshold test on the aggregate. It is
//! immutable; its canonical string (e.g. `count([<acted_in:actor].gender=m)>=2`)
//! is the cache key throughout induction.
//!
//! Evaluating a setting over a population yields a [`FeatureVector`], the set
//! of entities that pass. Entities with no aggregate value fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregator::{Aggregator, AggregatorRegistry};
use crate::error::{DataResult, FeatureError, FeatureResult};
use crate::graph::{ItemId, RelationalStore, Value};
use crate::source::{Source, SourceData};

/// Comparison applied to an aggregate or a related value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Gt,
    Ge,
}

impl CompareOp {
    /// Evaluate `lhs op rhs`. Values of different variants never match.
    pub fn holds(self, lhs: &Value, rhs: &Value) -> bool {
        use std::cmp::Ordering;
        match (self, lhs.compare(rhs)) {
            (CompareOp::Eq, Some(Ordering::Equal)) => true,
            (CompareOp::Gt, Some(Ordering::Greater)) => true,
            (CompareOp::Ge, Some(Ordering::Greater | Ordering::Equal)) => true,
            _ => false,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Restricts which related rows an aggregator counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueFilter {
    pub op: CompareOp,
    pub value: Value,
}

impl ValueFilter {
    pub fn eq(value: Value) -> Self {
        Self {
            op: CompareOp::Eq,
            value,
        }
    }

    pub fn gt(value: Value) -> Self {
        Self {
            op: CompareOp::Gt,
            value,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        self.op.holds(value, &self.value)
    }
}

impl fmt::Display for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.value)
    }
}

/// One candidate relational feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSetting {
    source: Source,
    aggregator: String,
    filter: Option<ValueFilter>,
    op: CompareOp,
    threshold: Value,
}

impl FeatureSetting {
    pub fn new(
        source: Source,
        aggregator: &str,
        filter: Option<ValueFilter>,
        op: CompareOp,
        threshold: Value,
    ) -> FeatureResult<Self> {
        if aggregator.is_empty() {
            return Err(FeatureError::NullAggregator);
        }
        Ok(Self {
            source,
            aggregator: aggregator.to_string(),
            filter,
            op,
            threshold,
        })
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn aggregator(&self) -> &str {
        &self.aggregator
    }

    pub fn filter(&self) -> Option<&ValueFilter> {
        self.filter.as_ref()
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn threshold(&self) -> &Value {
        &self.threshold
    }

    pub fn is_value_filtered(&self) -> bool {
        self.filter.is_some()
    }

    /// The canonical string form.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Whether the feature reads the given attribute.
    pub fn mentions(&self, attr: &str) -> bool {
        self.source.mentions(attr)
    }

    pub fn rename_attr(&mut self, renames: &BTreeMap<String, String>) -> bool {
        self.source.rename_attr(renames)
    }

    /// Threshold test on an entity's aggregate. Missing aggregates fail.
    pub fn passes(&self, aggregate: Option<&Value>) -> bool {
        aggregate.is_some_and(|v| self.op.holds(v, &self.threshold))
    }

    /// Evaluate over every entity of `population` using already-read source rows.
    pub fn compute(
        &self,
        aggregator: &dyn Aggregator,
        data: &SourceData,
        population: &[ItemId],
    ) -> FeatureVector {
        let groups = data.table.group_by_entity();
        let mut passing = HashSet::new();
        for id in population {
            let values = groups.get(id).map(Vec::as_slice).unwrap_or(&[]);
            if self.passes(aggregator.aggregate(values, self.filter.as_ref()).as_ref()) {
                passing.insert(*id);
            }
        }
        FeatureVector {
            passing,
            evaluated: population.len(),
        }
    }
}

impl fmt::Display for FeatureSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}", self.aggregator, self.source)?;
        if let Some(filter) = &self.filter {
            write!(f, "{filter}")?;
        }
        write!(f, "){}{}", self.op, self.threshold)
    }
}

/// Entities that pass a feature setting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    passing: HashSet<ItemId>,
    evaluated: usize,
}

impl FeatureVector {
    pub fn from_passing(passing: impl IntoIterator<Item = ItemId>, evaluated: usize) -> Self {
        Self {
            passing: passing.into_iter().collect(),
            evaluated,
        }
    }

    pub fn passes(&self, id: ItemId) -> bool {
        self.passing.contains(&id)
    }

    pub fn pass_count(&self) -> usize {
        self.passing.len()
    }

    pub fn evaluated(&self) -> usize {
        self.evaluated
    }
}

/// Memoized source rows and feature vectors for one population.
///
/// Collective inference invalidates entries that read an attribute after the
/// attribute has been rewritten.
pub struct FeatureCache {
    population: Vec<ItemId>,
    sources: HashMap<Source, Arc<SourceData>>,
    vectors: HashMap<String, (FeatureSetting, Arc<FeatureVector>)>,
}

impl FeatureCache {
    pub fn new(population: Vec<ItemId>) -> Self {
        Self {
            population,
            sources: HashMap::new(),
            vectors: HashMap::new(),
        }
    }

    pub fn population(&self) -> &[ItemId] {
        &self.population
    }

    pub fn source_data(
        &mut self,
        store: &dyn RelationalStore,
        source: &Source,
    ) -> DataResult<Arc<SourceData>> {
        if let Some(data) = self.sources.get(source) {
            return Ok(Arc::clone(data));
        }
        let data = Arc::new(source.init(store, &self.population)?);
        self.sources.insert(source.clone(), Arc::clone(&data));
        Ok(data)
    }

    pub fn vector(
        &mut self,
        store: &dyn RelationalStore,
        registry: &AggregatorRegistry,
        feature: &FeatureSetting,
    ) -> FeatureResult<Arc<FeatureVector>> {
        let key = feature.key();
        if let Some((_, vector)) = self.vectors.get(&key) {
            return Ok(Arc::clone(vector));
        }
        let aggregator = registry.get(feature.aggregator())?;
        let data = self.source_data(store, feature.source())?;
        let vector = Arc::new(feature.compute(aggregator, &data, &self.population));
        self.vectors
            .insert(key, (feature.clone(), Arc::clone(&vector)));
        Ok(vector)
    }

    /// Look up a vector computed earlier.
    pub fn cached(&self, feature: &FeatureSetting) -> FeatureResult<Arc<FeatureVector>> {
        self.vectors
            .get(&feature.key())
            .map(|(_, v)| Arc::clone(v))
            .ok_or_else(|| FeatureError::MissingTable {
                feature: feature.key(),
            })
    }

    /// Drop every entry that reads `attr`. Returns the number of entries dropped.
    pub fn invalidate_matching(&mut self, attr: &str) -> usize {
        let before = self.sources.len() + self.vectors.len();
        self.sources.retain(|source, _| !source.mentions(attr));
        self.vectors.retain(|_, (feature, _)| !feature.mentions(attr));
        before - (self.sources.len() + self.vectors.len())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.vectors.clear();
    }
}
