//! Counting aggregators: count, proportion, count_distinct.

use std::collections::BTreeSet;

use crate::feature::ValueFilter;
use crate::graph::Value;
use crate::source::SourceProfile;

use super::Aggregator;

fn matching(values: &[&Value], filter: Option<&ValueFilter>) -> usize {
    match filter {
        Some(filter) => values.iter().filter(|v| filter.matches(v)).count(),
        None => values.len(),
    }
}

/// Number of related values that match the filter. Zero when there are none.
pub struct Count;

impl Aggregator for Count {
    fn id(&self) -> &'static str {
        "count"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        !profile.is_item_source && profile.row_count > 0
    }

    fn is_value_filtered(&self) -> bool {
        true
    }

    fn aggregate(&self, values: &[&Value], filter: Option<&ValueFilter>) -> Option<Value> {
        Some(Value::Num(matching(values, filter) as f64))
    }
}

/// Fraction of related values that match the filter. Missing when there are none.
pub struct Proportion;

impl Aggregator for Proportion {
    fn id(&self) -> &'static str {
        "proportion"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        !profile.is_item_source && profile.row_count > 0
    }

    fn is_value_filtered(&self) -> bool {
        true
    }

    fn aggregate(&self, values: &[&Value], filter: Option<&ValueFilter>) -> Option<Value> {
        if values.is_empty() {
            return None;
        }
        Some(Value::Num(
            matching(values, filter) as f64 / values.len() as f64,
        ))
    }
}

/// Number of distinct related values.
pub struct CountDistinct;

impl Aggregator for CountDistinct {
    fn id(&self) -> &'static str {
        "count_distinct"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        !profile.is_item_source && !profile.single_value
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        let distinct: BTreeSet<&Value> = values.iter().copied().collect();
        Some(Value::Num(distinct.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::filter_values;

    #[test]
    fn count_filters_rows() {
        let m = Value::from("m");
        let f = Value::from("f");
        let filter = ValueFilter::eq("m".into());
        assert_eq!(
            Count.aggregate(&[&m, &f, &m], Some(&filter)),
            Some(Value::Num(2.0))
        );
        assert_eq!(Count.aggregate(&[], Some(&filter)), Some(Value::Num(0.0)));
    }

    #[test]
    fn proportion_missing_without_rows() {
        let m = Value::from("m");
        let f = Value::from("f");
        let filter = ValueFilter::eq("m".into());
        assert_eq!(
            Proportion.aggregate(&[&m, &f], Some(&filter)),
            Some(Value::Num(0.5))
        );
        assert_eq!(Proportion.aggregate(&[], Some(&filter)), None);
    }

    #[test]
    fn continuous_filters_use_greater_than() {
        let profile = SourceProfile {
            is_item_source: false,
            is_core: false,
            continuous: true,
            single_value: false,
            distinct_values: (1..=9).map(|i| Value::Num(f64::from(i))).collect(),
            row_count: 9,
        };
        let filters = filter_values(&profile);
        assert_eq!(filters.len(), 2);
        assert!(filters.iter().all(|f| f.op == crate::feature::CompareOp::Gt));
        let big = Value::Num(100.0);
        assert!(filters[0].matches(&big));
    }

    #[test]
    fn count_distinct_ignores_repeats() {
        let a = Value::Num(1.0);
        let b = Value::Num(2.0);
        assert_eq!(
            CountDistinct.aggregate(&[&a, &b, &a], None),
            Some(Value::Num(2.0))
        );
    }
}
