//! Aggregators that pass a value through: nop, mode, degree.

use std::collections::BTreeMap;

use crate::feature::{CompareOp, ValueFilter};
use crate::graph::Value;
use crate::source::SourceProfile;

use super::Aggregator;

/// The single related value itself.
///
/// Only valid for sources with at most one row per entity.
pub struct Nop;

impl Aggregator for Nop {
    fn id(&self) -> &'static str {
        "nop"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        !profile.is_item_source && profile.single_value && profile.row_count > 0
    }

    fn threshold_op(&self, profile: &SourceProfile) -> CompareOp {
        if profile.continuous {
            CompareOp::Ge
        } else {
            CompareOp::Eq
        }
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        values.first().map(|v| (*v).clone())
    }
}

/// Most frequent related value; ties resolve to the smallest value.
pub struct Mode;

impl Aggregator for Mode {
    fn id(&self) -> &'static str {
        "mode"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        !profile.is_item_source && !profile.continuous && profile.row_count > 0
    }

    fn threshold_op(&self, _profile: &SourceProfile) -> CompareOp {
        CompareOp::Eq
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        let mut counts: BTreeMap<&Value, usize> = BTreeMap::new();
        for v in values {
            *counts.entry(*v).or_insert(0) += 1;
        }
        let mut best: Option<(&Value, usize)> = None;
        for (value, count) in counts {
            match best {
                Some((_, c)) if count <= c => {}
                _ => best = Some((value, count)),
            }
        }
        best.map(|(v, _)| v.clone())
    }
}

/// Number of related items.
pub struct Degree;

impl Aggregator for Degree {
    fn id(&self) -> &'static str {
        "degree"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        profile.is_item_source
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        Some(Value::Num(values.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(continuous: bool, single_value: bool, item: bool) -> SourceProfile {
        SourceProfile {
            is_item_source: item,
            is_core: false,
            continuous,
            single_value,
            distinct_values: vec![],
            row_count: 3,
        }
    }

    #[test]
    fn mode_breaks_ties_by_smallest_value() {
        let m = Value::from("m");
        let f = Value::from("f");
        assert_eq!(Mode.aggregate(&[&m, &f, &m, &f], None), Some(Value::from("f")));
        assert_eq!(Mode.aggregate(&[&m, &f, &m], None), Some(Value::from("m")));
        assert_eq!(Mode.aggregate(&[], None), None);
    }

    #[test]
    fn nop_requires_single_value_attribute() {
        assert!(Nop.applies_to(&profile(false, true, false)));
        assert!(!Nop.applies_to(&profile(false, false, false)));
        assert!(!Nop.applies_to(&profile(false, true, true)));
        assert_eq!(Nop.threshold_op(&profile(true, true, false)), CompareOp::Ge);
        assert_eq!(Nop.threshold_op(&profile(false, true, false)), CompareOp::Eq);
    }

    #[test]
    fn degree_counts_rows() {
        let a = Value::from("actor");
        assert_eq!(Degree.aggregate(&[&a, &a], None), Some(Value::Num(2.0)));
        assert_eq!(Degree.aggregate(&[], None), Some(Value::Num(0.0)));
        assert!(Degree.applies_to(&profile(false, false, true)));
        assert!(!Degree.applies_to(&profile(false, false, false)));
    }
}
