//! Numeric aggregators over multi-valued continuous sources.

use crate::feature::ValueFilter;
use crate::graph::Value;
use crate::source::SourceProfile;

use super::Aggregator;

fn numbers(values: &[&Value]) -> Vec<f64> {
    values.iter().filter_map(|v| v.as_num()).collect()
}

fn applies(profile: &SourceProfile) -> bool {
    !profile.is_item_source && profile.continuous && !profile.single_value
}

pub struct Average;

impl Aggregator for Average {
    fn id(&self) -> &'static str {
        "average"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        applies(profile)
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        let nums = numbers(values);
        if nums.is_empty() {
            return None;
        }
        Some(Value::Num(nums.iter().sum::<f64>() / nums.len() as f64))
    }
}

pub struct Min;

impl Aggregator for Min {
    fn id(&self) -> &'static str {
        "min"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        applies(profile)
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        numbers(values).into_iter().reduce(f64::min).map(Value::Num)
    }
}

pub struct Max;

impl Aggregator for Max {
    fn id(&self) -> &'static str {
        "max"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        applies(profile)
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        numbers(values).into_iter().reduce(f64::max).map(Value::Num)
    }
}

/// Sum of related values. Missing, not zero, when there are none.
pub struct Sum;

impl Aggregator for Sum {
    fn id(&self) -> &'static str {
        "sum"
    }

    fn applies_to(&self, profile: &SourceProfile) -> bool {
        applies(profile)
    }

    fn aggregate(&self, values: &[&Value], _filter: Option<&ValueFilter>) -> Option<Value> {
        numbers(values).into_iter().reduce(|a, b| a + b).map(Value::Num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions() {
        let vals = [Value::Num(2.0), Value::Num(4.0), Value::Num(9.0)];
        let refs: Vec<&Value> = vals.iter().collect();
        assert_eq!(Average.aggregate(&refs, None), Some(Value::Num(5.0)));
        assert_eq!(Min.aggregate(&refs, None), Some(Value::Num(2.0)));
        assert_eq!(Max.aggregate(&refs, None), Some(Value::Num(9.0)));
        assert_eq!(Sum.aggregate(&refs, None), Some(Value::Num(15.0)));
    }

    #[test]
    fn empty_is_missing() {
        assert_eq!(Average.aggregate(&[], None), None);
        assert_eq!(Sum.aggregate(&[], None), None);
        assert_eq!(Min.aggregate(&[], None), None);
    }
}
