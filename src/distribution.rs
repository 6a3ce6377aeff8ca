//! Discrete probability distributions over label values.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Weighted counts over string-valued labels.
///
/// Values iterate in ascending order, which fixes every tie-break that
/// depends on iteration order (argmax, sampling).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscreteDistribution {
    counts: BTreeMap<String, f64>,
    total: f64,
}

impl DiscreteDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut dist = Self::new();
        for (value, count) in counts {
            dist.add(value, count);
        }
        dist
    }

    /// Add `weight` observations of `value`.
    pub fn add(&mut self, value: impl Into<String>, weight: f64) {
        *self.counts.entry(value.into()).or_insert(0.0) += weight;
        self.total += weight;
    }

    /// Add every count of `other` into this distribution.
    pub fn merge(&mut self, other: &DiscreteDistribution) {
        for (value, count) in &other.counts {
            self.add(value.clone(), *count);
        }
    }

    pub fn count(&self, value: &str) -> f64 {
        self.counts.get(value).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total <= 0.0
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn counts(&self) -> &BTreeMap<String, f64> {
        &self.counts
    }

    /// Relative frequency of `value`; zero for an empty distribution.
    pub fn probability(&self, value: &str) -> f64 {
        if self.total <= 0.0 {
            0.0
        } else {
            self.count(value) / self.total
        }
    }

    /// Laplace-corrected probability over `num_values` possible values.
    pub fn laplace_probability(&self, value: &str, num_values: usize) -> f64 {
        (self.count(value) + 1.0) / (self.total + num_values as f64)
    }

    /// Probability mixed with a uniform prior of weight `m` over `num_values`.
    pub fn smoothed_probability(&self, value: &str, num_values: usize, m: f64) -> f64 {
        if num_values == 0 {
            return 0.0;
        }
        let prior = 1.0 / num_values as f64;
        (self.count(value) + m * prior) / (self.total + m)
    }

    /// The value with the largest count; ties go to the smallest value.
    pub fn mode(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (value, count) in &self.counts {
            match best {
                Some((_, c)) if *count <= c => {}
                _ => best = Some((value, *count)),
            }
        }
        best.map(|(v, _)| v)
    }

    /// Count of the most frequent value.
    pub fn max_count(&self) -> f64 {
        self.counts.values().copied().fold(0.0, f64::max)
    }

    /// Counts rescaled to sum to one.
    pub fn normalized(&self) -> DiscreteDistribution {
        if self.total <= 0.0 {
            return self.clone();
        }
        DiscreteDistribution {
            counts: self
                .counts
                .iter()
                .map(|(v, c)| (v.clone(), c / self.total))
                .collect(),
            total: 1.0,
        }
    }

    /// Draw a value with probability proportional to its count.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.total <= 0.0 {
            return None;
        }
        let target = rng.r#gen::<f64>() * self.total;
        let mut cumulative = 0.0;
        let mut last = None;
        for (value, count) in &self.counts {
            if *count <= 0.0 {
                continue;
            }
            cumulative += count;
            last = Some(value.as_str());
            if target < cumulative {
                return last;
            }
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn probabilities_from_counts() {
        let d = DiscreteDistribution::from_counts([("a", 3.0), ("b", 1.0)]);
        assert_eq!(d.total(), 4.0);
        assert!((d.probability("a") - 0.75).abs() < 1e-12);
        assert_eq!(d.probability("c"), 0.0);
        assert!((d.laplace_probability("c", 3) - 1.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn mode_ties_go_to_smallest() {
        let d = DiscreteDistribution::from_counts([("m", 2.0), ("f", 2.0), ("x", 1.0)]);
        assert_eq!(d.mode(), Some("f"));
        assert_eq!(DiscreteDistribution::new().mode(), None);
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = DiscreteDistribution::from_counts([("a", 1.0)]);
        a.merge(&DiscreteDistribution::from_counts([("a", 2.0), ("b", 1.0)]));
        assert_eq!(a.count("a"), 3.0);
        assert_eq!(a.total(), 4.0);
    }

    #[test]
    fn normalized_sums_to_one() {
        let d = DiscreteDistribution::from_counts([("a", 2.0), ("b", 6.0)]).normalized();
        let sum: f64 = d.counts().values().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((d.probability("b") - 0.75).abs() < 1e-12);
    }

    #[test]
    fn sampling_never_returns_zero_count_value() {
        let d = DiscreteDistribution::from_counts([("a", 0.0), ("b", 1.0)]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..100 {
            assert_eq!(d.sample(&mut rng), Some("b"));
        }
        assert_eq!(DiscreteDistribution::new().sample(&mut rng), None);
    }

    #[test]
    fn sampling_tracks_probabilities() {
        let d = DiscreteDistribution::from_counts([("a", 1.0), ("b", 3.0)]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let hits = (0..4000).filter(|_| d.sample(&mut rng) == Some("b")).count();
        let frac = hits as f64 / 4000.0;
        assert!((frac - 0.75).abs() < 0.05, "got {frac}");
    }
}
