//! Split scoring with the G statistic.
//!
//! A candidate split is a 2×k contingency table: pass/fail on the feature
//! against the k label values, weighted by instance weight. The score is
//! the likelihood-ratio statistic `G = 2 Σ O ln(O/E)` with its chi-square
//! p-value.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::feature::FeatureVector;

use super::state::GrowthState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
    /// False when the p-value was bounded by a prior score instead of computed.
    pub exact: bool,
}

impl ScoreResult {
    /// Score of a table with an empty branch or a single label.
    pub fn degenerate() -> Self {
        Self {
            statistic: 0.0,
            df: 0,
            p_value: 1.0,
            exact: true,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.df == 0
    }

    /// Lower p-value wins; equal p-values go to the larger statistic.
    /// Strict, so among equal scores the first one seen is kept.
    pub fn is_better_than(&self, other: Option<&ScoreResult>) -> bool {
        match other {
            None => true,
            Some(other) => {
                self.p_value < other.p_value
                    || (self.p_value == other.p_value && self.statistic > other.statistic)
            }
        }
    }
}

pub trait SplitScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score `feature` as a split of `state`'s instances under `labels`
    /// (aligned with `state.instances()`, possibly permuted).
    ///
    /// `prior` is the best score seen so far at this node; a scorer may
    /// return an inexact result when the candidate provably cannot beat it.
    fn score(
        &self,
        state: &GrowthState,
        labels: &[usize],
        feature: &FeatureVector,
        prior: Option<&ScoreResult>,
    ) -> ScoreResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChiSquareScorer;

impl SplitScorer for ChiSquareScorer {
    fn name(&self) -> &'static str {
        "chi_square"
    }

    fn score(
        &self,
        state: &GrowthState,
        labels: &[usize],
        feature: &FeatureVector,
        prior: Option<&ScoreResult>,
    ) -> ScoreResult {
        let k = state.class_values().len();
        let mut table = vec![vec![0.0; k]; 2];
        for (instance, label) in state.instances().iter().zip(labels) {
            let row = if feature.passes(instance.id) { 0 } else { 1 };
            table[row][*label] += instance.weight;
        }
        let (statistic, df) = g_statistic(&table);
        if df == 0 {
            return ScoreResult::degenerate();
        }
        // Same df and no larger G means a p-value no smaller than the prior's.
        if let Some(prior) = prior {
            if prior.df == df && statistic <= prior.statistic {
                return ScoreResult {
                    statistic,
                    df,
                    p_value: prior.p_value,
                    exact: false,
                };
            }
        }
        ScoreResult {
            statistic,
            df,
            p_value: chi_square_sf(statistic, df),
            exact: true,
        }
    }
}

/// G statistic and degrees of freedom of a contingency table.
///
/// Empty rows and columns do not count towards the degrees of freedom.
pub fn g_statistic(table: &[Vec<f64>]) -> (f64, usize) {
    let rows: Vec<f64> = table.iter().map(|r| r.iter().sum()).collect();
    let cols_len = table.iter().map(Vec::len).max().unwrap_or(0);
    let cols: Vec<f64> = (0..cols_len)
        .map(|c| table.iter().map(|r| r.get(c).copied().unwrap_or(0.0)).sum())
        .collect();
    let total: f64 = rows.iter().sum();
    let live_rows = rows.iter().filter(|r| **r > 0.0).count();
    let live_cols = cols.iter().filter(|c| **c > 0.0).count();
    if total <= 0.0 || live_rows < 2 || live_cols < 2 {
        return (0.0, 0);
    }
    let mut g = 0.0;
    for (r, row) in table.iter().enumerate() {
        for (c, observed) in row.iter().enumerate() {
            if *observed > 0.0 {
                let expected = rows[r] * cols[c] / total;
                g += observed * (observed / expected).ln();
            }
        }
    }
    ((2.0 * g).max(0.0), (live_rows - 1) * (live_cols - 1))
}

/// Upper-tail probability of the chi-square distribution.
pub fn chi_square_sf(x: f64, df: usize) -> f64 {
    if df == 0 {
        return 1.0;
    }
    if x <= 0.0 {
        return 1.0;
    }
    regularized_gamma_q(df as f64 / 2.0, x / 2.0)
}

const EPS: f64 = 1e-15;
const FPMIN: f64 = 1e-300;
const MAX_ITER: usize = 1000;

fn ln_gamma(z: f64) -> f64 {
    const G: f64 = 7.0;
    const P: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if z < 0.5 {
        return (PI / (PI * z).sin()).ln() - ln_gamma(1.0 - z);
    }
    let z = z - 1.0;
    let mut x = P[0];
    for (i, p) in P.iter().enumerate().skip(1) {
        x += p / (z + i as f64);
    }
    let t = z + G + 0.5;
    0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + x.ln()
}

/// Q(a, x) = Γ(a, x) / Γ(a).
fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_continued_fraction(a, x)
    }
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut del = 1.0 / a;
    let mut sum = del;
    for _ in 0..MAX_ITER {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    (sum.ln() - x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_q_continued_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}
