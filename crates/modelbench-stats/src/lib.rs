//! Statistics kernel
//!
//! Pure functions over `&[f64]` shared by every evaluation agent.
//! Empty-input policy: all reducers return 0 and never fail; the caller
//! decides whether zero is meaningful.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Nearest-rank percentile on a sorted copy.
///
/// `P(p) = sorted[clamp(ceil(p/100 * n) - 1, 0, n-1)]` for `n > 0`, else 0.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as isize - 1;
    sorted[rank.clamp(0, n as isize - 1) as usize]
}

/// Arithmetic mean; 0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance `Σ(x-μ)²/n`; 0 for empty input.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for empty input.
pub fn stddev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Sample variance `Σ(x-μ)²/(n-1)`, used by the inferential tests.
fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Result of Welch's unequal-variance t-test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WelchTTest {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    /// Two-tailed
    pub p_value: f64,
}

/// Welch's t-test with Welch–Satterthwaite degrees of freedom.
///
/// Degenerate inputs (either side empty, or zero variance on both sides)
/// return `{0, 0, 1}`: no evidence of a difference.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> WelchTTest {
    let no_evidence = WelchTTest {
        t_statistic: 0.0,
        degrees_of_freedom: 0.0,
        p_value: 1.0,
    };
    if a.len() < 2 || b.len() < 2 {
        return no_evidence;
    }

    let (n_a, n_b) = (a.len() as f64, b.len() as f64);
    let (var_a, var_b) = (sample_variance(a), sample_variance(b));
    let se2 = var_a / n_a + var_b / n_b;
    if se2 <= 0.0 {
        return no_evidence;
    }

    let t = (mean(b) - mean(a)) / se2.sqrt();
    let df = se2.powi(2)
        / ((var_a / n_a).powi(2) / (n_a - 1.0) + (var_b / n_b).powi(2) / (n_b - 1.0));
    if !df.is_finite() || df <= 0.0 {
        return no_evidence;
    }

    let dist = match StudentsT::new(0.0, 1.0, df) {
        Ok(d) => d,
        Err(_) => return no_evidence,
    };
    let p = (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0);

    WelchTTest {
        t_statistic: t,
        degrees_of_freedom: df,
        p_value: p,
    }
}

/// Result of the Mann–Whitney U test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MannWhitneyU {
    pub u_statistic: f64,
    /// Two-tailed
    pub p_value: f64,
    /// True when the normal approximation was used (`min(n₁,n₂) ≥ 8`)
    pub approximate: bool,
}

/// Mann–Whitney U with midranks for ties. Uses the normal approximation
/// when both samples have at least 8 observations and the exact U
/// distribution otherwise.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> MannWhitneyU {
    if a.is_empty() || b.is_empty() {
        return MannWhitneyU {
            u_statistic: 0.0,
            p_value: 1.0,
            approximate: false,
        };
    }

    let (n_a, n_b) = (a.len(), b.len());
    let mut pooled: Vec<(f64, usize)> = a
        .iter()
        .map(|&x| (x, 0usize))
        .chain(b.iter().map(|&x| (x, 1usize)))
        .collect();
    pooled.sort_by(|x, y| x.0.total_cmp(&y.0));

    // Midranks over tie groups
    let mut ranks = vec![0.0f64; pooled.len()];
    let mut i = 0;
    while i < pooled.len() {
        let mut j = i;
        while j + 1 < pooled.len() && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        let midrank = (i + j) as f64 / 2.0 + 1.0;
        for rank in ranks.iter_mut().take(j + 1).skip(i) {
            *rank = midrank;
        }
        i = j + 1;
    }

    let rank_sum_a: f64 = pooled
        .iter()
        .zip(&ranks)
        .filter(|((_, side), _)| *side == 0)
        .map(|(_, r)| r)
        .sum();
    let u_a = rank_sum_a - (n_a * (n_a + 1)) as f64 / 2.0;
    let u_b = (n_a * n_b) as f64 - u_a;
    let u = u_a.min(u_b);

    if n_a.min(n_b) >= 8 {
        let mu = (n_a * n_b) as f64 / 2.0;
        let sigma = ((n_a * n_b * (n_a + n_b + 1)) as f64 / 12.0).sqrt();
        if sigma == 0.0 {
            return MannWhitneyU {
                u_statistic: u,
                p_value: 1.0,
                approximate: true,
            };
        }
        // Continuity correction
        let z = (u - mu + 0.5) / sigma;
        let normal = Normal::new(0.0, 1.0).expect("unit normal");
        let p = (2.0 * normal.cdf(z)).clamp(0.0, 1.0);
        MannWhitneyU {
            u_statistic: u,
            p_value: p,
            approximate: true,
        }
    } else {
        MannWhitneyU {
            u_statistic: u,
            p_value: exact_mann_whitney_p(n_a, n_b, u),
            approximate: false,
        }
    }
}

/// Exact two-tailed p-value for small samples: P(U ≤ u_obs) doubled.
///
/// Counts rank arrangements by dynamic programming over the distribution
/// of the U statistic, which works for any small (n₁, n₂) pair without a
/// hard-coded critical table.
fn exact_mann_whitney_p(n_a: usize, n_b: usize, u_obs: f64) -> f64 {
    let max_u = n_a * n_b;
    // dist[i][j][u] = number of rank arrangements of i A-observations and
    // j B-observations with U statistic exactly u, via the recurrence
    // f(u; i, j) = f(u - j; i - 1, j) + f(u; i, j - 1)
    let mut dist = vec![vec![vec![0.0f64; max_u + 1]; n_b + 1]; n_a + 1];
    for i in 0..=n_a {
        for j in 0..=n_b {
            for u in 0..=max_u {
                dist[i][j][u] = if i == 0 || j == 0 {
                    if u == 0 { 1.0 } else { 0.0 }
                } else {
                    let from_a = if u >= j { dist[i - 1][j][u - j] } else { 0.0 };
                    from_a + dist[i][j - 1][u]
                };
            }
        }
    }
    let total: f64 = dist[n_a][n_b].iter().sum();
    if total == 0.0 {
        return 1.0;
    }
    let cutoff = (u_obs.floor() as usize).min(max_u);
    let tail: f64 = dist[n_a][n_b].iter().take(cutoff + 1).sum();
    (2.0 * tail / total).clamp(0.0, 1.0)
}

/// Cohen's d with pooled standard deviation; 0 for degenerate input.
pub fn cohens_d(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }
    let (n_a, n_b) = (a.len() as f64, b.len() as f64);
    let pooled = (((n_a - 1.0) * sample_variance(a) + (n_b - 1.0) * sample_variance(b))
        / (n_a + n_b - 2.0))
        .sqrt();
    if pooled == 0.0 {
        return 0.0;
    }
    (mean(b) - mean(a)) / pooled
}

/// Symmetric confidence interval around the mean using the t quantile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

/// Default level 0.95. Empty input yields `(0, 0)`; a single observation
/// yields a degenerate interval at the mean.
pub fn confidence_interval(values: &[f64], level: f64) -> ConfidenceInterval {
    let level = level.clamp(0.0, 1.0);
    if values.is_empty() {
        return ConfidenceInterval {
            lower: 0.0,
            upper: 0.0,
            level,
        };
    }
    let mu = mean(values);
    if values.len() < 2 {
        return ConfidenceInterval {
            lower: mu,
            upper: mu,
            level,
        };
    }
    let n = values.len() as f64;
    let se = (sample_variance(values) / n).sqrt();
    let df = n - 1.0;
    let half = match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => dist.inverse_cdf(0.5 + level / 2.0) * se,
        Err(_) => 0.0,
    };
    ConfidenceInterval {
        lower: mu - half,
        upper: mu + half,
        level,
    }
}

/// One histogram bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Equal-width histogram. Empty input or `bins == 0` yields no buckets;
/// constant input yields a single bucket holding everything.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len() as u64,
        }];
    }
    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + i as f64 * width,
            upper: min + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    for &v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_nearest_rank() {
        let values = [100.0, 120.0, 110.0];
        assert_eq!(percentile(&values, 50.0), 110.0);
        assert_eq!(percentile(&values, 95.0), 120.0);
        assert_eq!(percentile(&values, 99.0), 120.0);
        assert_eq!(percentile(&values, 0.0), 100.0);
    }

    #[test]
    fn empty_inputs_reduce_to_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(stddev(&[]), 0.0);
        assert_eq!(cohens_d(&[], &[1.0, 2.0]), 0.0);
        let ci = confidence_interval(&[], 0.95);
        assert_eq!((ci.lower, ci.upper), (0.0, 0.0));
        assert!(histogram(&[], 10).is_empty());
    }

    #[test]
    fn population_stddev() {
        // Population variance of [2, 4, 4, 4, 5, 5, 7, 9] is 4
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((variance(&values) - 4.0).abs() < 1e-12);
        assert!((stddev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn welch_detects_separated_samples() {
        let a = [10.0, 11.0, 10.5, 9.8, 10.2, 10.1];
        let b = [20.0, 21.0, 19.5, 20.5, 20.2, 20.8];
        let result = welch_t_test(&a, &b);
        assert!(result.t_statistic > 10.0);
        assert!(result.p_value < 0.001);
        assert!(result.degrees_of_freedom > 1.0);
    }

    #[test]
    fn welch_identical_samples_has_no_evidence() {
        let a = [5.0, 5.0, 5.0];
        let result = welch_t_test(&a, &a);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.t_statistic, 0.0);
    }

    #[test]
    fn welch_symmetric_in_sign() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [3.0, 4.0, 5.0, 6.0];
        let ab = welch_t_test(&a, &b);
        let ba = welch_t_test(&b, &a);
        assert!((ab.t_statistic + ba.t_statistic).abs() < 1e-12);
        assert!((ab.p_value - ba.p_value).abs() < 1e-12);
    }

    #[test]
    fn mann_whitney_large_uses_approximation() {
        let a: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..10).map(|i| (i + 20) as f64).collect();
        let result = mann_whitney_u(&a, &b);
        assert!(result.approximate);
        assert_eq!(result.u_statistic, 0.0);
        assert!(result.p_value < 0.001);
    }

    #[test]
    fn mann_whitney_small_uses_exact() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 11.0, 12.0];
        let result = mann_whitney_u(&a, &b);
        assert!(!result.approximate);
        assert_eq!(result.u_statistic, 0.0);
        // Fully separated 3v3: exact two-tailed p = 2 * 1/20 = 0.1
        assert!((result.p_value - 0.1).abs() < 1e-9);
    }

    #[test]
    fn mann_whitney_overlapping_is_insignificant() {
        let a = [1.0, 3.0, 5.0, 7.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let result = mann_whitney_u(&a, &b);
        assert!(result.p_value > 0.3);
    }

    #[test]
    fn cohens_d_pooled() {
        let a = [2.0, 4.0, 6.0, 8.0];
        let b = [4.0, 6.0, 8.0, 10.0];
        // Both sample SDs are sqrt(20/3); d = 2 / sqrt(20/3)
        let expected = 2.0 / (20.0f64 / 3.0).sqrt();
        assert!((cohens_d(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn confidence_interval_brackets_mean() {
        let values = [10.0, 12.0, 11.0, 9.0, 10.5, 11.5, 10.2, 9.8];
        let ci = confidence_interval(&values, 0.95);
        let mu = mean(&values);
        assert!(ci.lower < mu && mu < ci.upper);
        let wider = confidence_interval(&values, 0.99);
        assert!(wider.upper - wider.lower > ci.upper - ci.lower);
    }

    #[test]
    fn single_observation_interval_is_degenerate() {
        let ci = confidence_interval(&[42.0], 0.95);
        assert_eq!((ci.lower, ci.upper), (42.0, 42.0));
    }

    #[test]
    fn histogram_bins_cover_range() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let bins = histogram(&values, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 10);
        assert_eq!(bins[0].lower, 1.0);
        assert_eq!(bins[4].upper, 10.0);
    }

    #[test]
    fn histogram_constant_input() {
        let bins = histogram(&[5.0, 5.0, 5.0], 4);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 3);
    }
}
