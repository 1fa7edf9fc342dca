//! Summary statistics of a sample: bias-corrected higher moments,
//! sample standard deviation, missing results for too-small inputs.

use std::fmt;

/// Central moment sums below this magnitude are floating point noise.
const FP_EPSILON: f64 = 1e-14;

fn zero_out_fperr(v: f64) -> f64 {
    if v.abs() < FP_EPSILON { 0.0 } else { v }
}

fn mean_of(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sums of the 2nd, 3rd and 4th powers of deviations from the mean.
fn central_sums(values: &[f64]) -> (f64, f64, f64) {
    let mean = mean_of(values);
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (zero_out_fperr(m2), zero_out_fperr(m3), zero_out_fperr(m4))
}

/// One summary statistic of a window of observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Kurtosis,
    MaxAbsoluteDeviation,
    Max,
    Mean,
    Median,
    Min,
    Skew,
    Std,
    Count,
}

impl Statistic {
    /// Every statistic, in output column order.
    pub const ALL: [Statistic; 9] = [
        Statistic::Kurtosis,
        Statistic::MaxAbsoluteDeviation,
        Statistic::Max,
        Statistic::Mean,
        Statistic::Median,
        Statistic::Min,
        Statistic::Skew,
        Statistic::Std,
        Statistic::Count,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Statistic::Kurtosis => "KURTOSIS",
            Statistic::MaxAbsoluteDeviation => "MAX_ABSOLUTE_DEVIATION",
            Statistic::Max => "MAX",
            Statistic::Mean => "MEAN",
            Statistic::Median => "MEDIAN",
            Statistic::Min => "MIN",
            Statistic::Skew => "SKEW",
            Statistic::Std => "STD",
            Statistic::Count => "COUNT",
        }
    }

    /// Compute the statistic. `None` when it is undefined for the input.
    pub fn compute(self, values: &[f64]) -> Option<f64> {
        match self {
            Statistic::Kurtosis => kurtosis(values),
            Statistic::MaxAbsoluteDeviation => mean_absolute_deviation(values),
            Statistic::Max => values.iter().copied().reduce(f64::max),
            Statistic::Mean => mean(values),
            Statistic::Median => median(values),
            Statistic::Min => values.iter().copied().reduce(f64::min),
            Statistic::Skew => skew(values),
            Statistic::Std => std(values),
            Statistic::Count => Some(values.len() as f64),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() { None } else { Some(mean_of(values)) }
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (`n - 1` denominator).
pub fn std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean_of(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (n - 1) as f64).sqrt())
}

/// Mean absolute deviation about the mean.
pub fn mean_absolute_deviation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).abs()).sum::<f64>() / values.len() as f64)
}

/// Bias-corrected sample skewness; 0 for constant input, undefined below
/// three values.
pub fn skew(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 3 {
        return None;
    }
    let (m2, m3, _) = central_sums(values);
    if m2 == 0.0 {
        return Some(0.0);
    }
    Some((n * (n - 1.0).sqrt() / (n - 2.0)) * (m3 / m2.powf(1.5)))
}

/// Bias-corrected excess kurtosis (Fisher); 0 for constant input,
/// undefined below four values.
pub fn kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 4 {
        return None;
    }
    let (m2, _, m4) = central_sums(values);
    let numerator = n * (n + 1.0) * (n - 1.0) * m4;
    let denominator = (n - 2.0) * (n - 3.0) * m2 * m2;
    if denominator == 0.0 {
        return Some(0.0);
    }
    let adj = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    Some(numerator / denominator - adj)
}
