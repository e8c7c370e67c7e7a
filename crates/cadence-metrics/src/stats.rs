//! Statistics Engine: count, sum, mean, interpolated p75, sample deviation.
//!
//! Aggregates are kept in full precision. Rounding happens only in
//! [`crate::report`].

use serde::Serialize;

/// Aggregate over a multiset of minute values.
///
/// Fields that have no meaning for the sample size are `None`: everything
/// but `count` for an empty set, `stdev` for fewer than two values.
///
/// # Examples
///
/// ```
/// use cadence_metrics::stats::Aggregate;
///
/// let agg = Aggregate::from_minutes(&[10.0, 20.0, 30.0, 40.0]);
/// assert_eq!(agg.count, 4);
/// assert_eq!(agg.sum, Some(100.0));
/// assert_eq!(agg.mean, Some(25.0));
/// assert_eq!(agg.p75, Some(32.5));
///
/// let empty = Aggregate::from_minutes(&[]);
/// assert_eq!(empty.count, 0);
/// assert!(empty.mean.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub count: usize,
    pub sum: Option<f64>,
    pub mean: Option<f64>,
    pub p75: Option<f64>,
    pub stdev: Option<f64>,
}

impl Aggregate {
    /// Aggregate arbitrary minute values.
    pub fn from_minutes(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let sum: f64 = values.iter().sum();
        Self {
            count: values.len(),
            sum: Some(sum),
            mean: Some(sum / values.len() as f64),
            p75: percentile_r7(&sorted, 0.75),
            stdev: sample_stdev(values),
        }
    }

    /// Aggregate delta values given in hundredths of a minute.
    ///
    /// Every statistic is computed on the integer-valued centiminutes and
    /// scaled to minutes as the last step, so sums are exact and the result
    /// does not depend on the order of `values`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cadence_metrics::stats::Aggregate;
    ///
    /// let agg = Aggregate::from_centiminutes(&[0, 6667]);
    /// assert_eq!(agg.sum, Some(66.67));
    /// assert_eq!(agg.mean, Some(33.335));
    /// ```
    pub fn from_centiminutes(values: &[i64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted: Vec<f64> = values.iter().map(|&c| c as f64).collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let total: f64 = sorted.iter().sum();
        Self {
            count: sorted.len(),
            sum: Some(total / 100.0),
            mean: Some(total / n / 100.0),
            p75: percentile_r7(&sorted, 0.75).map(|v| v / 100.0),
            stdev: sample_stdev(&sorted).map(|v| v / 100.0),
        }
    }
}

/// Quantile of ascending `sorted` values by linear interpolation between
/// order statistics (Hyndman-Fan type 7).
///
/// Returns `None` for an empty slice.
///
/// # Examples
///
/// ```
/// use cadence_metrics::stats::percentile_r7;
///
/// assert_eq!(percentile_r7(&[10.0, 20.0, 30.0, 40.0], 0.75), Some(32.5));
/// assert_eq!(percentile_r7(&[7.0], 0.75), Some(7.0));
/// assert_eq!(percentile_r7(&[], 0.75), None);
/// ```
pub fn percentile_r7(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Sample standard deviation with the `n - 1` denominator.
///
/// Two passes: mean first, then the sum of squared deviations. Returns
/// `None` for fewer than two values.
///
/// # Examples
///
/// ```
/// use cadence_metrics::stats::sample_stdev;
///
/// let s = sample_stdev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
/// assert!((s - 2.138).abs() < 1e-3);
/// assert!(sample_stdev(&[3.0]).is_none());
/// ```
pub fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let squares: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some((squares / (n - 1.0)).sqrt())
}
