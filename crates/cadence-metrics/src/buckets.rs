//! Magnitude buckets: half-open minute ranges with a complete axis.

use std::fmt;

use cadence_core::{validate_boundaries, CadenceError};
use serde::Serialize;

use crate::delta::{Delta, DeltaSet};
use crate::stats::Aggregate;

/// One half-open range `[lower, upper)`; `upper == None` is unbounded.
///
/// # Examples
///
/// ```
/// use cadence_metrics::buckets::BucketRange;
///
/// let r = BucketRange { lower: 60.0, upper: Some(1440.0) };
/// assert!(r.contains(60.0));
/// assert!(!r.contains(1440.0));
/// assert_eq!(r.to_string(), "[60, 1440)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRange {
    pub lower: f64,
    pub upper: Option<f64>,
}

impl BucketRange {
    pub fn contains(&self, minutes: f64) -> bool {
        minutes >= self.lower && self.upper.map_or(true, |u| minutes < u)
    }
}

impl fmt::Display for BucketRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "[{}, {})", self.lower, upper),
            None => write!(f, "[{}, +inf)", self.lower),
        }
    }
}

/// A validated set of magnitude buckets.
///
/// Built from ascending lower bounds. Each bound opens a range that ends at
/// the next bound, and the last range is unbounded above.
///
/// # Examples
///
/// ```
/// use cadence_metrics::buckets::MagnitudeBuckets;
///
/// let buckets = MagnitudeBuckets::new(vec![0.0, 60.0]).unwrap();
/// let labels: Vec<String> = buckets.ranges().map(|r| r.to_string()).collect();
/// assert_eq!(labels, vec!["[0, 60)", "[60, +inf)"]);
///
/// assert!(MagnitudeBuckets::new(vec![60.0, 0.0]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeBuckets {
    boundaries: Vec<f64>,
}

impl MagnitudeBuckets {
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidInput`] for empty, non-finite, or
    /// non-increasing boundaries.
    pub fn new(boundaries: Vec<f64>) -> Result<Self, CadenceError> {
        validate_boundaries(&boundaries)?;
        Ok(Self { boundaries })
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// The ranges in ascending order.
    pub fn ranges(&self) -> impl Iterator<Item = BucketRange> + '_ {
        self.boundaries
            .iter()
            .enumerate()
            .map(|(i, &lower)| BucketRange {
                lower,
                upper: self.boundaries.get(i + 1).copied(),
            })
    }

    /// Index of the range holding `minutes`, or `None` below the first bound.
    pub fn index_of(&self, minutes: f64) -> Option<usize> {
        if minutes < self.boundaries[0] {
            return None;
        }
        Some(self.boundaries.partition_point(|&b| b <= minutes) - 1)
    }
}

impl Default for MagnitudeBuckets {
    fn default() -> Self {
        Self {
            boundaries: vec![0.0, 60.0, 1440.0, 10080.0],
        }
    }
}

/// Aggregate of one magnitude bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketStat {
    pub range: BucketRange,
    #[serde(flatten)]
    pub stats: Aggregate,
}

/// Every bucket in ascending order, empty ones included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketedStats {
    pub buckets: Vec<BucketStat>,
    /// Deltas below the first boundary, which belong to no bucket.
    pub below_range: usize,
}

/// Partition deltas into magnitude buckets and aggregate each bucket.
///
/// A delta is placed by its two-decimal minute value.
pub fn bucket_stats(set: &DeltaSet, buckets: &MagnitudeBuckets) -> BucketedStats {
    bucket_deltas(set.iter(), buckets)
}

pub(crate) fn bucket_deltas<'a>(
    deltas: impl Iterator<Item = &'a Delta>,
    buckets: &MagnitudeBuckets,
) -> BucketedStats {
    let mut members: Vec<Vec<i64>> = vec![Vec::new(); buckets.boundaries.len()];
    let mut below_range = 0;

    for delta in deltas {
        match buckets.index_of(delta.reported_minutes()) {
            Some(i) => members[i].push(delta.centiminutes()),
            None => below_range += 1,
        }
    }

    if below_range > 0 {
        tracing::warn!(below_range, "deltas fall below the first bucket boundary");
    }

    let buckets = buckets
        .ranges()
        .zip(members)
        .map(|(range, values)| BucketStat {
            range,
            stats: Aggregate::from_centiminutes(&values),
        })
        .collect();

    BucketedStats {
        buckets,
        below_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::extract_deltas;
    use cadence_core::{CommitRecord, OrderingRule};

    #[test]
    fn index_of_respects_half_open_ranges() {
        let b = MagnitudeBuckets::default();
        assert_eq!(b.index_of(-0.01), None);
        assert_eq!(b.index_of(0.0), Some(0));
        assert_eq!(b.index_of(59.99), Some(0));
        assert_eq!(b.index_of(60.0), Some(1));
        assert_eq!(b.index_of(1440.0), Some(2));
        assert_eq!(b.index_of(10_079.99), Some(2));
        assert_eq!(b.index_of(1.0e9), Some(3));
    }

    #[test]
    fn invalid_boundaries_fail_fast() {
        assert!(MagnitudeBuckets::new(vec![]).is_err());
        assert!(MagnitudeBuckets::new(vec![0.0, 0.0]).is_err());
        assert!(MagnitudeBuckets::new(vec![0.0, f64::NAN]).is_err());
        assert!(MagnitudeBuckets::new(vec![0.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn single_bucket_worked_example() {
        let scope = "local:test".parse().unwrap();
        let records = vec![
            CommitRecord::new("b", "a@x.com", 1000, "m"),
            CommitRecord::new("a", "a@x.com", 1000, "m"),
            CommitRecord::new("c", "a@x.com", 5000, "m"),
        ];
        let set = extract_deltas(&scope, &records, OrderingRule::CommitDateSha);
        let buckets = MagnitudeBuckets::new(vec![0.0, 120.0]).unwrap();
        let stats = bucket_stats(&set, &buckets);

        assert_eq!(stats.buckets.len(), 2);
        let first = &stats.buckets[0].stats;
        assert_eq!(first.count, 2);
        assert_eq!(first.sum, Some(66.67));
        assert_eq!(first.mean, Some(33.335));

        let second = &stats.buckets[1];
        assert_eq!(second.range.to_string(), "[120, +inf)");
        assert_eq!(second.stats.count, 0);
        assert!(second.stats.mean.is_none());
        assert_eq!(stats.below_range, 0);
    }

    #[test]
    fn deltas_below_first_boundary_are_counted() {
        let scope = "local:test".parse().unwrap();
        let records = vec![
            CommitRecord::new("a", "a@x.com", 0, "m"),
            CommitRecord::new("b", "a@x.com", 60, "m"),
            CommitRecord::new("c", "a@x.com", 7200, "m"),
        ];
        let set = extract_deltas(&scope, &records, OrderingRule::CommitDateSha);
        let buckets = MagnitudeBuckets::new(vec![60.0]).unwrap();
        let stats = bucket_stats(&set, &buckets);
        assert_eq!(stats.below_range, 1);
        assert_eq!(stats.buckets[0].stats.count, 1);
        assert_eq!(stats.buckets[0].stats.sum, Some(119.0));
    }
}
