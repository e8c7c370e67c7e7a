//! Month Normalizer: aggregates keyed by the local calendar month of the
//! newer commit.
//!
//! Months are derived in the local time zone. The `_in` variants take an
//! explicit zone so results can be pinned in tests.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;

use crate::delta::DeltaSet;
use crate::stats::Aggregate;

/// `YYYY-MM` of a Unix timestamp in the local time zone.
///
/// Returns `None` for timestamps outside the representable calendar range.
pub fn month_key(timestamp: i64) -> Option<String> {
    month_key_in(timestamp, &Local)
}

/// `YYYY-MM` of a Unix timestamp in `tz`.
///
/// # Examples
///
/// ```
/// use chrono::{FixedOffset, Utc};
/// use cadence_metrics::monthly::month_key_in;
///
/// // 2024-01-31 23:30 UTC
/// let ts = 1_706_743_800;
/// assert_eq!(month_key_in(ts, &Utc).as_deref(), Some("2024-01"));
/// let cet = FixedOffset::east_opt(3600).unwrap();
/// assert_eq!(month_key_in(ts, &cet).as_deref(), Some("2024-02"));
/// ```
pub fn month_key_in<Tz>(timestamp: i64, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let utc = DateTime::from_timestamp(timestamp, 0)?;
    Some(utc.with_timezone(tz).format("%Y-%m").to_string())
}

/// Aggregate of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    pub month: String,
    #[serde(flatten)]
    pub stats: Aggregate,
}

/// Per-month aggregates in the local time zone, ascending by month.
///
/// Months without deltas are omitted.
pub fn monthly_stats(set: &DeltaSet) -> Vec<MonthlyStat> {
    monthly_stats_in(set, &Local)
}

/// Per-month aggregates in `tz`, ascending by month.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use cadence_core::{CommitRecord, OrderingRule, RepoScope};
/// use cadence_metrics::delta::extract_deltas;
/// use cadence_metrics::monthly::monthly_stats_in;
///
/// let scope: RepoScope = "local:demo".parse().unwrap();
/// let records = vec![
///     CommitRecord::new("a", "a@x.com", 0, "m"),
///     CommitRecord::new("b", "a@x.com", 600, "m"),
/// ];
/// let set = extract_deltas(&scope, &records, OrderingRule::CommitDateSha);
/// let months = monthly_stats_in(&set, &Utc);
/// assert_eq!(months.len(), 1);
/// assert_eq!(months[0].month, "1970-01");
/// assert_eq!(months[0].stats.sum, Some(10.0));
/// ```
pub fn monthly_stats_in<Tz>(set: &DeltaSet, tz: &Tz) -> Vec<MonthlyStat>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut by_month: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for delta in set.iter() {
        match month_key_in(delta.committed_date, tz) {
            Some(month) => by_month.entry(month).or_default().push(delta.centiminutes()),
            None => tracing::warn!(
                sha = %delta.newer_sha,
                committed_date = delta.committed_date,
                "commit date outside the calendar range"
            ),
        }
    }

    by_month
        .into_iter()
        .map(|(month, values)| MonthlyStat {
            month,
            stats: Aggregate::from_centiminutes(&values),
        })
        .collect()
}
