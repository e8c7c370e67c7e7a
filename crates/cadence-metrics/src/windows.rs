//! Fixed windows of consecutive deltas.

use std::fmt::Display;

use cadence_core::CadenceError;
use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::delta::DeltaSet;
use crate::monthly::month_key_in;
use crate::stats::Aggregate;

/// Aggregate of one window of `window_size` consecutive deltas.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStat {
    /// Zero-based window position.
    pub index: usize,
    /// Local month of the first delta in the window.
    pub month: Option<String>,
    #[serde(flatten)]
    pub stats: Aggregate,
}

/// Chunk deltas, in `(newer committed_date, newer sha)` order, into windows
/// of `window_size`. The last window may be shorter.
///
/// # Errors
///
/// Returns [`CadenceError::InvalidInput`] if `window_size` is zero.
pub fn fixed_windows(set: &DeltaSet, window_size: usize) -> Result<Vec<WindowStat>, CadenceError> {
    fixed_windows_in(set, window_size, &Local)
}

/// [`fixed_windows`] with months taken in `tz`.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use cadence_core::{CommitRecord, OrderingRule, RepoScope};
/// use cadence_metrics::delta::extract_deltas;
/// use cadence_metrics::windows::fixed_windows_in;
///
/// let scope: RepoScope = "local:demo".parse().unwrap();
/// let records: Vec<_> = (0..5)
///     .map(|i| CommitRecord::new(format!("{i}"), "a@x.com", i * 60, "m"))
///     .collect();
/// let set = extract_deltas(&scope, &records, OrderingRule::CommitDateSha);
/// let windows = fixed_windows_in(&set, 3, &Utc).unwrap();
/// assert_eq!(windows.len(), 2);
/// assert_eq!(windows[0].stats.count, 3);
/// assert_eq!(windows[1].stats.count, 1);
/// ```
pub fn fixed_windows_in<Tz>(
    set: &DeltaSet,
    window_size: usize,
    tz: &Tz,
) -> Result<Vec<WindowStat>, CadenceError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if window_size == 0 {
        return Err(CadenceError::InvalidInput(
            "window size must be at least 1".into(),
        ));
    }

    let ordered = set.chronological();
    let windows = ordered
        .chunks(window_size)
        .enumerate()
        .map(|(index, chunk)| {
            let values: Vec<i64> = chunk.iter().map(|d| d.centiminutes()).collect();
            WindowStat {
                index,
                month: month_key_in(chunk[0].committed_date, tz),
                stats: Aggregate::from_centiminutes(&values),
            }
        })
        .collect();

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::extract_deltas;
    use cadence_core::{CommitRecord, OrderingRule};
    use chrono::Utc;

    #[test]
    fn zero_window_is_rejected() {
        let scope = "local:test".parse().unwrap();
        let set = DeltaSet::empty(scope, OrderingRule::CommitDateSha);
        assert!(matches!(
            fixed_windows_in(&set, 0, &Utc),
            Err(CadenceError::InvalidInput(_))
        ));
    }

    #[test]
    fn no_deltas_means_no_windows() {
        let scope = "local:test".parse().unwrap();
        let set = DeltaSet::empty(scope, OrderingRule::CommitDateSha);
        assert!(fixed_windows_in(&set, 10, &Utc).unwrap().is_empty());
    }

    #[test]
    fn windows_interleave_authors_chronologically() {
        let scope = "local:test".parse().unwrap();
        let records = vec![
            CommitRecord::new("a1", "a@x.com", 0, "m"),
            CommitRecord::new("a2", "a@x.com", 600, "m"),
            CommitRecord::new("b1", "b@x.com", 0, "m"),
            CommitRecord::new("b2", "b@x.com", 120, "m"),
            CommitRecord::new("a3", "a@x.com", 3_000_000, "m"),
        ];
        let set = extract_deltas(&scope, &records, OrderingRule::CommitDateSha);
        let windows = fixed_windows_in(&set, 2, &Utc).unwrap();

        assert_eq!(windows.len(), 2);
        // b2 (2 min) then a2 (10 min)
        assert_eq!(windows[0].stats.sum, Some(12.0));
        assert_eq!(windows[0].month.as_deref(), Some("1970-01"));
        assert_eq!(windows[1].index, 1);
        assert_eq!(windows[1].stats.count, 1);
        assert_eq!(windows[1].month.as_deref(), Some("1970-02"));
    }
}
