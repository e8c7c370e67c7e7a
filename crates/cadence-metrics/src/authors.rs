//! Activity by author: distinct authors per month and per-author cycle time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use cadence_core::CommitRecord;
use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::delta::DeltaSet;
use crate::monthly::month_key_in;
use crate::stats::Aggregate;

/// Number of distinct authors committing in one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAuthors {
    pub month: String,
    pub authors: usize,
}

/// Active authors per month, ascending, plus records that had no month.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAuthorsByMonth {
    pub months: Vec<ActiveAuthors>,
    pub undated: usize,
}

/// Distinct `author_email`s per local calendar month.
pub fn active_authors(records: &[CommitRecord]) -> ActiveAuthorsByMonth {
    active_authors_in(records, &Local)
}

/// [`active_authors`] with months taken in `tz`.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use cadence_core::CommitRecord;
/// use cadence_metrics::authors::active_authors_in;
///
/// let records = vec![
///     CommitRecord::new("a", "amy@x.com", 0, "m"),
///     CommitRecord::new("b", "amy@x.com", 60, "m"),
///     CommitRecord::new("c", "bob@x.com", 120, "m"),
/// ];
/// let active = active_authors_in(&records, &Utc);
/// assert_eq!(active.months[0].month, "1970-01");
/// assert_eq!(active.months[0].authors, 2);
/// ```
pub fn active_authors_in<Tz>(records: &[CommitRecord], tz: &Tz) -> ActiveAuthorsByMonth
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut undated = 0;
    let mut by_month: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        match record.committed_date.and_then(|ts| month_key_in(ts, tz)) {
            Some(month) => {
                by_month
                    .entry(month)
                    .or_default()
                    .insert(record.author_email.as_str());
            }
            None => undated += 1,
        }
    }

    ActiveAuthorsByMonth {
        months: by_month
            .into_iter()
            .map(|(month, authors)| ActiveAuthors {
                month,
                authors: authors.len(),
            })
            .collect(),
        undated,
    }
}

/// Cycle-time aggregate of one author.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorStat {
    pub author_email: String,
    #[serde(flatten)]
    pub stats: Aggregate,
}

/// One aggregate per author over that author's deltas, sorted by email.
///
/// Authors with a single dated commit appear with `count = 0`.
pub fn author_stats(set: &DeltaSet) -> Vec<AuthorStat> {
    set.authors
        .iter()
        .map(|author| {
            let values: Vec<i64> = author.deltas.iter().map(|d| d.centiminutes()).collect();
            AuthorStat {
                author_email: author.author_email.clone(),
                stats: Aggregate::from_centiminutes(&values),
            }
        })
        .collect()
}
