//! Delta Engine: consecutive commit pairs per author.
//!
//! Commits are grouped by `author_email`, each group is put in order by the
//! active [`OrderingRule`], and every consecutive pair becomes one [`Delta`].
//! A group of `n` dated commits always yields exactly `n - 1` deltas.

use std::collections::BTreeMap;

use cadence_core::{CommitRecord, OrderingRule, RepoScope};
use serde::Serialize;

/// Elapsed time between two consecutive commits of one author.
///
/// The elapsed time is kept in exact seconds. [`Delta::minutes`] is the exact
/// minute value; [`Delta::centiminutes`] is the value quantised to hundredths
/// of a minute, which is what enters every aggregate.
///
/// # Examples
///
/// ```
/// use cadence_metrics::delta::Delta;
///
/// let d = Delta {
///     author_email: "a@x.com".into(),
///     older_sha: "b".into(),
///     newer_sha: "c".into(),
///     committed_date: 5000,
///     elapsed_seconds: 4000,
/// };
/// assert!((d.minutes() - 66.666_666).abs() < 1e-5);
/// assert_eq!(d.centiminutes(), 6667);
/// assert_eq!(d.reported_minutes(), 66.67);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    /// Author both commits belong to.
    pub author_email: String,
    /// Earlier commit of the pair.
    pub older_sha: String,
    /// Later commit of the pair.
    pub newer_sha: String,
    /// Timestamp of the newer commit, used for month and window keys.
    pub committed_date: i64,
    /// `newer.committed_date - older.committed_date`. Negative values are kept.
    pub elapsed_seconds: i64,
}

impl Delta {
    /// Exact elapsed minutes.
    pub fn minutes(&self) -> f64 {
        self.elapsed_seconds as f64 / 60.0
    }

    /// Elapsed minutes rounded to hundredths, as an integer count.
    ///
    /// `round(seconds * 100 / 60)` computed in integers. A tie would need
    /// `5 * seconds / 3` to end in exactly one half, which cannot happen.
    pub fn centiminutes(&self) -> i64 {
        centiminutes(self.elapsed_seconds)
    }

    /// Elapsed minutes at two-decimal reporting precision.
    pub fn reported_minutes(&self) -> f64 {
        self.centiminutes() as f64 / 100.0
    }
}

/// Quantise elapsed seconds to hundredths of a minute.
///
/// # Examples
///
/// ```
/// use cadence_metrics::delta::centiminutes;
///
/// assert_eq!(centiminutes(0), 0);
/// assert_eq!(centiminutes(60), 100);
/// assert_eq!(centiminutes(4000), 6667);
/// assert_eq!(centiminutes(-1), -2);
/// ```
pub fn centiminutes(elapsed_seconds: i64) -> i64 {
    elapsed_seconds
        .saturating_mul(10)
        .saturating_add(3)
        .div_euclid(6)
}

/// All deltas of one author, in the order of the sorted commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDeltas {
    pub author_email: String,
    pub deltas: Vec<Delta>,
}

/// Result of delta extraction for one repository scope.
///
/// `records_seen == 0` means the scope matched nothing, which is different
/// from every record having been skipped for a missing date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSet {
    pub scope: RepoScope,
    pub ordering: OrderingRule,
    /// Records supplied for the scope, dated or not.
    pub records_seen: usize,
    /// Shas of records excluded for a missing `committed_date`.
    pub skipped: Vec<String>,
    /// Deltas with a negative elapsed time. Only possible under
    /// [`OrderingRule::Traversal`].
    pub negative_deltas: usize,
    /// One entry per author with at least one dated commit, sorted by email.
    pub authors: Vec<AuthorDeltas>,
}

impl DeltaSet {
    /// An empty result for a scope that matched no records.
    pub fn empty(scope: RepoScope, ordering: OrderingRule) -> Self {
        Self {
            scope,
            ordering,
            records_seen: 0,
            skipped: Vec::new(),
            negative_deltas: 0,
            authors: Vec::new(),
        }
    }

    /// True when the scope matched no records at all.
    pub fn is_empty_scope(&self) -> bool {
        self.records_seen == 0
    }

    /// Total number of deltas across authors.
    pub fn delta_count(&self) -> usize {
        self.authors.iter().map(|a| a.deltas.len()).sum()
    }

    /// Iterate over every delta, author by author.
    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.authors.iter().flat_map(|a| a.deltas.iter())
    }

    /// Every delta ordered by `(newer committed_date, newer sha)`.
    ///
    /// This is the global order used for fixed windows.
    pub fn chronological(&self) -> Vec<&Delta> {
        let mut all: Vec<&Delta> = self.iter().collect();
        all.sort_by(|a, b| {
            a.committed_date
                .cmp(&b.committed_date)
                .then_with(|| a.newer_sha.cmp(&b.newer_sha))
        });
        all
    }
}

/// Extract per-author deltas from the records of one scope.
///
/// Records without a `committed_date` are excluded and listed in
/// [`DeltaSet::skipped`]. Under [`OrderingRule::CommitDateSha`] the result
/// does not depend on the order of `records`. Under
/// [`OrderingRule::Traversal`], `records` must be in history-traversal order
/// (newest first) and each author's commits are taken in reverse.
///
/// # Examples
///
/// ```
/// use cadence_core::{CommitRecord, OrderingRule, RepoScope};
/// use cadence_metrics::delta::extract_deltas;
///
/// let scope: RepoScope = "local:demo".parse().unwrap();
/// let records = vec![
///     CommitRecord::new("c", "a@x.com", 5000, "third"),
///     CommitRecord::new("b", "a@x.com", 1000, "second"),
///     CommitRecord::new("a", "a@x.com", 1000, "first"),
/// ];
/// let set = extract_deltas(&scope, &records, OrderingRule::CommitDateSha);
/// let pairs: Vec<_> = set
///     .iter()
///     .map(|d| (d.older_sha.as_str(), d.newer_sha.as_str()))
///     .collect();
/// assert_eq!(pairs, vec![("a", "b"), ("b", "c")]);
/// ```
pub fn extract_deltas(scope: &RepoScope, records: &[CommitRecord], rule: OrderingRule) -> DeltaSet {
    let mut skipped = Vec::new();
    let mut groups: BTreeMap<&str, Vec<(i64, &CommitRecord)>> = BTreeMap::new();

    for record in records {
        match record.committed_date {
            Some(ts) => groups
                .entry(record.author_email.as_str())
                .or_default()
                .push((ts, record)),
            None => skipped.push(record.sha.clone()),
        }
    }

    if !skipped.is_empty() {
        tracing::warn!(
            scope = %scope,
            skipped = skipped.len(),
            "excluded commits without a committed date"
        );
    }

    let mut negative_deltas = 0;
    let mut authors = Vec::with_capacity(groups.len());

    for (email, mut commits) in groups {
        match rule {
            OrderingRule::CommitDateSha => {
                commits.sort_by(|(ta, a), (tb, b)| ta.cmp(tb).then_with(|| a.sha.cmp(&b.sha)));
            }
            OrderingRule::Traversal => commits.reverse(),
        }

        let deltas: Vec<Delta> = commits
            .windows(2)
            .map(|pair| {
                let (older_ts, older) = pair[0];
                let (newer_ts, newer) = pair[1];
                Delta {
                    author_email: email.to_string(),
                    older_sha: older.sha.clone(),
                    newer_sha: newer.sha.clone(),
                    committed_date: newer_ts,
                    elapsed_seconds: newer_ts.saturating_sub(older_ts),
                }
            })
            .collect();

        negative_deltas += deltas.iter().filter(|d| d.elapsed_seconds < 0).count();
        authors.push(AuthorDeltas {
            author_email: email.to_string(),
            deltas,
        });
    }

    if negative_deltas > 0 {
        tracing::warn!(
            scope = %scope,
            negative_deltas,
            "negative cycle times found; input is out of order"
        );
    }

    let set = DeltaSet {
        scope: scope.clone(),
        ordering: rule,
        records_seen: records.len(),
        skipped,
        negative_deltas,
        authors,
    };

    tracing::debug!(
        scope = %scope,
        records = set.records_seen,
        authors = set.authors.len(),
        deltas = set.delta_count(),
        "extracted deltas"
    );

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scope() -> RepoScope {
        "local:test".parse().unwrap()
    }

    fn undated(sha: &str, email: &str) -> CommitRecord {
        CommitRecord {
            sha: sha.into(),
            author_email: email.into(),
            committed_date: None,
            message: None,
        }
    }

    #[test]
    fn end_to_end_pairs_and_minutes() {
        let records = vec![
            CommitRecord::new("b", "a@x.com", 1000, "m"),
            CommitRecord::new("a", "a@x.com", 1000, "m"),
            CommitRecord::new("c", "a@x.com", 5000, "m"),
        ];
        let set = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        assert_eq!(set.authors.len(), 1);
        let deltas = &set.authors[0].deltas;
        assert_eq!(deltas.len(), 2);
        assert_eq!((deltas[0].older_sha.as_str(), deltas[0].newer_sha.as_str()), ("a", "b"));
        assert_eq!(deltas[0].reported_minutes(), 0.0);
        assert_eq!((deltas[1].older_sha.as_str(), deltas[1].newer_sha.as_str()), ("b", "c"));
        assert_eq!(deltas[1].reported_minutes(), 66.67);
        assert_eq!(deltas[1].minutes(), 4000.0 / 60.0);
    }

    #[test]
    fn single_commit_author_has_no_deltas() {
        let records = vec![CommitRecord::new("a", "solo@x.com", 10, "m")];
        let set = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        assert_eq!(set.authors.len(), 1);
        assert!(set.authors[0].deltas.is_empty());
        assert_eq!(set.delta_count(), 0);
    }

    #[test]
    fn empty_scope_is_distinguishable_from_all_skipped() {
        let empty = extract_deltas(&scope(), &[], OrderingRule::CommitDateSha);
        assert!(empty.is_empty_scope());
        assert!(empty.skipped.is_empty());

        let records = vec![undated("a", "x@y.z"), undated("b", "x@y.z")];
        let all_skipped = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        assert!(!all_skipped.is_empty_scope());
        assert_eq!(all_skipped.skipped, vec!["a", "b"]);
        assert_eq!(all_skipped.delta_count(), 0);
    }

    #[test]
    fn undated_records_shrink_the_group() {
        let records = vec![
            CommitRecord::new("a", "x@y.z", 0, "m"),
            undated("b", "x@y.z"),
            CommitRecord::new("c", "x@y.z", 120, "m"),
        ];
        let set = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        assert_eq!(set.delta_count(), 1);
        assert_eq!(set.skipped, vec!["b"]);
        let d = set.iter().next().unwrap();
        assert_eq!((d.older_sha.as_str(), d.newer_sha.as_str()), ("a", "c"));
    }

    #[test]
    fn authors_are_grouped_and_sorted() {
        let records = vec![
            CommitRecord::new("1", "zed@x.com", 0, "m"),
            CommitRecord::new("2", "amy@x.com", 60, "m"),
            CommitRecord::new("3", "zed@x.com", 600, "m"),
            CommitRecord::new("4", "amy@x.com", 120, "m"),
        ];
        let set = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        let emails: Vec<_> = set.authors.iter().map(|a| a.author_email.as_str()).collect();
        assert_eq!(emails, vec!["amy@x.com", "zed@x.com"]);
        assert_eq!(set.authors[0].deltas[0].elapsed_seconds, 60);
        assert_eq!(set.authors[1].deltas[0].elapsed_seconds, 600);
    }

    #[test]
    fn traversal_order_reverses_supplier_order_and_counts_negatives() {
        // Newest first as delivered by a history walk, with a commit whose
        // timestamp runs backwards.
        let records = vec![
            CommitRecord::new("c", "a@x.com", 3000, "m"),
            CommitRecord::new("b", "a@x.com", 500, "m"),
            CommitRecord::new("a", "a@x.com", 1000, "m"),
        ];
        let set = extract_deltas(&scope(), &records, OrderingRule::Traversal);
        let elapsed: Vec<_> = set.iter().map(|d| d.elapsed_seconds).collect();
        assert_eq!(elapsed, vec![-500, 2500]);
        assert_eq!(set.negative_deltas, 1);

        let sorted = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        assert_eq!(sorted.negative_deltas, 0);
    }

    #[test]
    fn chronological_orders_by_newer_date_then_sha() {
        let records = vec![
            CommitRecord::new("a1", "a@x.com", 0, "m"),
            CommitRecord::new("a2", "a@x.com", 100, "m"),
            CommitRecord::new("b1", "b@x.com", 0, "m"),
            CommitRecord::new("b2", "b@x.com", 50, "m"),
            CommitRecord::new("b0", "b@x.com", 100, "m"),
        ];
        let set = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        let order: Vec<_> = set.chronological().iter().map(|d| d.newer_sha.as_str()).collect();
        assert_eq!(order, vec!["b2", "a2", "b0"]);
    }

    #[test]
    fn centiminutes_rounds_to_nearest() {
        assert_eq!(centiminutes(1), 2); // 1.666..
        assert_eq!(centiminutes(2), 3); // 3.333..
        assert_eq!(centiminutes(3), 5);
        assert_eq!(centiminutes(86_400), 144_000);
    }

    #[test]
    fn extreme_timestamps_saturate_instead_of_overflowing() {
        assert_eq!(centiminutes(i64::MAX), i64::MAX.div_euclid(6));
        assert!(centiminutes(i64::MIN) < 0);

        let records = vec![
            CommitRecord::new("a", "a@x.com", 0, "m"),
            CommitRecord::new("b", "a@x.com", 1_000_000_000_000_000_000, "m"),
            CommitRecord::new("c", "b@x.com", i64::MIN, "m"),
            CommitRecord::new("d", "b@x.com", i64::MAX, "m"),
        ];
        let set = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
        assert_eq!(set.delta_count(), 2);
        assert!(set.iter().all(|d| d.elapsed_seconds > 0 && d.centiminutes() > 0));
    }

    fn arb_records() -> impl Strategy<Value = Vec<CommitRecord>> {
        prop::collection::vec((0usize..4, 0i64..50), 0..40).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (author, minute))| {
                    CommitRecord::new(
                        format!("{i:04x}"),
                        format!("dev{author}@x.com"),
                        minute * 60,
                        "m",
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn output_ignores_input_order(
            (records, shuffled) in arb_records().prop_flat_map(|r| {
                let shuffled = Just(r.clone()).prop_shuffle();
                (Just(r), shuffled)
            })
        ) {
            let a = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
            let b = extract_deltas(&scope(), &shuffled, OrderingRule::CommitDateSha);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn each_author_yields_n_minus_one_deltas(records in arb_records()) {
            let set = extract_deltas(&scope(), &records, OrderingRule::CommitDateSha);
            for author in &set.authors {
                let n = records.iter().filter(|r| r.author_email == author.author_email).count();
                prop_assert_eq!(author.deltas.len(), n - 1);
                for d in &author.deltas {
                    prop_assert!(d.elapsed_seconds >= 0);
                }
            }
        }
    }
}
