//! Parity harness: run every operation on two engines and diff the
//! reported values.
//!
//! Values are compared after the reporting boundary, so both sides go through
//! the same rounding. A key present on only one side is a mismatch too.

use std::collections::BTreeMap;
use std::fmt;

use cadence_core::{CadenceError, OrderingRule, RepoScope};
use serde::Serialize;

use crate::engine::{MetricSettings, MetricsEngine};
use crate::report::{rate_percent, ReportedStat};

/// One differing value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParityMismatch {
    pub operation: String,
    pub key: String,
    pub field: String,
    pub left: String,
    pub right: String,
}

/// Outcome of a comparison between two engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParityReport {
    pub left: String,
    pub right: String,
    pub scope: RepoScope,
    /// Number of distinct values compared.
    pub checked: usize,
    pub mismatches: Vec<ParityMismatch>,
}

impl ParityReport {
    pub fn is_match(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl fmt::Display for ParityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Parity {} vs {} for {}: {} values checked, {} mismatches",
            self.left,
            self.right,
            self.scope,
            self.checked,
            self.mismatches.len()
        )?;
        for m in &self.mismatches {
            writeln!(
                f,
                "  {} [{}] {}: {} = {}, {} = {}",
                m.operation, m.key, m.field, self.left, m.left, self.right, m.right
            )?;
        }
        Ok(())
    }
}

type Cells = BTreeMap<(&'static str, String, &'static str), Option<f64>>;

fn push_stat(cells: &mut Cells, operation: &'static str, key: String, stat: &ReportedStat) {
    for (field, value) in stat.fields() {
        cells.insert((operation, key.clone(), field), value);
    }
}

fn count(n: usize) -> Option<f64> {
    Some(n as f64)
}

/// Every reported value of `engine`, keyed by `(operation, key, field)`.
fn collect(
    engine: &dyn MetricsEngine,
    scope: &RepoScope,
    settings: &MetricSettings,
) -> Result<Cells, CadenceError> {
    let cfg = &settings.report;
    let mut cells = Cells::new();

    let set = engine.deltas(scope, OrderingRule::CommitDateSha)?;
    cells.insert(("deltas", "scope".into(), "recordsSeen"), count(set.records_seen));
    cells.insert(("deltas", "scope".into(), "skipped"), count(set.skipped.len()));
    for d in set.iter() {
        let key = format!("{} {}..{}", d.author_email, d.older_sha, d.newer_sha);
        cells.insert(("deltas", key, "minutes"), Some(d.reported_minutes()));
    }

    let overall = engine.overall(scope, settings)?;
    push_stat(&mut cells, "overall", "scope".into(), &ReportedStat::new(&overall, cfg));

    let buckets = engine.bucket_stats(scope, settings)?;
    cells.insert(("buckets", "scope".into(), "belowRange"), count(buckets.below_range));
    for b in &buckets.buckets {
        push_stat(&mut cells, "buckets", b.range.to_string(), &ReportedStat::new(&b.stats, cfg));
    }

    for w in engine.windows(scope, settings)? {
        let key = format!("#{} {}", w.index, w.month.as_deref().unwrap_or("-"));
        push_stat(&mut cells, "windows", key, &ReportedStat::new(&w.stats, cfg));
    }

    for m in engine.monthly(scope, settings)? {
        push_stat(&mut cells, "months", m.month, &ReportedStat::new(&m.stats, cfg));
    }

    for a in engine.author_stats(scope, settings)? {
        push_stat(&mut cells, "authors", a.author_email, &ReportedStat::new(&a.stats, cfg));
    }

    let failure = engine.failure_rate(scope, &settings.classifier)?;
    cells.insert(("failure", "scope".into(), "total"), count(failure.total));
    cells.insert(("failure", "scope".into(), "failures"), count(failure.failures));
    cells.insert(("failure", "scope".into(), "ratePercent"), rate_percent(failure.rate));

    let monthly = engine.monthly_failure_rates(scope, &settings.classifier)?;
    cells.insert(("failureMonths", "scope".into(), "undated"), count(monthly.undated));
    for m in monthly.months {
        cells.insert(("failureMonths", m.month.clone(), "total"), count(m.summary.total));
        cells.insert(("failureMonths", m.month.clone(), "failures"), count(m.summary.failures));
        cells.insert(("failureMonths", m.month, "ratePercent"), rate_percent(m.summary.rate));
    }

    let active = engine.active_authors(scope)?;
    cells.insert(("activeAuthors", "scope".into(), "undated"), count(active.undated));
    for m in active.months {
        cells.insert(("activeAuthors", m.month, "authors"), count(m.authors));
    }

    Ok(cells)
}

fn render(value: Option<&Option<f64>>) -> String {
    match value {
        None => "missing".to_string(),
        Some(None) => "null".to_string(),
        Some(Some(v)) => v.to_string(),
    }
}

/// Compare two engines over one scope.
///
/// Deltas are always compared under [`OrderingRule::CommitDateSha`], the one
/// rule every engine can reproduce.
///
/// # Errors
///
/// Propagates the first engine error.
///
/// # Examples
///
/// ```
/// use cadence_core::{CommitRecord, RepoScope};
/// use cadence_metrics::engine::{InMemoryEngine, MetricSettings};
/// use cadence_metrics::parity::compare;
///
/// let scope: RepoScope = "local:demo".parse().unwrap();
/// let records = vec![
///     CommitRecord::new("a", "a@x.com", 0, "init"),
///     CommitRecord::new("b", "a@x.com", 90, "hotfix"),
/// ];
/// let left = InMemoryEngine::with_records(scope.clone(), records.clone()).unwrap();
/// let right = InMemoryEngine::with_records(scope.clone(), records).unwrap();
///
/// let report = compare(&left, &right, &scope, &MetricSettings::default()).unwrap();
/// assert!(report.is_match());
/// assert!(report.checked > 0);
/// ```
pub fn compare(
    left: &dyn MetricsEngine,
    right: &dyn MetricsEngine,
    scope: &RepoScope,
    settings: &MetricSettings,
) -> Result<ParityReport, CadenceError> {
    let settings = MetricSettings {
        ordering: OrderingRule::CommitDateSha,
        ..settings.clone()
    };
    let lhs = collect(left, scope, &settings)?;
    let rhs = collect(right, scope, &settings)?;

    let mut keys: Vec<_> = lhs.keys().chain(rhs.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut mismatches = Vec::new();
    for key in &keys {
        let l = lhs.get(*key);
        let r = rhs.get(*key);
        if l != r {
            let (operation, k, field) = key;
            mismatches.push(ParityMismatch {
                operation: operation.to_string(),
                key: k.clone(),
                field: field.to_string(),
                left: render(l),
                right: render(r),
            });
        }
    }

    if !mismatches.is_empty() {
        tracing::warn!(
            scope = %scope,
            left = left.name(),
            right = right.name(),
            mismatches = mismatches.len(),
            "engines disagree"
        );
    }

    Ok(ParityReport {
        left: left.name().to_string(),
        right: right.name().to_string(),
        scope: scope.clone(),
        checked: keys.len(),
        mismatches,
    })
}
